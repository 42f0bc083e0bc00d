use std::path::Path;

use uuid::Uuid;

/// A transcript image entering the pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    /// Raw image bytes (PNG or JPEG), sent as-is to the vision model.
    pub image: Vec<u8>,
    /// File name or other caller label, used only for logging.
    pub source_name: Option<String>,
}

impl Document {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            source_name: None,
        }
    }

    /// Load an image from disk. The id is derived from the content so the
    /// same file always maps to the same document id.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let image = std::fs::read(path)?;
        Ok(Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, &image),
            image,
            source_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        })
    }

    pub fn with_source_name(mut self, name: &str) -> Self {
        self.source_name = Some(name.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        let doc_a = Document::from_path(&a).unwrap();
        let doc_b = Document::from_path(&b).unwrap();
        assert_eq!(doc_a.id, doc_b.id);
        assert_eq!(doc_a.source_name.as_deref(), Some("a.png"));
        assert_eq!(doc_a.image, b"same bytes");
    }

    #[test]
    fn from_path_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Document::from_path(&dir.path().join("nope.png")).is_err());
    }

    #[test]
    fn new_documents_get_distinct_ids() {
        let a = Document::new(vec![1, 2, 3]);
        let b = Document::new(vec![1, 2, 3]);
        assert_ne!(a.id, b.id);
    }
}
