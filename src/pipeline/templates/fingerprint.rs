//! Template fingerprints.
//!
//! A fingerprint is `<normalized university>:<hash>`. The hash covers only
//! the fields that decide which prompt applies (structure, grade format and
//! the column set), so descriptors differing in country, labels, flags or
//! other fields share a template.

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::pipeline::layout::{LayoutDescriptor, LayoutType};

/// Case-fold, trim and collapse inner whitespace.
pub fn normalize_university(university: &str) -> String {
    university
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Full fingerprint of a descriptor for `university`.
pub fn fingerprint_of(university: &str, descriptor: &LayoutDescriptor) -> String {
    let university = normalize_university(university);
    let mut columns: Vec<String> = descriptor
        .columns
        .iter()
        .map(|c| normalize_university(c))
        .filter(|c| !c.is_empty())
        .collect();
    columns.sort();
    columns.dedup();
    let columns = columns.join("|");

    let hash = digest(&[
        "template",
        &university,
        descriptor.structure.as_str(),
        descriptor.grade_format.as_str(),
        &columns,
    ]);
    format!("{university}:{hash}")
}

/// Advisory key available right after quick detection.
///
/// Only the layout type is known at that point, so this key never addresses
/// a template directly; the store maps it to the full fingerprint of the
/// template last learned under it. The domain tag keeps the two key spaces
/// disjoint.
pub fn provisional_fingerprint(university: &str, layout_type: LayoutType) -> String {
    let university = normalize_university(university);
    let hash = digest(&["provisional", &university, layout_type.as_str()]);
    format!("{university}:p:{hash}")
}
