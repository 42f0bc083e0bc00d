use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::layout::{LayoutDescriptor, LayoutType};

/// A reusable extraction prompt learned from one deep layout analysis.
///
/// Replace, never edit: only `hit_count` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionTemplate {
    pub fingerprint: String,
    pub descriptor: LayoutDescriptor,
    pub rendered_prompt_body: String,
    /// Schema version the body was rendered against.
    pub schema_version: String,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
}

impl ExtractionTemplate {
    pub fn new(
        fingerprint: String,
        descriptor: LayoutDescriptor,
        rendered_prompt_body: String,
        schema_version: &str,
    ) -> Self {
        Self {
            fingerprint,
            descriptor,
            rendered_prompt_body,
            schema_version: schema_version.to_string(),
            created_at: Utc::now(),
            hit_count: 0,
        }
    }

    /// Quick-detect layout that led to this template.
    pub fn layout_type(&self) -> LayoutType {
        self.descriptor.layout_type
    }
}

#[cfg(test)]
pub(crate) fn sample_template(university: &str, columns: &[&str]) -> ExtractionTemplate {
    use crate::pipeline::layout::{GradeFormat, Structure};

    let descriptor = LayoutDescriptor {
        university: university.to_string(),
        university_full_name: university.to_string(),
        layout_type: LayoutType::Tabular,
        country: None,
        structure: Structure::SingleTable,
        grade_format: GradeFormat::Letter,
        columns: columns.iter().map(|c| c.to_string()).collect(),
        has_semester_gpa: false,
        gpa_label: String::new(),
        has_cgpa: false,
        cgpa_label: String::new(),
        other_fields: Default::default(),
    };
    let fingerprint = super::fingerprint_of(university, &descriptor);
    ExtractionTemplate::new(fingerprint, descriptor, format!("prompt for {university}"), "1.0")
}
