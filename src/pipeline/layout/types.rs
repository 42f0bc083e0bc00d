use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Lowercase, trim, and fold `_`/space separators to `-`.
fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Visual layout reported by quick detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutType {
    Tabular,
    SemesterBlock,
    MultiColumn,
    SinglePage,
}

impl LayoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tabular => "tabular",
            Self::SemesterBlock => "semester-block",
            Self::MultiColumn => "multi-column",
            Self::SinglePage => "single-page",
        }
    }

    /// Lenient parse of a model-supplied layout name.
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "tabular" | "table" => Some(Self::Tabular),
            "semester-block" | "semester-blocks" => Some(Self::SemesterBlock),
            "multi-column" | "multi-columns" | "multicolumn" => Some(Self::MultiColumn),
            "single-page" | "singlepage" => Some(Self::SinglePage),
            _ => None,
        }
    }
}

/// How grades are organized on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Structure {
    SingleTable,
    MultiTable,
    SemesterBlocks,
}

impl Structure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleTable => "single-table",
            Self::MultiTable => "multi-table",
            Self::SemesterBlocks => "semester-blocks",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "single-table" => Some(Self::SingleTable),
            "multi-table" | "multiple-tables" | "multi-tables" => Some(Self::MultiTable),
            "semester-blocks" | "semester-block" => Some(Self::SemesterBlocks),
            _ => None,
        }
    }
}

/// Grading scale used on the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradeFormat {
    Letter,
    TenPoint,
    Percentage,
}

impl GradeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::TenPoint => "ten-point",
            Self::Percentage => "percentage",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "letter" | "letters" | "letter-grade" | "letter-grades" => Some(Self::Letter),
            "ten-point" | "10-point" | "10" | "10-point-scale" | "ten-point-scale" => {
                Some(Self::TenPoint)
            }
            "percentage" | "percent" | "%" => Some(Self::Percentage),
            _ => None,
        }
    }
}

/// Result of the cheap first-pass classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickDetection {
    pub university: Option<String>,
    pub layout_type: LayoutType,
    pub country: Option<String>,
}

/// Structured summary of a transcript's organization. Built once by deep
/// analysis and never edited afterwards; templates hold their own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    /// Detected source name (the fingerprint input).
    pub university: String,
    /// Full institution name as printed, for the prompt.
    pub university_full_name: String,
    pub layout_type: LayoutType,
    pub country: Option<String>,
    pub structure: Structure,
    pub grade_format: GradeFormat,
    /// Detected column headers, in page order.
    pub columns: Vec<String>,
    pub has_semester_gpa: bool,
    pub gpa_label: String,
    pub has_cgpa: bool,
    pub cgpa_label: String,
    pub other_fields: BTreeSet<String>,
}
