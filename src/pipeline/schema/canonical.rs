//! The canonical transcript schema and its registry.
//!
//! The tree mirrors the payload consumed downstream: student and college
//! header blocks, GPA summaries, and per-term academic records with course
//! rows. Field keys, labels and metadata are part of the downstream contract
//! and must not be renamed (including the historical `total_qualilty_number`
//! key).

use serde::Serialize;
use serde_json::{json, Value};

use super::types::{ExtractionResult, LeafNode, SchemaNode};
use super::validation::{validate_payload, ParseFailure};

/// Bump whenever a key, type, default or metadata entry changes. Templates
/// rendered against another version are treated as stale.
pub const SCHEMA_VERSION: &str = "1.0";

/// Holds the canonical schema and validates model output against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaRegistry {
    version: String,
    root: SchemaNode,
}

impl SchemaRegistry {
    pub fn new(version: &str, root: SchemaNode) -> Self {
        Self {
            version: version.to_string(),
            root,
        }
    }

    /// The transcript schema at `SCHEMA_VERSION`.
    pub fn canonical() -> Self {
        Self::new(SCHEMA_VERSION, canonical_transcript_schema())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// The literal example structure shown to the model.
    pub fn example_json(&self) -> Value {
        self.root.example()
    }

    /// Parse raw model output and repair it against the schema.
    pub fn validate(&self, raw_output: &str) -> Result<ExtractionResult, ParseFailure> {
        validate_payload(&self.root, raw_output)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::canonical()
    }
}

/// `{"value": "", "label": <label>, "rule": "mixed", "length": <length>}`
fn mixed(label: &str, length: u32) -> LeafNode {
    LeafNode::text(label)
        .with_meta("rule", "mixed")
        .with_meta("length", length)
}

fn previewed(leaf: LeafNode) -> LeafNode {
    leaf.with_meta("previewJson", true)
}

fn indexed(leaf: LeafNode, index: u32) -> LeafNode {
    leaf.with_meta("index", index)
}

fn leaf(leaf: LeafNode) -> SchemaNode {
    SchemaNode::Leaf(leaf)
}

fn student_info() -> SchemaNode {
    SchemaNode::object(vec![
        ("SPRIDEN ID", leaf(previewed(mixed("SPRIDEN ID", 25)))),
        ("SPRIDEN_PIDM", leaf(previewed(mixed("SPRIDEN_PIDM", 25)))),
        ("STUDENT NAME", leaf(mixed("STUDENT NAME", 25))),
        ("MAILING ADDRESS", leaf(mixed("MAILING ADDRESS", 25))),
        ("Start Date", leaf(mixed("Start Date", 20))),
        ("End Date", leaf(mixed("End Date", 20))),
        ("major", leaf(mixed("Major", 40))),
    ])
}

fn college_info() -> SchemaNode {
    SchemaNode::object(vec![
        ("INSTITUTION TYPE", leaf(previewed(mixed("INSTITUTION TYPE", 25)))),
        ("INSTITUTION NAME", leaf(previewed(mixed("INSTITUTION NAME", 25)))),
        ("ADDRESS", leaf(mixed("ADDRESS", 25))),
        ("CITY", leaf(mixed("CITY", 25))),
        ("PHONE", leaf(mixed("PHONE", 25))),
        ("STATE", leaf(mixed("STATE", 25))),
        ("ZIP CODE", leaf(mixed("ZIP CODE", 25))),
        ("COLLEGE CODE", leaf(previewed(mixed("COLLEGE CODE", 25)))),
    ])
}

fn gpa_summary() -> SchemaNode {
    SchemaNode::object(vec![
        (
            "TOTAL TRANSFERABLE CREDITS",
            leaf(previewed(mixed("TOTAL TRANSFERABLE CREDITS", 25))),
        ),
        ("TOTAL CTX CREDITS", leaf(previewed(mixed("TOTAL CTX CREDITS", 25)))),
        (
            "Total Credit Earned",
            leaf(previewed(
                LeafNode::number("Total Credit Earned")
                    .with_meta("rule", "mixed")
                    .with_meta("length", 25),
            )),
        ),
        (
            "calculated_col_gpa",
            leaf(previewed(
                mixed("calculated_col_gpa", 25).with_default(json!("0.000")),
            )),
        ),
    ])
}

fn total_summary_entry() -> SchemaNode {
    SchemaNode::object(vec![
        ("overall_earned_hours", leaf(mixed("overall_earned_hours", 25))),
        ("overall_gpa", leaf(mixed("overall_gpa", 25))),
        (
            "total_institution_earned_hours",
            leaf(mixed("total_institution_earned_hours", 25)),
        ),
        (
            "total_transfer_earned_hours",
            leaf(mixed("total_transfer_earned_hours", 25)),
        ),
        (
            "total_credit_earned",
            leaf(
                LeafNode::number("total_credit_earned")
                    .with_meta("rule", "mixed")
                    .with_meta("length", 25),
            ),
        ),
        (
            "total_qualilty_number",
            leaf(
                LeafNode::number("total_quality_number")
                    .with_meta("rule", "mixed")
                    .with_meta("length", 25),
            ),
        ),
    ])
}

fn term_detail() -> SchemaNode {
    SchemaNode::object(vec![(
        "monthYear",
        leaf(indexed(mixed("monthYear", 25), 0)),
    )])
}

fn course_detail() -> SchemaNode {
    SchemaNode::object(vec![
        ("course_id", leaf(indexed(mixed("course_id", 25), 0))),
        ("course_name", leaf(indexed(mixed("course_name", 25), 1))),
        (
            "credits_earned",
            leaf(indexed(mixed("credits_earned", 25), 2).with_meta("key", "credits_attempted")),
        ),
        ("grades", leaf(indexed(mixed("grades", 25), 3))),
        ("points", leaf(indexed(LeafNode::text("points"), 4).optional())),
        ("year_term", leaf(indexed(LeafNode::text("year_term"), 5).optional())),
    ])
}

fn academic_record() -> SchemaNode {
    SchemaNode::object(vec![
        ("termDetails", SchemaNode::array(term_detail())),
        ("courseDetails", SchemaNode::array(course_detail())),
    ])
}

/// Build the canonical transcript schema tree.
pub fn canonical_transcript_schema() -> SchemaNode {
    SchemaNode::object(vec![
        ("studentinfo", student_info()),
        ("collegeInfo", college_info()),
        ("gpaSummary", gpa_summary()),
        ("totalSummary", SchemaNode::array(total_summary_entry())),
        ("academicrecord", SchemaNode::array(academic_record())),
        ("academicrecordLLM", SchemaNode::passthrough(json!([]))),
        (
            "pagewise_academic_records",
            leaf(LeafNode::text("pagewise_academic_records").bare().optional()),
        ),
    ])
}
