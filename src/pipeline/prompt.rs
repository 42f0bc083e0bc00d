//! Prompt construction for the three model calls.
//!
//! Detection and layout-analysis prompts are fixed; the extraction prompt is
//! rendered from a layout descriptor and the canonical schema. Rendering is
//! pure: the same inputs always give byte-identical text, which is what lets
//! a stored template body stand in for a fresh composition.

use serde_json::Value;

use crate::pipeline::layout::{LayoutDescriptor, QuickDetection};
use crate::pipeline::schema::SchemaRegistry;

/// Placeholder for descriptor values the layout analysis did not provide.
pub const NOT_SPECIFIED: &str = "not specified";

/// Appended to the extraction prompt when the previous answer was not JSON.
pub const STRICT_JSON_DIRECTIVE: &str = "Return ONLY valid JSON.";

pub const QUICK_DETECT_PROMPT: &str = r#"Identify this student transcript:
1. University name (exact)
2. Layout type: 'tabular' | 'semester-block' | 'multi-column' | 'single-page'
3. Country

Return ONLY JSON, no markdown:
{"university": "name", "layout_type": "type", "country": "country or null"}"#;

pub const DEEP_LAYOUT_ANALYSIS_PROMPT: &str = r#"Analyze this transcript image IN DETAIL:

1. HEADER: University name/logo position, student info fields
2. GRADES: Table structure, column headers, grade format (letter/number/percentage)
3. SEMESTERS: How separated, SGPA per semester?
4. SUMMARY: CGPA location, other fields

Return JSON:
{
  "university_full_name": "",
  "header": {"position": "", "student_fields": []},
  "grades": {"structure": "single-table|multi-table|semester-blocks", "columns": [], "grade_format": "letter|10-point|percentage"},
  "semesters": {"organization": "", "has_semester_gpa": true, "gpa_label": "SGPA"},
  "summary": {"has_cgpa": true, "cgpa_label": "CGPA", "other_fields": []},
  "extractable_fields": []
}"#;

/// Opening line of every extraction prompt.
pub const EXTRACTION_PREAMBLE: &str = "You are a precise JSON extraction engine.";

const OUTPUT_REQUIREMENTS: &str = "OUTPUT REQUIREMENTS:
1. Return ONLY raw JSON - no markdown, no code blocks, no explanations
2. Do NOT wrap in ```json or ``` tags
3. Start with { and end with }
4. Use exactly this structure:";

const CLOSING_DIRECTIVE: &str =
    "CRITICAL: Your response must start with { and end with }. No other text before or after.";

/// How insistent the extraction prompt is about its output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    Standard,
    /// Escalation used after an unparseable answer.
    Strict,
}

/// Apply `variant` to a composed prompt body.
pub fn apply_variant(body: &str, variant: PromptVariant) -> String {
    match variant {
        PromptVariant::Standard => body.to_string(),
        PromptVariant::Strict => format!("{body}\n\n{STRICT_JSON_DIRECTIVE}\n"),
    }
}

/// Quick-detect prompt, optionally carrying a caller-supplied source hint.
pub fn build_quick_detect_prompt(source_hint: Option<&str>) -> String {
    match source_hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hint) => format!(
            "{QUICK_DETECT_PROMPT}\n\nHint: the document is believed to come from \"{hint}\". \
             Confirm or correct this from the image."
        ),
        None => QUICK_DETECT_PROMPT.to_string(),
    }
}

/// Deep analysis prompt, anchored on the quick-detect result when it named a source.
pub fn build_deep_analysis_prompt(quick: &QuickDetection) -> String {
    match quick.university.as_deref() {
        Some(university) => format!(
            "{DEEP_LAYOUT_ANALYSIS_PROMPT}\n\nThe transcript was identified as coming from \
             \"{university}\" with a {} layout.",
            quick.layout_type.as_str()
        ),
        None => DEEP_LAYOUT_ANALYSIS_PROMPT.to_string(),
    }
}

fn or_not_specified(value: &str) -> &str {
    if value.trim().is_empty() {
        NOT_SPECIFIED
    } else {
        value
    }
}

fn column_list(columns: &[String]) -> String {
    if columns.is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        columns.join(", ")
    }
}

/// Example payload in the shape the caller finally receives: the schema
/// example with the institution name prefilled and the result envelope
/// fields appended.
fn example_payload(schema: &SchemaRegistry, university_full_name: &str) -> Value {
    let mut example = schema.example_json();
    if let Some(value) = example.pointer_mut("/collegeInfo/INSTITUTION NAME/value") {
        *value = Value::String(university_full_name.to_string());
    }
    if let Value::Object(map) = &mut example {
        map.insert("errors".into(), Value::Array(Vec::new()));
        map.insert("transformed".into(), Value::Bool(true));
    }
    example
}

/// Render the extraction prompt body for `descriptor` against `schema`.
///
/// Schema metadata is emitted verbatim as a literal JSON example; the
/// composer never interprets it.
pub fn compose_extraction_prompt(descriptor: &LayoutDescriptor, schema: &SchemaRegistry) -> String {
    let university = or_not_specified(&descriptor.university);
    let full_name = or_not_specified(&descriptor.university_full_name);
    let columns = column_list(&descriptor.columns);
    let gpa_label = or_not_specified(&descriptor.gpa_label);
    let cgpa_label = or_not_specified(&descriptor.cgpa_label);
    let grade_format = descriptor.grade_format.as_str();
    let example = format!(
        "{:#}",
        example_payload(schema, descriptor.university_full_name.trim())
    );

    let mut prompt = String::with_capacity(example.len() + 2048);
    prompt.push_str(&format!(
        "{EXTRACTION_PREAMBLE} Extract data from this {university} transcript image.\n\n"
    ));

    prompt.push_str("LAYOUT ANALYSIS CONTEXT:\n");
    prompt.push_str(&format!("- University: {full_name}\n"));
    prompt.push_str(&format!("- Document Structure: {}\n", descriptor.structure.as_str()));
    prompt.push_str(&format!("- Grade Format: {grade_format}\n"));
    prompt.push_str(&format!("- Available Columns: {columns}\n"));
    prompt.push_str(&format!("- Has Semester GPA: {}\n", descriptor.has_semester_gpa));
    prompt.push_str(&format!("- Semester GPA Label: {gpa_label}\n"));
    prompt.push_str(&format!("- Has Overall CGPA: {}\n", descriptor.has_cgpa));
    prompt.push_str(&format!("- Overall CGPA Label: {cgpa_label}\n\n"));

    prompt.push_str(OUTPUT_REQUIREMENTS);
    prompt.push_str("\n\n");
    prompt.push_str(&example);
    prompt.push_str("\n\n");

    prompt.push_str("EXTRACTION RULES (Based on Layout Analysis):\n");
    prompt.push_str("- Student name → studentinfo.STUDENT NAME.value\n");
    prompt.push_str(&format!(
        "- University → collegeInfo.INSTITUTION NAME.value (use \"{full_name}\")\n"
    ));
    prompt.push_str("- Major/Program → studentinfo.major.value\n");
    prompt.push_str("- Each term/semester → new object in academicrecord array\n");
    prompt.push_str(
        "- Term format → academicrecord[].termDetails[].monthYear.value (e.g., \"Fall 2022\")\n",
    );
    prompt.push_str(&format!("- Course extraction follows detected columns: {columns}\n"));
    prompt.push_str(&format!("- Grade format: {grade_format}\n"));
    prompt.push_str(
        "- Each course → object in courseDetails with: course_id, course_name, credits_earned, grades, points, year_term\n",
    );
    prompt.push_str(&format!(
        "- GPA mapping: {gpa_label} → per-term GPA, {cgpa_label} → overall GPA\n"
    ));
    prompt.push_str(&format!(
        "- totalSummary[].overall_gpa.value gets the {cgpa_label} value\n"
    ));
    if !descriptor.other_fields.is_empty() {
        let others: Vec<&str> = descriptor.other_fields.iter().map(String::as_str).collect();
        prompt.push_str(&format!(
            "- Other visible fields (extract where the structure has a place for them): {}\n",
            others.join(", ")
        ));
    }
    prompt.push_str("- Empty strings for missing text, 0 for missing numbers\n");
    prompt.push_str("- Keep ALL metadata fields (label, rule, length, index, previewJson) unchanged\n");
    prompt.push_str("- Extract ALL visible semesters/terms from the transcript\n\n");

    prompt.push_str(CLOSING_DIRECTIVE);
    prompt.push('\n');
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::{GradeFormat, LayoutType, Structure};
    use std::collections::BTreeSet;

    fn state_college() -> LayoutDescriptor {
        LayoutDescriptor {
            university: "State College".into(),
            university_full_name: "State College".into(),
            layout_type: LayoutType::Tabular,
            country: Some("USA".into()),
            structure: Structure::SingleTable,
            grade_format: GradeFormat::Letter,
            columns: vec!["Course".into(), "Credits".into(), "Grade".into()],
            has_semester_gpa: true,
            gpa_label: "SGPA".into(),
            has_cgpa: true,
            cgpa_label: "CGPA".into(),
            other_fields: BTreeSet::new(),
        }
    }

    #[test]
    fn compose_substitutes_descriptor_values() {
        let prompt = compose_extraction_prompt(&state_college(), &SchemaRegistry::canonical());
        assert!(prompt.starts_with(EXTRACTION_PREAMBLE));
        assert!(prompt.contains("State College"));
        assert!(prompt.contains("single-table"));
        assert!(prompt.contains("letter"));
        assert!(prompt.contains("Course, Credits, Grade"));
        assert!(prompt.contains("Has Semester GPA: true"));
        assert!(prompt.contains("SGPA → per-term GPA, CGPA → overall GPA"));
        assert!(prompt.trim_end().ends_with(CLOSING_DIRECTIVE));
    }

    #[test]
    fn compose_is_idempotent() {
        let schema = SchemaRegistry::canonical();
        let d = state_college();
        assert_eq!(
            compose_extraction_prompt(&d, &schema),
            compose_extraction_prompt(&d, &schema)
        );
    }

    #[test]
    fn empty_columns_render_not_specified() {
        let mut d = state_college();
        d.columns.clear();
        let prompt = compose_extraction_prompt(&d, &SchemaRegistry::canonical());
        assert!(prompt.contains("- Available Columns: not specified\n"));
        assert!(prompt.contains("follows detected columns: not specified\n"));
        assert!(!prompt.contains("Available Columns: \n"));
    }

    #[test]
    fn empty_labels_and_false_flags() {
        let mut d = state_college();
        d.has_semester_gpa = false;
        d.has_cgpa = false;
        d.gpa_label.clear();
        d.cgpa_label.clear();
        let prompt = compose_extraction_prompt(&d, &SchemaRegistry::canonical());
        assert!(prompt.contains("Has Semester GPA: false"));
        assert!(prompt.contains("Has Overall CGPA: false"));
        assert!(prompt.contains("Semester GPA Label: not specified"));
    }

    #[test]
    fn schema_metadata_is_embedded_verbatim() {
        let prompt = compose_extraction_prompt(&state_college(), &SchemaRegistry::canonical());
        assert!(prompt.contains("\"total_qualilty_number\""));
        assert!(prompt.contains("\"key\": \"credits_attempted\""));
        assert!(prompt.contains("\"previewJson\": true"));
        assert!(prompt.contains("\"academicrecordLLM\": []"));
    }

    #[test]
    fn example_matches_output_envelope() {
        let prompt = compose_extraction_prompt(&state_college(), &SchemaRegistry::canonical());
        let start = prompt.find("\n{").unwrap() + 1;
        let end = prompt.find("\n}\n").unwrap() + 2;
        let example: serde_json::Value = serde_json::from_str(&prompt[start..end]).unwrap();

        assert_eq!(example["errors"], serde_json::json!([]));
        assert_eq!(example["transformed"], serde_json::json!(true));
        assert_eq!(
            example["collegeInfo"]["INSTITUTION NAME"]["value"],
            serde_json::json!("State College")
        );
        assert_eq!(
            example["collegeInfo"]["INSTITUTION NAME"]["label"],
            serde_json::json!("INSTITUTION NAME")
        );
    }

    #[test]
    fn other_fields_listed_in_sorted_order() {
        let mut d = state_college();
        d.other_fields = ["Rank".to_string(), "Degree".to_string()].into_iter().collect();
        let prompt = compose_extraction_prompt(&d, &SchemaRegistry::canonical());
        assert!(prompt.contains("Other visible fields (extract where the structure has a place for them): Degree, Rank"));
    }

    #[test]
    fn strict_variant_appends_directive() {
        let body = "body";
        assert_eq!(apply_variant(body, PromptVariant::Standard), "body");
        let strict = apply_variant(body, PromptVariant::Strict);
        assert!(strict.starts_with("body"));
        assert!(strict.trim_end().ends_with(STRICT_JSON_DIRECTIVE));
    }

    #[test]
    fn quick_detect_prompt_hint() {
        assert_eq!(build_quick_detect_prompt(None), QUICK_DETECT_PROMPT);
        assert_eq!(build_quick_detect_prompt(Some("  ")), QUICK_DETECT_PROMPT);
        let hinted = build_quick_detect_prompt(Some("Lakeside"));
        assert!(hinted.starts_with("Identify this student transcript"));
        assert!(hinted.contains("\"Lakeside\""));
    }

    #[test]
    fn deep_prompt_mentions_detected_source() {
        let quick = QuickDetection {
            university: Some("State College".into()),
            layout_type: LayoutType::Tabular,
            country: None,
        };
        let prompt = build_deep_analysis_prompt(&quick);
        assert!(prompt.starts_with("Analyze this transcript image"));
        assert!(prompt.contains("\"State College\" with a tabular layout"));
    }
}
