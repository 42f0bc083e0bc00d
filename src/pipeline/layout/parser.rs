use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::types::{GradeFormat, LayoutDescriptor, LayoutType, QuickDetection, Structure};
use crate::pipeline::sanitize::extract_json_object;

/// Parse the raw response into a JSON object, or describe why not.
fn parse_object(raw: &str) -> Result<Map<String, Value>, String> {
    let json = extract_json_object(raw);
    match serde_json::from_str::<Value>(&json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("response is not a JSON object".into()),
        Err(e) => Err(format!("response is not valid JSON: {e}")),
    }
}

/// Non-empty trimmed string, treating placeholder nulls as absent.
fn text_value(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("unknown") {
        None
    } else {
        Some(s.to_string())
    }
}

fn bool_value(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| text_value(Some(item)))
            .collect(),
        _ => Vec::new(),
    }
}

/// First value found under `root[section][key]`, then `root[key]`, trying
/// each key spelling in turn.
fn pick<'a>(root: &'a Map<String, Value>, section: &str, keys: &[&str]) -> Option<&'a Value> {
    let nested = root.get(section).and_then(Value::as_object);
    keys.iter()
        .find_map(|k| nested.and_then(|s| s.get(*k)))
        .or_else(|| keys.iter().find_map(|k| root.get(*k)))
        .filter(|v| !v.is_null())
}

/// Parse a quick-detect response.
///
/// A missing university is only acceptable together with a missing country;
/// a country without a university is treated as a malformed answer.
pub fn parse_quick_detection(raw: &str) -> Result<QuickDetection, String> {
    let root = parse_object(raw)?;

    let layout_raw = root
        .get("layout_type")
        .or_else(|| root.get("layoutType"))
        .and_then(Value::as_str)
        .ok_or("missing layout_type")?;
    let layout_type = LayoutType::parse(layout_raw)
        .ok_or_else(|| format!("unknown layout_type '{layout_raw}'"))?;

    let university = text_value(root.get("university").or_else(|| root.get("university_name")));
    let country = text_value(root.get("country"));

    if university.is_none() && country.is_some() {
        return Err("university missing while country is present".into());
    }

    Ok(QuickDetection {
        university,
        layout_type,
        country,
    })
}

/// Parse a deep layout analysis response into a descriptor.
///
/// Accepts the nested analysis shape (`grades`, `semesters`, `summary`
/// sections) and a flat shape with the same keys at the top level.
/// `structure` and `grade_format` are mandatory.
pub fn parse_layout_analysis(
    raw: &str,
    quick: &QuickDetection,
) -> Result<LayoutDescriptor, String> {
    let root = parse_object(raw)?;

    let structure_raw = pick(&root, "grades", &["structure"])
        .and_then(Value::as_str)
        .ok_or("missing grades.structure")?;
    let structure = Structure::parse(structure_raw)
        .ok_or_else(|| format!("unknown structure '{structure_raw}'"))?;

    let grade_raw = pick(&root, "grades", &["grade_format", "gradeFormat"])
        .and_then(Value::as_str)
        .ok_or("missing grades.grade_format")?;
    let grade_format = GradeFormat::parse(grade_raw)
        .ok_or_else(|| format!("unknown grade_format '{grade_raw}'"))?;

    let columns = string_list(pick(&root, "grades", &["columns"]));

    let has_semester_gpa =
        bool_value(pick(&root, "semesters", &["has_semester_gpa", "hasSemesterGpa"]))
            .unwrap_or(false);
    let gpa_label =
        text_value(pick(&root, "semesters", &["gpa_label", "gpaLabel"])).unwrap_or_default();
    let has_cgpa = bool_value(pick(&root, "summary", &["has_cgpa", "hasCgpa"])).unwrap_or(false);
    let cgpa_label =
        text_value(pick(&root, "summary", &["cgpa_label", "cgpaLabel"])).unwrap_or_default();

    let mut other_fields: BTreeSet<String> =
        string_list(pick(&root, "summary", &["other_fields", "otherFields"]))
            .into_iter()
            .collect();
    other_fields.extend(string_list(
        root.get("extractable_fields")
            .or_else(|| root.get("extractableFields")),
    ));
    other_fields.extend(string_list(pick(&root, "header", &["student_fields"])));

    let full_name = text_value(
        root.get("university_full_name")
            .or_else(|| root.get("universityFullName")),
    );
    let university = quick
        .university
        .clone()
        .or_else(|| full_name.clone())
        .unwrap_or_default();

    Ok(LayoutDescriptor {
        university_full_name: full_name.unwrap_or_else(|| university.clone()),
        university,
        layout_type: quick.layout_type,
        country: quick.country.clone(),
        structure,
        grade_format,
        columns,
        has_semester_gpa,
        gpa_label,
        has_cgpa,
        cgpa_label,
        other_fields,
    })
}
