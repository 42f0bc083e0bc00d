// Payload repair against the schema tree.
// Leaf problems never fail validation: missing or unusable values are
// replaced by the leaf default and recorded. Only an unparseable top level
// is fatal (and retryable by the caller).

use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::types::{join_path, ExtractionResult, FieldError, LeafNode, SchemaNode, ValueType};
use crate::pipeline::excerpt;
use crate::pipeline::sanitize::extract_json_object;

pub const MISSING_FIELD: &str = "missing field, defaulted";
pub const TYPE_MISMATCH: &str = "type mismatch";

/// The model output could not be read as a JSON object at all.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: String,
    pub excerpt: String,
}

/// Parse `raw_output` and repair it against `root`.
pub fn validate_payload(
    root: &SchemaNode,
    raw_output: &str,
) -> Result<ExtractionResult, ParseFailure> {
    let json = extract_json_object(raw_output);
    let parsed: Value = serde_json::from_str(&json).map_err(|e| ParseFailure {
        reason: format!("invalid JSON: {e}"),
        excerpt: excerpt(raw_output),
    })?;

    if !parsed.is_object() {
        return Err(ParseFailure {
            reason: "top-level value is not a JSON object".into(),
            excerpt: excerpt(raw_output),
        });
    }

    let mut errors = Vec::new();
    let payload = repair_node(root, Some(&parsed), "", &mut errors);

    if !errors.is_empty() {
        tracing::debug!(
            error_count = errors.len(),
            "Payload repaired against schema"
        );
    }

    Ok(ExtractionResult {
        payload,
        errors,
        transformed_flag: true,
        fingerprint: None,
        cache_hit: false,
        attempts: 1,
    })
}

fn record(errors: &mut Vec<FieldError>, path: &str, message: &str) {
    errors.push(FieldError {
        path: path.to_string(),
        message: message.to_string(),
    });
}

fn repair_node(
    node: &SchemaNode,
    value: Option<&Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Value {
    match node {
        SchemaNode::Leaf(leaf) => repair_leaf(leaf, value, path, errors),
        SchemaNode::Object { fields } => {
            let source = match value {
                Some(Value::Object(map)) => Some(map),
                None | Some(Value::Null) => None,
                Some(_) => {
                    record(errors, path, TYPE_MISMATCH);
                    return node.default_payload();
                }
            };
            let mut out = Map::new();
            for field in fields {
                let child = source.and_then(|m| m.get(&field.key));
                let child_path = join_path(path, &field.key);
                out.insert(
                    field.key.clone(),
                    repair_node(&field.node, child, &child_path, errors),
                );
            }
            Value::Object(out)
        }
        SchemaNode::Array { element } => match value {
            Some(Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| repair_node(element, Some(item), &format!("{path}[{i}]"), errors))
                    .collect(),
            ),
            // A lone object where a list is expected is a list of one.
            Some(obj @ Value::Object(_)) => Value::Array(vec![repair_node(
                element,
                Some(obj),
                &format!("{path}[0]"),
                errors,
            )]),
            None | Some(Value::Null) => {
                record(errors, path, MISSING_FIELD);
                Value::Array(Vec::new())
            }
            Some(_) => {
                record(errors, path, TYPE_MISMATCH);
                Value::Array(Vec::new())
            }
        },
        SchemaNode::Passthrough { default_value } => match value {
            None | Some(Value::Null) => default_value.clone(),
            Some(v) => v.clone(),
        },
    }
}

fn repair_leaf(
    leaf: &LeafNode,
    value: Option<&Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Value {
    // Enveloped leaves accept either the envelope or a bare scalar.
    let raw = match value {
        Some(Value::Object(map)) if leaf.enveloped => map.get("value"),
        other => other,
    };

    match raw {
        None | Some(Value::Null) => {
            if leaf.required {
                record(errors, path, MISSING_FIELD);
            }
            leaf.rendered_default()
        }
        Some(Value::String(s)) if s.trim().is_empty() && leaf.value_type != ValueType::String => {
            if leaf.required {
                record(errors, path, MISSING_FIELD);
            }
            leaf.rendered_default()
        }
        Some(v) => match coerce(leaf.value_type, v) {
            Some(coerced) => leaf.render(coerced),
            None => {
                record(errors, path, TYPE_MISMATCH);
                leaf.rendered_default()
            }
        },
    }
}

/// Coerce `value` to `value_type`, or `None` if it cannot be.
///
/// - string: strings as-is, numbers rendered as text
/// - number: numbers as-is, numeric-looking strings parsed
/// - boolean: booleans as-is, "true"/"false" strings
fn coerce(value_type: ValueType, value: &Value) -> Option<Value> {
    match (value_type, value) {
        (ValueType::String, Value::String(_)) => Some(value.clone()),
        (ValueType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ValueType::Number, Value::Number(_)) => Some(value.clone()),
        (ValueType::Number, Value::String(s)) => parse_numeric(s).map(Value::Number),
        (ValueType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (ValueType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

/// Parse a numeric-looking string. A single decimal comma (`"8,5"`, common
/// on ten-point transcripts) is accepted as a decimal point.
fn parse_numeric(text: &str) -> Option<Number> {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::from(i));
    }
    let normalized = if !trimmed.contains('.') && trimmed.matches(',').count() == 1 {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };
    normalized
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::SchemaRegistry;
    use serde_json::json;

    fn small_schema() -> SchemaNode {
        SchemaNode::object(vec![
            (
                "info",
                SchemaNode::object(vec![
                    ("name", SchemaNode::Leaf(LeafNode::text("Name").with_meta("rule", "mixed"))),
                    ("credits", SchemaNode::Leaf(LeafNode::number("Credits"))),
                    ("honors", SchemaNode::Leaf(LeafNode::new("Honors", ValueType::Boolean))),
                ]),
            ),
            (
                "terms",
                SchemaNode::array(SchemaNode::object(vec![(
                    "grade",
                    SchemaNode::Leaf(LeafNode::text("grade")),
                )])),
            ),
            ("notes", SchemaNode::Leaf(LeafNode::text("notes").bare().optional())),
        ])
    }

    fn errors_at(result: &ExtractionResult, message: &str) -> Vec<String> {
        result
            .errors
            .iter()
            .filter(|e| e.message == message)
            .map(|e| e.path.clone())
            .collect()
    }

    #[test]
    fn complete_payload_has_no_errors() {
        let raw = r#"{
            "info": {
                "name": {"value": "Ada", "label": "Name", "rule": "mixed"},
                "credits": {"value": 12},
                "honors": {"value": true}
            },
            "terms": [{"grade": {"value": "A"}}],
            "notes": "ok"
        }"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.transformed_flag);
        assert_eq!(result.payload["info"]["name"]["value"], "Ada");
        assert_eq!(result.payload["info"]["credits"]["value"], 12);
        assert_eq!(result.payload["terms"][0]["grade"]["value"], "A");
        assert_eq!(result.payload["notes"], "ok");
    }

    #[test]
    fn missing_leaves_are_defaulted_not_dropped() {
        let result = validate_payload(&small_schema(), "{}").unwrap();
        assert_eq!(result.payload["info"]["name"]["value"], "");
        assert_eq!(result.payload["info"]["name"]["rule"], "mixed");
        assert_eq!(result.payload["info"]["credits"]["value"], 0);
        assert_eq!(result.payload["info"]["honors"]["value"], false);
        assert_eq!(result.payload["terms"], json!([]));
        assert_eq!(result.payload["notes"], "");

        let missing = errors_at(&result, MISSING_FIELD);
        assert!(missing.contains(&"info.name".to_string()));
        assert!(missing.contains(&"info.credits".to_string()));
        assert!(missing.contains(&"terms".to_string()));
        // Optional leaves default silently.
        assert!(!missing.contains(&"notes".to_string()));
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let raw = r#"{"info": {"credits": {"value": " 15 "}}, "terms": []}"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        assert_eq!(result.payload["info"]["credits"]["value"], 15);

        let raw = r#"{"info": {"credits": {"value": "8,5"}}, "terms": []}"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        assert_eq!(result.payload["info"]["credits"]["value"], 8.5);
    }

    #[test]
    fn numbers_coerce_to_strings_and_strings_to_bools() {
        let raw = r#"{"info": {"name": {"value": 3.5}, "honors": {"value": "TRUE"}}, "terms": []}"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        assert_eq!(result.payload["info"]["name"]["value"], "3.5");
        assert_eq!(result.payload["info"]["honors"]["value"], true);
    }

    #[test]
    fn non_coercible_values_are_type_mismatches() {
        let raw = r#"{
            "info": {"name": {"value": ["x"]}, "credits": {"value": "twelve"}, "honors": {"value": 1}},
            "terms": "none"
        }"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        let mismatched = errors_at(&result, TYPE_MISMATCH);
        assert_eq!(
            mismatched,
            vec!["info.name", "info.credits", "info.honors", "terms"]
        );
        assert_eq!(result.payload["info"]["credits"]["value"], 0);
        assert_eq!(result.payload["terms"], json!([]));
    }

    #[test]
    fn bare_scalars_accepted_for_enveloped_leaves() {
        let raw = r#"{"info": {"name": "Ada", "credits": 3, "honors": false}, "terms": []}"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.payload["info"]["name"]["value"], "Ada");
        assert_eq!(result.payload["info"]["name"]["label"], "Name");
    }

    #[test]
    fn arrays_validated_element_wise_with_indexed_paths() {
        let raw = r#"{"info": {}, "terms": [{"grade": {"value": "A"}}, {}, {"grade": {"value": "B+"}}]}"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        let terms = result.payload["terms"].as_array().unwrap();
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[1]["grade"]["value"], "");
        assert!(errors_at(&result, MISSING_FIELD).contains(&"terms[1].grade".to_string()));
    }

    #[test]
    fn lone_object_in_array_position_is_wrapped() {
        let raw = r#"{"info": {}, "terms": {"grade": {"value": "C"}}}"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        assert_eq!(result.payload["terms"][0]["grade"]["value"], "C");
    }

    #[test]
    fn unknown_keys_are_dropped_and_metadata_restored() {
        let raw = r#"{"info": {"name": {"value": "Ada", "rule": "tampered", "extra": 1}}, "terms": [], "junk": 1}"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        assert!(result.payload.get("junk").is_none());
        assert_eq!(result.payload["info"]["name"]["rule"], "mixed");
        assert!(result.payload["info"]["name"].get("extra").is_none());
    }

    #[test]
    fn object_type_mismatch_defaults_subtree() {
        let raw = r#"{"info": "oops", "terms": []}"#;
        let result = validate_payload(&small_schema(), raw).unwrap();
        assert_eq!(errors_at(&result, TYPE_MISMATCH), vec!["info"]);
        assert_eq!(result.payload["info"]["credits"]["value"], 0);
    }

    #[test]
    fn unparseable_output_is_parse_failure() {
        let err = validate_payload(&small_schema(), "Sorry, I can't read this.").unwrap_err();
        assert!(err.reason.contains("invalid JSON"));
        assert!(err.excerpt.contains("Sorry"));
    }

    #[test]
    fn non_object_top_level_is_parse_failure() {
        let err = validate_payload(&small_schema(), "[1, 2, 3]").unwrap_err();
        assert!(err.reason.contains("not a JSON object"));
    }

    #[test]
    fn fenced_output_is_accepted() {
        let raw = "```json\n{\"info\": {}, \"terms\": []}\n```";
        assert!(validate_payload(&small_schema(), raw).is_ok());
    }

    #[test]
    fn canonical_schema_never_fails_on_well_formed_json() {
        let registry = SchemaRegistry::canonical();
        for raw in [
            "{}",
            r#"{"studentinfo": null}"#,
            r#"{"academicrecord": [{}, {"courseDetails": [{}]}]}"#,
            r#"{"totalSummary": 7, "gpaSummary": []}"#,
        ] {
            let result = registry.validate(raw).unwrap();
            assert!(result.transformed_flag);
            for section in ["studentinfo", "collegeInfo", "gpaSummary", "totalSummary", "academicrecord"] {
                assert!(result.payload.get(section).is_some(), "{section} missing for {raw}");
            }
        }
    }

    #[test]
    fn canonical_payload_round_trips_without_errors() {
        let registry = SchemaRegistry::canonical();
        let raw = registry.example_json().to_string();
        let result = registry.validate(&raw).unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.payload, registry.example_json());
    }
}
