//! Model output cleanup before JSON parsing.
//!
//! Vision models wrap JSON in fences, prepend reasoning, or add a closing
//! remark even when told not to. Everything here is lossless for a response
//! that already is a bare JSON object.

use std::sync::LazyLock;

use regex::Regex;

/// Strip model-specific artifacts from raw output.
///
/// Handles:
/// 1. Gemma-style thinking prefixes (`<unusedN>thought\n...`)
/// 2. `<think>...</think>` blocks
/// 3. Stray `<unusedN>` tokens
pub fn sanitize_model_output(raw: &str) -> String {
    let mut text = raw.to_string();

    if let Some(idx) = text.find("<unused") {
        if let Some(thought_offset) = text[idx..].find("thought\n") {
            text = text[idx + thought_offset + 8..].to_string();
        }
    }

    static THINK_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
    text = THINK_BLOCK_RE.replace_all(&text, "").to_string();

    static UNUSED_TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));
    text = UNUSED_TOKEN_RE.replace_all(&text, "").to_string();

    text.trim().to_string()
}

/// Isolate the outermost JSON object in a model response.
///
/// Takes everything from the first `{` to the last `}`. Code fences and any
/// prose around the object fall outside that span. When no braces are
/// present the sanitized text is returned unchanged and the JSON parser
/// reports the failure.
pub fn extract_json_object(raw: &str) -> String {
    let text = sanitize_model_output(raw);
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => text[start..=end].to_string(),
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_unchanged() {
        let raw = r#"{"university": "State College"}"#;
        assert_eq!(extract_json_object(raw), raw);
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(raw), "{\"a\": 1}");
    }

    #[test]
    fn strips_surrounding_prose() {
        let raw = "Here is the data:\n{\"a\": {\"b\": 2}}\nLet me know if you need more.";
        assert_eq!(extract_json_object(raw), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn strips_thinking_prefix() {
        let raw = "<unused94>thought\nThe layout looks tabular.<unused95>{\"a\": 1}";
        assert_eq!(extract_json_object(raw), "{\"a\": 1}");
    }

    #[test]
    fn strips_think_block_with_braces() {
        let raw = "<think>maybe {\"wrong\": true}</think>\n{\"right\": true}";
        assert_eq!(extract_json_object(raw), "{\"right\": true}");
    }

    #[test]
    fn no_braces_returns_text() {
        assert_eq!(extract_json_object("  I cannot read this image.  "), "I cannot read this image.");
    }

    #[test]
    fn removes_stray_unused_tokens() {
        assert_eq!(sanitize_model_output("<unused3>hello<unused4>"), "hello");
    }
}
