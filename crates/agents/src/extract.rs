//! Helpers for pulling structured data out of model responses.
//!
//! Models are asked for bare JSON but routinely wrap it in prose, so
//! parsing is lenient: find the first balanced object, then read
//! fields with defaults instead of failing on absences.

use serde_json::Value;

/// Extracts the first balanced JSON object from text that may carry
/// other content around it.
pub fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0;
    let mut end = start;

    for (i, c) in s[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(&s[start..end])
    } else {
        None
    }
}

/// String field with a fallback.
pub fn str_field<'a>(parsed: &'a Value, key: &str, default: &'a str) -> &'a str {
    parsed.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// f64 field with a fallback.
pub fn f64_field(parsed: &Value, key: &str, default: f64) -> f64 {
    parsed.get(key).and_then(Value::as_f64).unwrap_or(default)
}

/// String-array field; non-string entries are dropped.
pub fn str_list(parsed: &Value, key: &str) -> Vec<String> {
    parsed
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_object_simple() {
        let input = r#"{"category":"performance","confidence":0.9}"#;
        assert_eq!(extract_json_object(input), Some(input));
    }

    #[test]
    fn test_extract_json_object_with_surrounding_text() {
        let input = r#"Here is my answer: {"category":"performance"} Hope that helps!"#;
        assert_eq!(
            extract_json_object(input),
            Some(r#"{"category":"performance"}"#)
        );
    }

    #[test]
    fn test_extract_json_object_nested() {
        let input = r#"{"summary":"x","meta":{"nested":true}}"#;
        assert_eq!(extract_json_object(input), Some(input));
    }

    #[test]
    fn test_extract_json_object_none() {
        assert_eq!(extract_json_object("No JSON here"), None);
    }

    #[test]
    fn test_extract_json_object_incomplete() {
        assert_eq!(extract_json_object(r#"{"category":"performance"#), None);
    }

    #[test]
    fn test_field_defaults() {
        let parsed = json!({ "summary": "hi", "confidence": 0.4 });

        assert_eq!(str_field(&parsed, "summary", "fallback"), "hi");
        assert_eq!(str_field(&parsed, "missing", "fallback"), "fallback");
        assert_eq!(f64_field(&parsed, "confidence", 0.5), 0.4);
        assert_eq!(f64_field(&parsed, "missing", 0.5), 0.5);
    }

    #[test]
    fn test_str_list_drops_non_strings() {
        let parsed = json!({ "steps": ["one", 2, "three", null] });
        assert_eq!(str_list(&parsed, "steps"), vec!["one", "three"]);
        assert!(str_list(&parsed, "missing").is_empty());
    }
}
