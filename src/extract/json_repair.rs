//! Defensive parsing of model output
//!
//! Models asked for "JSON only" still wrap answers in code fences or prose. This
//! module recovers the first JSON object from such text, or reports nothing.

use serde_json::Value;

/// Extracts a JSON object from model output
///
/// # Strategy
///
/// 1. The whole text parsed as JSON
/// 2. The contents of a fenced code block
/// 3. The first balanced `{ ... }` span, string-aware
///
/// # Returns
///
/// * `Some(Value::Object)` - The first object found
/// * `None` - No object could be recovered
pub fn parse_json_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(obj) = parse_object(trimmed) {
        return Some(obj);
    }

    if let Some(inner) = fenced_block(trimmed) {
        if let Some(obj) = parse_object(inner.trim()) {
            return Some(obj);
        }
    }

    balanced_object(trimmed).and_then(parse_object)
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip the language tag line, if any
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(
            parse_json_object(r#"{"business_name":"Acme"}"#),
            Some(json!({"business_name": "Acme"}))
        );
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here you go:\n```json\n{\"rating\": 4.2}\n```\nAnything else?";
        assert_eq!(parse_json_object(raw), Some(json!({"rating": 4.2})));
    }

    #[test]
    fn test_prose_wrapped_json_with_braces_in_strings() {
        let raw = r#"Sure! {"industry": "Bakery {fresh}", "phone": null} Hope that helps."#;
        assert_eq!(
            parse_json_object(raw),
            Some(json!({"industry": "Bakery {fresh}", "phone": null}))
        );
    }

    #[test]
    fn test_rejects_non_objects_and_garbage() {
        assert_eq!(parse_json_object("[1, 2, 3]"), None);
        assert_eq!(parse_json_object("I could not find anything."), None);
        assert_eq!(parse_json_object("{\"unterminated\": "), None);
        assert_eq!(parse_json_object(""), None);
    }
}
