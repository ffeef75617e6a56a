/// Extract a JSON value from an LLM response.
///
/// Models wrap JSON in markdown fences or prose more often than not; this
/// strips fences and falls back to the first balanced `{...}` / `[...]` span.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    // ```json ... ``` or ``` ... ```
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            if let Ok(value) = serde_json::from_str(after[..end].trim()) {
                return Some(value);
            }
        }
    }

    // First balanced object or array in the text.
    for open in ['{', '['] {
        let close = if open == '{' { '}' } else { ']' };
        if let Some(start) = trimmed.find(open) {
            let mut depth = 0usize;
            for (i, c) in trimmed[start..].char_indices() {
                if c == open {
                    depth += 1;
                } else if c == close {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &trimmed[start..start + i + 1];
                        if let Ok(value) = serde_json::from_str(candidate) {
                            return Some(value);
                        }
                        break;
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_plain_json() {
        assert_eq!(
            extract_json(r#"{"name": "Acme"}"#),
            Some(json!({"name": "Acme"}))
        );
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "Here you go:\n```json\n{\"name\": \"Acme\"}\n```\nDone.";
        assert_eq!(extract_json(text), Some(json!({"name": "Acme"})));
    }

    #[test]
    fn extracts_embedded_object() {
        let text = "The answer is {\"score\": 3} as requested.";
        assert_eq!(extract_json(text), Some(json!({"score": 3})));
    }

    #[test]
    fn returns_none_for_prose() {
        assert_eq!(extract_json("no structured data here"), None);
    }
}
