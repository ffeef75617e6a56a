//! Field-path navigation for source payloads.
//!
//! The grammar is independent of any transport:
//! - dot paths with numeric array indices: `a.b.c`, `items.0.x`
//! - array filters: `items[key=value].field` (first element matching)
//! - slices and indices for `response_path`: `[1:]`, `[:5]`, `[0]`
//! - CSS selectors with attribute extraction for HTML: `a.link@href`

use regex::Regex;
use scraper::ElementRef;
use serde_json::Value;
use std::sync::OnceLock;

fn filter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^\[]+)\[([^=\]]+)=([^\]]+)\]$").expect("valid regex"))
}

/// Split a path on dots, keeping `[key=value]` segments intact.
fn split_path(path: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&path[start..]);
    parts
}

/// Navigate a nested JSON value with dot notation, numeric array indices,
/// and `field[key=value]` array filters. Returns a clone of the target.
pub fn dot_access(item: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = item;
    for part in split_path(path) {
        if let Some(caps) = filter_re().captures(part) {
            let field_name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let filter_key = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let filter_value = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

            let container = match current {
                Value::Object(map) => map.get(field_name)?,
                _ => return None,
            };
            let array = container.as_array()?;
            current = array.iter().find(|el| {
                el.as_object()
                    .and_then(|m| m.get(filter_key))
                    .map(|v| json_eq_str(v, filter_value))
                    .unwrap_or(false)
            })?;
            continue;
        }

        match current {
            Value::Object(map) => current = map.get(part)?,
            Value::Array(items) => {
                let idx: usize = part.parse().ok()?;
                current = items.get(idx)?;
            }
            _ => return None,
        }
    }

    if current.is_null() {
        None
    } else {
        Some(current.clone())
    }
}

/// Loose equality between a JSON value and a filter literal: strings compare
/// directly, everything else through its JSON rendering.
fn json_eq_str(value: &Value, literal: &str) -> bool {
    match value {
        Value::String(s) => s == literal,
        other => other.to_string() == literal,
    }
}

/// Navigate an API response to its item list. `path` may be empty (the
/// response is the list), a dot path, or an array slice/index like
/// `[1:]` / `[0]`.
pub fn navigate_path(data: &Value, path: Option<&str>) -> Vec<Value> {
    let path = path.unwrap_or("").trim();
    if path.is_empty() {
        return match data {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };
    }

    if path.starts_with('[') && path.ends_with(']') {
        let inner = &path[1..path.len() - 1];
        let items = match data.as_array() {
            Some(items) => items,
            None => return Vec::new(),
        };
        if let Some((start, end)) = inner.split_once(':') {
            let start = start.trim().parse::<usize>().unwrap_or(0);
            let end = end
                .trim()
                .parse::<usize>()
                .unwrap_or(items.len())
                .min(items.len());
            if start >= end {
                return Vec::new();
            }
            return items[start..end].to_vec();
        }
        return match inner.trim().parse::<usize>() {
            Ok(idx) => items.get(idx).cloned().into_iter().collect(),
            Err(_) => Vec::new(),
        };
    }

    match dot_access(data, path) {
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

/// Extract a value from an HTML element via CSS selector.
///
/// `sel@attr` returns the attribute of the first match (an empty selector
/// before `@` targets the element itself); a bare selector returns the text
/// content with whitespace collapsed.
pub fn css_select(element: ElementRef<'_>, selector: &str) -> Option<String> {
    if let Some((sel, attr)) = selector.split_once('@') {
        let target = if sel.is_empty() {
            Some(element)
        } else {
            let parsed = scraper::Selector::parse(sel).ok()?;
            element.select(&parsed).next()
        };
        return target?.value().attr(attr).map(str::to_string);
    }

    let parsed = scraper::Selector::parse(selector).ok()?;
    let el = element.select(&parsed).next()?;
    let text = el.text().collect::<Vec<_>>().join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;
    use serde_json::json;

    #[test]
    fn dot_access_simple() {
        let data = json!({"a": {"b": 1}});
        assert_eq!(dot_access(&data, "a.b"), Some(json!(1)));
        assert_eq!(dot_access(&data, "name"), None);
    }

    #[test]
    fn dot_access_numeric_index() {
        let data = json!({"items": [{"x": 1}, {"x": 2}]});
        assert_eq!(dot_access(&data, "items.0.x"), Some(json!(1)));
        assert_eq!(dot_access(&data, "items.1.x"), Some(json!(2)));
        assert_eq!(dot_access(&data, "items.5.x"), None);
    }

    #[test]
    fn dot_access_array_filter() {
        let data = json!({"items": [{"type": "A"}, {"type": "B", "val": 5}]});
        assert_eq!(dot_access(&data, "items[type=B].val"), Some(json!(5)));
        assert_eq!(dot_access(&data, "items[type=C].val"), None);
    }

    #[test]
    fn dot_access_filter_with_numeric_value() {
        let data = json!({"rows": [{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]});
        assert_eq!(dot_access(&data, "rows[id=2].v"), Some(json!("b")));
    }

    #[test]
    fn dot_access_null_is_absent() {
        let data = json!({"a": null});
        assert_eq!(dot_access(&data, "a"), None);
    }

    #[test]
    fn navigate_empty_path_returns_list() {
        let data = json!([1, 2, 3]);
        assert_eq!(navigate_path(&data, None), vec![json!(1), json!(2), json!(3)]);

        let scalar = json!({"a": 1});
        assert_eq!(navigate_path(&scalar, None), vec![scalar.clone()]);
    }

    #[test]
    fn navigate_dot_path() {
        let data = json!({"data": {"results": [{"id": 1}]}});
        assert_eq!(
            navigate_path(&data, Some("data.results")),
            vec![json!({"id": 1})]
        );
    }

    #[test]
    fn navigate_slices_and_indices() {
        let data = json!([0, 1, 2, 3]);
        assert_eq!(navigate_path(&data, Some("[1:]")), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(navigate_path(&data, Some("[:2]")), vec![json!(0), json!(1)]);
        assert_eq!(navigate_path(&data, Some("[2]")), vec![json!(2)]);
        assert_eq!(navigate_path(&data, Some("[9]")), Vec::<Value>::new());
    }

    #[test]
    fn navigate_missing_path_is_empty() {
        let data = json!({"jobs": []});
        assert_eq!(navigate_path(&data, Some("positions")), Vec::<Value>::new());
    }

    #[test]
    fn css_text_collapses_whitespace() {
        let html = Html::parse_fragment(
            "<div class='job'><span class='title'>  Senior\n  Engineer </span></div>",
        );
        let root = html.root_element();
        assert_eq!(
            css_select(root, ".title"),
            Some("Senior Engineer".to_string())
        );
    }

    #[test]
    fn css_attribute_extraction() {
        let html =
            Html::parse_fragment("<div><a class='link' href='/jobs/1' data-id='42'>Job</a></div>");
        let root = html.root_element();
        assert_eq!(css_select(root, "a.link@href"), Some("/jobs/1".to_string()));
        assert_eq!(css_select(root, ".link@data-id"), Some("42".to_string()));
        assert_eq!(css_select(root, ".missing@href"), None);
    }
}
