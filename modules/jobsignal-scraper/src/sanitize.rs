//! Text sanitizers for scraped fields.

use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"))
}

fn entity_decode(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip markup and collapse whitespace. Titles and company names come out
/// of feeds with stray tags and entities more often than not.
pub fn sanitize_title(text: &str) -> String {
    collapse_whitespace(&entity_decode(&tag_re().replace_all(text, " ")))
}

pub fn sanitize_company_name(text: &str) -> String {
    sanitize_title(text)
}

/// Strip HTML from a description while keeping paragraph breaks readable.
/// Entities are decoded first: board APIs (Greenhouse among them) ship
/// descriptions as HTML-escaped HTML.
pub fn sanitize_html_description(text: &str) -> String {
    let decoded = entity_decode(text);
    let with_breaks = decoded
        .replace("</p>", "\n")
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</li>", "\n");
    let stripped = tag_re().replace_all(&with_breaks, " ");

    stripped
        .lines()
        .map(collapse_whitespace)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_strips_tags_and_entities() {
        assert_eq!(
            sanitize_title("<b>Senior&nbsp;Engineer</b> &amp; Lead"),
            "Senior Engineer & Lead"
        );
    }

    #[test]
    fn description_keeps_paragraphs() {
        let html = "<p>First paragraph.</p><p>Second   paragraph.</p>";
        assert_eq!(
            sanitize_html_description(html),
            "First paragraph.\nSecond paragraph."
        );
    }

    #[test]
    fn description_handles_lists() {
        let html = "<ul><li>Rust</li><li>Postgres</li></ul>";
        assert_eq!(sanitize_html_description(html), "Rust\nPostgres");
    }

    #[test]
    fn description_handles_escaped_html() {
        let escaped = "&lt;p&gt;Board-escaped &amp;amp; markup&lt;/p&gt;";
        assert_eq!(
            sanitize_html_description(escaped),
            "Board-escaped &amp; markup"
        );
    }
}
