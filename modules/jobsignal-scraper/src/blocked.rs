//! Anti-bot / blocked-response detection.

/// Marker -> human-readable reason, checked against HTML bodies that arrived
/// where a feed or JSON document was expected.
const ANTIBOT_MARKERS: [(&str, &str); 13] = [
    ("captcha", "CAPTCHA challenge detected"),
    ("recaptcha", "reCAPTCHA challenge detected"),
    ("hcaptcha", "hCaptcha challenge detected"),
    ("challenge-platform", "Cloudflare challenge detected"),
    ("cf-browser-verification", "Cloudflare verification detected"),
    ("just a moment", "Cloudflare waiting page detected"),
    ("robot", "Robot detection page"),
    ("access denied", "Access denied"),
    ("rate limit", "Rate limited"),
    ("too many requests", "Too many requests"),
    ("403 forbidden", "403 Forbidden response"),
    ("please verify", "Verification required"),
    ("blocked", "Access blocked"),
];

/// Returns true when a body is HTML rather than the XML/JSON we asked for.
pub fn looks_like_html(content: &str) -> bool {
    let lower: String = content.chars().take(2048).collect::<String>().to_lowercase();
    ["<!doctype html", "<html", "<head>", "<body>"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Detect an anti-bot/blocked page in a response body that failed to parse
/// as the expected format. Returns the reason when blocked.
pub fn detect_blocked_response(content: &str, parse_issue: &str) -> Option<String> {
    if !looks_like_html(content) {
        return None;
    }

    let lower = content.to_lowercase();
    for (marker, reason) in ANTIBOT_MARKERS {
        if lower.contains(marker) {
            return Some(reason.to_string());
        }
    }

    // Plain HTML where a feed should be is itself a block signal.
    Some(format!(
        "HTML page received instead of expected feed (parse error: {parse_issue})"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloudflare_waiting_page_detected() {
        let body = "<!DOCTYPE html><html><title>Just a moment...</title></html>";
        assert_eq!(
            detect_blocked_response(body, "xml parse failed"),
            Some("Cloudflare waiting page detected".to_string())
        );
    }

    #[test]
    fn captcha_detected() {
        let body = "<html><div class='g-recaptcha'></div></html>";
        assert_eq!(
            detect_blocked_response(body, "no entries"),
            Some("reCAPTCHA challenge detected".to_string())
        );
    }

    #[test]
    fn non_html_is_not_blocked() {
        assert_eq!(detect_blocked_response("plain text error", "oops"), None);
        assert_eq!(detect_blocked_response("<?xml version=\"1.0\"?><rss/>", "x"), None);
    }

    #[test]
    fn generic_html_reports_parse_error() {
        let body = "<html><body>Welcome to our site</body></html>";
        let reason = detect_blocked_response(body, "not xml").unwrap();
        assert!(reason.contains("HTML page received"));
        assert!(reason.contains("not xml"));
    }
}
