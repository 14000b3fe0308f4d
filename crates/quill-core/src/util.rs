//! Small text helpers shared by the store, realtime and AI clients.

use url::Url;

const EXCERPT_CHARS: usize = 180;

/// Trimmed copy of `value`, or `None` when nothing but whitespace is left.
pub fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Whether `value` parses as an absolute `http`/`https` URL with a host.
pub fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// Single-line excerpt of a response body for error messages.
///
/// Whitespace runs collapse to one space; long bodies are cut and end in `...`.
pub fn error_excerpt(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_CHARS {
        return collapsed;
    }
    let mut excerpt: String = collapsed.chars().take(EXCERPT_CHARS - 3).collect();
    excerpt.push_str("...");
    excerpt
}

/// Display name announced to peers: the local part of an email address.
pub fn display_name_from_email(email: Option<&str>) -> String {
    email
        .and_then(|email| email.split('@').next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| "Anonymous".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_blank_trims_and_drops_whitespace() {
        assert_eq!(non_blank("  anon-key \n"), Some("anon-key".to_string()));
        assert_eq!(non_blank(" \t "), None);
    }

    #[test]
    fn http_url_needs_scheme_and_host() {
        assert!(is_http_url("http://localhost:54321"));
        assert!(is_http_url("https://project.supabase.co"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
        assert!(!is_http_url("https://"));
    }

    #[test]
    fn error_excerpt_collapses_and_cuts_long_bodies() {
        assert_eq!(error_excerpt("  row\n  locked  "), "row locked");

        let long = error_excerpt(&"x".repeat(400));
        assert_eq!(long.chars().count(), EXCERPT_CHARS);
        assert!(long.ends_with("..."));
    }

    #[test]
    fn display_name_uses_email_local_part() {
        assert_eq!(display_name_from_email(Some("ada@example.com")), "ada");
        assert_eq!(display_name_from_email(Some("@example.com")), "Anonymous");
        assert_eq!(display_name_from_email(None), "Anonymous");
    }
}
