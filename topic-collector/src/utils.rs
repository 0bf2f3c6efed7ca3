/// URL helpers
pub mod url {
    use url::Url;

    /// Extract domain from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        Url::parse(url_str).ok()?.domain().map(|d| d.to_string())
    }

    pub fn is_valid_http_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
            Err(_) => false,
        }
    }

    /// Key under which two URLs count as the same item: lowercased, trailing slashes dropped.
    pub fn dedup_key(url_str: &str) -> String {
        url_str.trim().to_lowercase().trim_end_matches('/').to_string()
    }
}

/// Text processing utilities
pub mod text {
    use once_cell::sync::Lazy;
    use regex::Regex;
    use scraper::{Html, Node};

    /// Hard cap on body length kept per record.
    pub const MAX_BODY_CHARS: usize = 10_000;

    static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));
    static HASHTAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid hashtag regex"));
    static MENTION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));

    const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "head", "template"];

    /// Visible text of an HTML document or fragment, whitespace collapsed.
    pub fn html_to_text(html: &str) -> String {
        let document = Html::parse_document(html);
        let mut parts: Vec<&str> = Vec::new();
        for node in document.tree.nodes() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
            });
            if !hidden {
                parts.push(text);
            }
        }
        collapse_whitespace(&parts.join(" "))
    }

    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Truncate on a char boundary.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => text[..idx].to_string(),
            None => text.to_string(),
        }
    }

    pub fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    pub fn replace_urls(text: &str) -> String {
        URL_PATTERN.replace_all(text, "[URL]").into_owned()
    }

    pub fn extract_hashtags(text: &str) -> Vec<String> {
        HASHTAG_PATTERN.captures_iter(text).map(|c| c[1].to_string()).collect()
    }

    pub fn extract_mentions(text: &str) -> Vec<String> {
        MENTION_PATTERN.captures_iter(text).map(|c| c[1].to_string()).collect()
    }

    /// Case-insensitive substring test.
    pub fn contains_ci(haystack: &str, needle: &str) -> bool {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_ignores_case_and_trailing_slash() {
        assert_eq!(url::dedup_key("https://Example.com/Post/"), url::dedup_key("https://example.com/post"));
        assert_ne!(url::dedup_key("https://example.com/a"), url::dedup_key("https://example.com/b"));
    }

    #[test]
    fn validates_http_urls() {
        assert!(url::is_valid_http_url("https://example.com/x"));
        assert!(!url::is_valid_http_url("mailto:someone@example.com"));
        assert!(!url::is_valid_http_url("/relative"));
        assert_eq!(url::extract_domain("https://news.example.com/a"), Some("news.example.com".to_string()));
    }

    #[test]
    fn html_text_skips_scripts_and_styles() {
        let html = r#"<html><head><title>T</title><style>p{color:red}</style></head>
            <body><p>Hello   <b>world</b></p><script>var x = 1;</script><p>again</p></body></html>"#;
        assert_eq!(text::html_to_text(html), "Hello world again");
    }

    #[test]
    fn social_text_helpers() {
        let raw = "Shipping #rust at @acme today https://t.co/abc #async";
        assert_eq!(text::replace_urls(raw), "Shipping #rust at @acme today [URL] #async");
        assert_eq!(text::extract_hashtags(raw), vec!["rust", "async"]);
        assert_eq!(text::extract_mentions(raw), vec!["acme"]);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(text::truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(text::truncate_chars("short", 10), "short");
        assert!(text::contains_ci("AI Safety research", "ai safety"));
    }
}
