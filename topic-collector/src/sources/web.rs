use crate::fetcher::{FetchRequest, Fetcher};
use crate::quality::{Candidate, QualityRule};
use crate::sources::reader::Reader;
use crate::traits::{RecordSink, Source};
use crate::types::{CollectOptions, RecordKind, Result, SourceKind, SourceRecord};
use crate::utils::text::{collapse_whitespace, html_to_text, truncate_chars, word_count, MAX_BODY_CHARS};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

const DEFAULT_BUDGET: usize = 20;
const CACHE_TTL: Duration = Duration::from_secs(3600);
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
}

/// Articles found through an HTML search results page.
pub struct WebSearchSource {
    fetcher: Fetcher,
    search_url: String,
    reader: Option<Reader>,
}

impl WebSearchSource {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            reader: None,
        }
    }

    pub fn with_search_url(mut self, search_url: impl Into<String>) -> Self {
        self.search_url = search_url.into();
        self
    }

    pub fn with_reader(mut self, reader: Reader) -> Self {
        self.reader = Some(reader);
        self
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let request = FetchRequest::get(&self.search_url)
            .query("q", query)
            .header("User-Agent", BROWSER_USER_AGENT);
        let html = self.fetcher.fetch_text(&request).await?;
        let base = Url::parse(&self.search_url)?;
        Ok(extract_result_links(&html, &base))
    }

    async fn page_text(&self, url: &str) -> Result<(String, &'static str)> {
        let (text, extraction) = match &self.reader {
            Some(reader) => (reader.read(url).await?, "reader"),
            None => {
                let html = self.fetcher.fetch_text(&FetchRequest::get(url)).await?;
                (html_to_text(&html), "direct")
            }
        };
        Ok((truncate_chars(&text, MAX_BODY_CHARS), extraction))
    }
}

/// Outbound result links from a search page, in page order, without duplicates.
///
/// Redirect links (`/l/?uddg=<target>`) are decoded; links back to the search
/// host and non-http links are dropped.
pub fn extract_result_links(html: &str, base: &Url) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let search_host = base.host_str().unwrap_or_default().to_string();
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for anchor in document.select(&LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(mut target) = base.join(href) else {
            continue;
        };
        let redirect = target.query_pairs().find(|(k, _)| k == "uddg").map(|(_, v)| v.into_owned());
        if let Some(redirect) = redirect {
            match Url::parse(&redirect) {
                Ok(decoded) => target = decoded,
                Err(_) => continue,
            }
        }

        let host = target.host_str().unwrap_or_default();
        if !matches!(target.scheme(), "http" | "https") || host == search_host || host.ends_with("duckduckgo.com") {
            continue;
        }

        let url = target.to_string();
        if seen.insert(url.clone()) {
            let title = collapse_whitespace(&anchor.text().collect::<Vec<_>>().join(" "));
            hits.push(SearchHit { url, title });
        }
    }
    hits
}

#[async_trait]
impl Source for WebSearchSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    fn source_name(&self) -> String {
        "Web search".to_string()
    }

    fn budget(&self, options: &CollectOptions) -> usize {
        options.max_results.unwrap_or(DEFAULT_BUDGET)
    }

    fn cache_ttl(&self) -> Duration {
        CACHE_TTL
    }

    fn query_variants(&self, topic: &str) -> Vec<String> {
        vec![
            format!("{topic} tech blog analysis insights"),
            format!("\"{topic}\""),
            format!("{topic} trends"),
            format!("{topic} analysis"),
            format!("{topic} criticism"),
        ]
    }

    async fn gather(&self, topic: &str, _options: &CollectOptions, sink: &RecordSink) -> Result<()> {
        let rule = QualityRule::web_article();
        let mut visited = HashSet::new();

        for variant in self.query_variants(topic) {
            if sink.is_full() {
                break;
            }
            let hits = match self.search(&variant).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(query = %variant, error = %e, "Web search failed");
                    continue;
                }
            };
            debug!(query = %variant, hits = hits.len(), "Search results");

            for hit in hits {
                if sink.is_full() {
                    break;
                }
                if !visited.insert(hit.url.clone()) {
                    continue;
                }

                let (text, extraction) = match self.page_text(&hit.url).await {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(url = %hit.url, error = %e, "Failed to extract article");
                        continue;
                    }
                };
                if !rule.check(&Candidate::text(&text)).is_accept() {
                    debug!(url = %hit.url, "Article filtered out");
                    continue;
                }

                let title = if hit.title.is_empty() { "Untitled Article" } else { hit.title.as_str() };
                let record = match SourceRecord::from_url(RecordKind::WebArticle, &hit.url, title, &text) {
                    Ok(record) => record
                        .with_attribute("query", variant.as_str())
                        .with_attribute("word_count", word_count(&text))
                        .with_attribute("extraction", extraction)
                        .with_attribute(
                            "domain",
                            crate::utils::url::extract_domain(&hit.url).unwrap_or_default(),
                        ),
                    Err(e) => {
                        debug!(url = %hit.url, error = %e, "Skipping article");
                        continue;
                    }
                };
                sink.push(record);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_redirects_and_drops_internal_links() {
        let html = r#"
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fblog.example.com%2Fpost%3Fa%3D1&rut=x">Blog <b>post</b></a>
            <a href="https://news.example.org/story">Story</a>
            <a href="https://news.example.org/story">Story again</a>
            <a href="/html/?q=next">Next page</a>
            <a href="mailto:x@example.com">Mail</a>
            <a href="https://duckduckgo.com/settings">Settings</a>
        "#;
        let base = Url::parse("https://html.duckduckgo.com/html/").unwrap();
        let hits = extract_result_links(html, &base);
        assert_eq!(
            hits,
            vec![
                SearchHit { url: "https://blog.example.com/post?a=1".to_string(), title: "Blog post".to_string() },
                SearchHit { url: "https://news.example.org/story".to_string(), title: "Story".to_string() },
            ]
        );
    }
}
