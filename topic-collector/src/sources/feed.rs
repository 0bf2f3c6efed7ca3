use crate::fetcher::{FetchRequest, Fetcher};
use crate::parser::{FeedParser, ParsedEntry};
use crate::quality::{within_range, Candidate, QualityRule};
use crate::sources::reader::Reader;
use crate::traits::{RecordSink, Source};
use crate::types::{CollectOptions, RecordKind, Result, SourceKind, SourceRecord};
use crate::utils::text::{contains_ci, truncate_chars, word_count, MAX_BODY_CHARS};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_BUDGET: usize = 20;
const CACHE_TTL: Duration = Duration::from_secs(3600);

/// A configured syndication feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    pub url: String,
    pub name: String,
    pub category: String,
}

impl FeedSpec {
    pub fn new(url: &str, name: &str, category: &str) -> Self {
        Self {
            url: url.to_string(),
            name: name.to_string(),
            category: category.to_string(),
        }
    }

    /// Feed named after its host, for feeds given only as a URL.
    pub fn from_url(url: &str) -> Self {
        let name = crate::utils::url::extract_domain(url).unwrap_or_else(|| url.to_string());
        Self::new(url, &name, "custom")
    }

    pub fn defaults() -> Vec<FeedSpec> {
        vec![
            FeedSpec::new("https://techcrunch.com/feed/", "TechCrunch", "tech"),
            FeedSpec::new("https://feeds.wired.com/wired/index", "Wired", "tech"),
            FeedSpec::new("https://www.theverge.com/rss/index.xml", "The Verge", "tech"),
            FeedSpec::new("https://a16z.com/feed/", "Andreessen Horowitz", "vc"),
            FeedSpec::new("https://blog.ycombinator.com/feed/", "Y Combinator", "startup"),
        ]
    }
}

struct LoadedFeed<'a> {
    spec: &'a FeedSpec,
    entries: Vec<ParsedEntry>,
    taken: usize,
}

/// Topic-matched entries from a fixed list of RSS/Atom feeds.
pub struct FeedSource {
    fetcher: Fetcher,
    feeds: Vec<FeedSpec>,
    reader: Option<Reader>,
}

impl FeedSource {
    pub fn new(fetcher: Fetcher, feeds: Vec<FeedSpec>) -> Self {
        Self {
            fetcher,
            feeds,
            reader: None,
        }
    }

    pub fn with_reader(mut self, reader: Reader) -> Self {
        self.reader = Some(reader);
        self
    }

    async fn load_feeds<'a>(&self, feeds: &[&'a FeedSpec]) -> Vec<LoadedFeed<'a>> {
        let mut parser = FeedParser::new();
        let mut loaded = Vec::with_capacity(feeds.len());
        for spec in feeds {
            let content = match self.fetcher.fetch_text(&FetchRequest::get(&spec.url)).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(feed = %spec.name, url = %spec.url, error = %e, "Failed to fetch feed");
                    continue;
                }
            };
            if !FeedParser::is_valid_feed_content(&content) {
                warn!(feed = %spec.name, url = %spec.url, "Response is not an RSS or Atom feed, skipping");
                continue;
            }
            match parser.parse_feed(&content) {
                Ok(parsed) => {
                    debug!(feed = %spec.name, entries = parsed.entries.len(), "Loaded feed");
                    loaded.push(LoadedFeed {
                        spec,
                        entries: parsed.entries,
                        taken: 0,
                    });
                }
                Err(e) => warn!(feed = %spec.name, url = %spec.url, error = %e, "Failed to parse feed"),
            }
        }
        loaded
    }

    async fn to_record(&self, entry: &ParsedEntry, feed: &FeedSpec, variant: &str, text: &str) -> Result<SourceRecord> {
        let (body, extraction) = match &self.reader {
            Some(reader) => match reader.read(&entry.url).await {
                Ok(full) if !full.is_empty() => (full, "reader"),
                Ok(_) => (text.to_string(), "feed"),
                Err(e) => {
                    debug!(url = %entry.url, error = %e, "Reader failed, keeping feed text");
                    (text.to_string(), "feed")
                }
            },
            None => (text.to_string(), "feed"),
        };
        let body = truncate_chars(&body, MAX_BODY_CHARS);

        Ok(SourceRecord::from_url(RecordKind::FeedArticle, &entry.url, &entry.title, &body)?
            .with_author(entry.author.clone())
            .with_published_at(entry.published_at)
            .with_attribute("feed", feed.name.as_str())
            .with_attribute("category", feed.category.as_str())
            .with_attribute("query", variant)
            .with_attribute("word_count", word_count(&body))
            .with_attribute("extraction", extraction)
            .with_attribute("tags", entry.tags.clone()))
    }
}

#[async_trait]
impl Source for FeedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Feed
    }

    fn source_name(&self) -> String {
        format!("Feeds ({})", self.feeds.len())
    }

    fn budget(&self, options: &CollectOptions) -> usize {
        options.max_results.unwrap_or(DEFAULT_BUDGET)
    }

    fn cache_ttl(&self) -> Duration {
        CACHE_TTL
    }

    fn query_variants(&self, topic: &str) -> Vec<String> {
        let mut variants = vec![topic.to_string()];
        variants.extend(
            ["technology", "trends", "analysis", "future", "impact", "research"]
                .iter()
                .map(|suffix| format!("{topic} {suffix}")),
        );
        variants
    }

    async fn gather(&self, topic: &str, options: &CollectOptions, sink: &RecordSink) -> Result<()> {
        let selected: Vec<&FeedSpec> = match options.filter("category") {
            Some(category) => self.feeds.iter().filter(|f| f.category.eq_ignore_ascii_case(category)).collect(),
            None => self.feeds.iter().collect(),
        };
        if selected.is_empty() {
            info!(topic, "No feeds selected");
            return Ok(());
        }

        let per_feed = sink.capacity().div_ceil(selected.len());
        let mut loaded = self.load_feeds(&selected).await;
        let rule = QualityRule::feed_entry();

        for variant in self.query_variants(topic) {
            for feed in loaded.iter_mut() {
                for entry in &feed.entries {
                    if sink.is_full() {
                        return Ok(());
                    }
                    if feed.taken >= per_feed {
                        break;
                    }

                    let haystack = format!("{} {}", entry.title, entry.summary.as_deref().unwrap_or_default());
                    if !contains_ci(&haystack, &variant) {
                        continue;
                    }
                    let id = SourceRecord::record_id(RecordKind::FeedArticle, &SourceRecord::url_origin_id(&entry.url));
                    if sink.contains(&id) || !within_range(entry.published_at, &options.date_range) {
                        continue;
                    }

                    let text = entry.body().unwrap_or(&entry.title).to_string();
                    if !rule.check(&Candidate::text(&text)).is_accept() {
                        debug!(url = %entry.url, "Feed entry filtered out");
                        continue;
                    }

                    match self.to_record(entry, feed.spec, &variant, &text).await {
                        Ok(record) => {
                            if sink.push(record) {
                                feed.taken += 1;
                            }
                        }
                        Err(e) => debug!(url = %entry.url, error = %e, "Skipping feed entry"),
                    }
                }
            }
        }
        Ok(())
    }
}
