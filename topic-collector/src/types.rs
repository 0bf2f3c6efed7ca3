use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

// Collaborator-facing view of a record lives in the interfaces crate
pub use interfaces::defs::{Analysis, AnalyzedItem, Analyzer, CollectedItem, Publisher};

/// Category of external origin a collector draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Feed,
    Web,
    Forum,
    Social,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [SourceKind::Feed, SourceKind::Web, SourceKind::Forum, SourceKind::Social];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Web => "web",
            SourceKind::Forum => "forum",
            SourceKind::Social => "social",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" | "rss" | "article" => Ok(SourceKind::Feed),
            "web" | "search" => Ok(SourceKind::Web),
            "forum" | "reddit" => Ok(SourceKind::Forum),
            "social" | "twitter" => Ok(SourceKind::Social),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// Category of a single collected record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    FeedArticle,
    WebArticle,
    ForumPost,
    ForumComment,
    SocialPost,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::FeedArticle => "feed-article",
            RecordKind::WebArticle => "web-article",
            RecordKind::ForumPost => "forum-post",
            RecordKind::ForumComment => "forum-comment",
            RecordKind::SocialPost => "social-post",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-specific metadata value. Never used for identity or dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<usize> for AttributeValue {
    fn from(v: usize) -> Self {
        AttributeValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        AttributeValue::List(v)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// Canonical normalized unit of collected content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub kind: RecordKind,
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub body: String,
    pub attributes: Attributes,
}

impl SourceRecord {
    /// Builds a record, rejecting invalid URLs and empty bodies.
    ///
    /// `origin_id` is the identifier the origin uses for the item; the record id
    /// is derived from it and the kind only, so repeated collections agree.
    pub fn new(kind: RecordKind, origin_id: &str, url: &str, title: &str, body: &str) -> Result<Self> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CollectorError::Parse(format!("unsupported url scheme: {url}")));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(CollectorError::Parse(format!("empty body for {url}")));
        }
        Ok(Self {
            id: Self::record_id(kind, origin_id),
            kind,
            url: parsed.to_string(),
            title: title.trim().to_string(),
            author: None,
            published_at: None,
            body: body.to_string(),
            attributes: Attributes::new(),
        })
    }

    /// Builds a record whose origin identifier is its URL.
    pub fn from_url(kind: RecordKind, url: &str, title: &str, body: &str) -> Result<Self> {
        Self::new(kind, &Self::url_origin_id(url), url, title, body)
    }

    pub fn record_id(kind: RecordKind, origin_id: &str) -> String {
        format!("{}-{}", kind.as_str(), origin_id)
    }

    pub fn url_origin_id(url: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, url.trim().as_bytes()).to_string()
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

impl From<&SourceRecord> for CollectedItem {
    fn from(record: &SourceRecord) -> Self {
        Self {
            uri: record.url.clone(),
            kind: record.kind.as_str().to_string(),
            title: record.title.clone(),
            author: record.author.clone(),
            body: record.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

/// Per-call collection options. Serialized into cache keys, so field order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectOptions {
    pub max_results: Option<usize>,
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl CollectOptions {
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_filter(mut self, key: &str, value: &str) -> Self {
        self.filters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn filter(&self, key: &str) -> Option<&str> {
        self.filters.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_redirects: usize,
    pub min_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "topic-collector/1.0".to_string(),
            timeout_seconds: 30,
            max_redirects: 5,
            min_interval_ms: 1000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Transient failure from {target}: {reason}")]
    Transient {
        target: String,
        status: Option<u16>,
        reason: String,
        /// Reset hint advertised by the target, if any.
        reset_after: Option<Duration>,
    },

    #[error("Fatal failure from {target}: {reason}")]
    Fatal {
        target: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing credentials for {0} source")]
    MissingCredentials(SourceKind),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CollectorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CollectorError::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CollectorError::Transient { status, .. } | CollectorError::Fatal { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
