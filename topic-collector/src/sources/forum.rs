use crate::auth::TokenProvider;
use crate::fetcher::{FetchRequest, Fetcher};
use crate::quality::{within_range, Candidate, QualityRule};
use crate::traits::{RecordSink, Source};
use crate::types::{CollectOptions, CollectorError, RecordKind, Result, SourceKind, SourceRecord};
use crate::utils::text::word_count;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";
pub const DEFAULT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

const DEFAULT_BUDGET: usize = 30;
const MAX_BUDGET: usize = 50;
const CACHE_TTL: Duration = Duration::from_secs(3600);
const SEARCH_PAGE_LIMIT: usize = 25;
const COMMENT_THRESHOLD: i64 = 5;
const COMMENTS_PER_POST: usize = 3;
const MIN_COMMENT_CHARS: usize = 50;
const SUBREDDIT_VARIANTS: usize = 5;

const GENERAL_SUBREDDITS: [&str; 10] = [
    "technology",
    "programming",
    "MachineLearning",
    "webdev",
    "startups",
    "Futurology",
    "tech",
    "software",
    "dataisbeautiful",
    "sysadmin",
];

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForumPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    pub permalink: String,
    #[serde(default)]
    pub over_18: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForumComment {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    pub permalink: String,
}

fn timestamp(created_utc: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(created_utc as i64, 0)
}

/// Subreddits worth searching for a topic, most specific first.
pub fn relevant_subreddits(topic: &str) -> Vec<String> {
    let lower = topic.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
    let mut picked: Vec<&str> = Vec::new();

    if words.contains(&"ai") || lower.contains("machine learning") || lower.contains("artificial intelligence") {
        picked.extend(["MachineLearning", "artificial", "deeplearning"]);
    }
    if lower.contains("startup") || lower.contains("business") {
        picked.extend(["startups", "Entrepreneur", "business"]);
    }
    if lower.contains("programming") || lower.contains("coding") {
        picked.extend(["programming", "learnprogramming", "webdev", "coding"]);
    }
    picked.extend(GENERAL_SUBREDDITS);

    let mut subreddits: Vec<String> = Vec::new();
    for name in picked {
        if !subreddits.iter().any(|s| s == name) {
            subreddits.push(name.to_string());
        }
    }
    subreddits
}

/// Posts and top comments from a Reddit-shaped forum API.
pub struct ForumSource {
    fetcher: Fetcher,
    tokens: Option<Arc<TokenProvider>>,
    api_base: String,
}

impl ForumSource {
    pub fn new(fetcher: Fetcher, tokens: Option<Arc<TokenProvider>>) -> Self {
        Self {
            fetcher,
            tokens,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn authorized(&self, request: FetchRequest, token: &str, tokens: &TokenProvider) -> FetchRequest {
        request.bearer(token).header("User-Agent", tokens.user_agent())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        options: &CollectOptions,
        token: &str,
        tokens: &TokenProvider,
    ) -> Result<Vec<ForumPost>> {
        let request = FetchRequest::get(format!("{}/search", self.api_base))
            .query("q", query)
            .query("sort", "relevance")
            .query("t", options.filter("time").unwrap_or("month"))
            .query("limit", limit.min(SEARCH_PAGE_LIMIT))
            .query("type", "link");
        let listing: Listing<ForumPost> = self.fetcher.fetch_json(&self.authorized(request, token, tokens)).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .filter(|post| !post.over_18)
            .collect())
    }

    async fn top_comments(&self, post_id: &str, token: &str, tokens: &TokenProvider) -> Result<Vec<ForumComment>> {
        let request = FetchRequest::get(format!("{}/comments/{}", self.api_base, post_id))
            .query("sort", "top")
            .query("limit", 5);
        let listings: Vec<Value> = self.fetcher.fetch_json(&self.authorized(request, token, tokens)).await?;

        let children = listings
            .get(1)
            .and_then(|l| l.pointer("/data/children"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(children
            .into_iter()
            .filter(|child| child.get("kind").and_then(Value::as_str) == Some("t1"))
            .filter_map(|child| serde_json::from_value::<ForumComment>(child.get("data")?.clone()).ok())
            .filter(|comment| comment.body.chars().count() > MIN_COMMENT_CHARS)
            .take(COMMENTS_PER_POST)
            .collect())
    }

    fn post_record(post: &ForumPost, body: &str, query: &str) -> Result<SourceRecord> {
        let url = format!("https://reddit.com{}", post.permalink);
        Ok(SourceRecord::new(RecordKind::ForumPost, &post.id, &url, &post.title, body)?
            .with_author(post.author.clone())
            .with_published_at(timestamp(post.created_utc))
            .with_attribute("subreddit", post.subreddit.as_str())
            .with_attribute("score", post.score)
            .with_attribute("num_comments", post.num_comments)
            .with_attribute("query", query)
            .with_attribute("content_type", "post")
            .with_attribute("word_count", word_count(body))
            .with_attribute("is_self_post", !post.selftext.is_empty())
            .with_attribute("external_url", post.url.clone().unwrap_or_default()))
    }

    fn comment_record(comment: &ForumComment, post: &ForumPost, query: &str) -> Result<SourceRecord> {
        let url = format!("https://reddit.com{}", comment.permalink);
        let title = format!("Comment on: {}", post.title);
        Ok(SourceRecord::new(RecordKind::ForumComment, &comment.id, &url, &title, &comment.body)?
            .with_author(comment.author.clone())
            .with_published_at(timestamp(comment.created_utc))
            .with_attribute("subreddit", post.subreddit.as_str())
            .with_attribute("score", comment.score)
            .with_attribute("query", query)
            .with_attribute("content_type", "comment")
            .with_attribute("word_count", word_count(&comment.body))
            .with_attribute("parent_post_id", post.id.as_str())
            .with_attribute("parent_post_title", post.title.as_str()))
    }
}

#[async_trait]
impl Source for ForumSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Forum
    }

    fn source_name(&self) -> String {
        "Reddit".to_string()
    }

    fn is_configured(&self) -> bool {
        self.tokens.is_some()
    }

    fn budget(&self, options: &CollectOptions) -> usize {
        options.max_results.unwrap_or(DEFAULT_BUDGET).min(MAX_BUDGET)
    }

    fn cache_ttl(&self) -> Duration {
        CACHE_TTL
    }

    fn query_variants(&self, topic: &str) -> Vec<String> {
        let mut variants = vec![
            topic.to_string(),
            format!("\"{topic}\""),
            format!("{topic} discussion"),
            format!("{topic} experience"),
        ];
        variants.extend(
            relevant_subreddits(topic)
                .into_iter()
                .take(SUBREDDIT_VARIANTS)
                .map(|s| format!("subreddit:{s} {topic}")),
        );
        variants
    }

    async fn gather(&self, topic: &str, options: &CollectOptions, sink: &RecordSink) -> Result<()> {
        let tokens = self.tokens.as_deref().ok_or(CollectorError::MissingCredentials(SourceKind::Forum))?;
        let token = tokens.bearer().await?;
        let post_rule = QualityRule::forum_post();
        let comment_rule = QualityRule::forum_comment();

        for variant in self.query_variants(topic) {
            if sink.is_full() {
                break;
            }
            let posts = match self.search(&variant, sink.remaining(), options, &token, tokens).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(query = %variant, error = %e, "Forum search failed");
                    continue;
                }
            };

            for post in posts {
                if sink.is_full() {
                    break;
                }
                if sink.contains(&SourceRecord::record_id(RecordKind::ForumPost, &post.id)) {
                    continue;
                }

                let body = if post.selftext.trim().is_empty() { &post.title } else { &post.selftext };
                let candidate = Candidate {
                    text: body,
                    engagement: post.score,
                    replies: post.num_comments,
                    authoritative: false,
                };
                if !post_rule.check(&candidate).is_accept() || !within_range(timestamp(post.created_utc), &options.date_range) {
                    debug!(post_id = %post.id, "Post filtered out");
                    continue;
                }

                match Self::post_record(&post, body, &variant) {
                    Ok(record) => {
                        sink.push(record);
                    }
                    Err(e) => {
                        debug!(post_id = %post.id, error = %e, "Skipping post");
                        continue;
                    }
                }

                if sink.is_full() || post.num_comments <= COMMENT_THRESHOLD {
                    continue;
                }
                let comments = match self.top_comments(&post.id, &token, tokens).await {
                    Ok(comments) => comments,
                    Err(e) => {
                        warn!(post_id = %post.id, error = %e, "Failed to fetch comments");
                        Vec::new()
                    }
                };
                for comment in comments {
                    if sink.is_full() {
                        break;
                    }
                    let candidate = Candidate {
                        text: &comment.body,
                        engagement: comment.score,
                        replies: 0,
                        authoritative: false,
                    };
                    if !comment_rule.check(&candidate).is_accept() {
                        continue;
                    }
                    match Self::comment_record(&comment, &post, &variant) {
                        Ok(record) => {
                            sink.push(record);
                        }
                        Err(e) => debug!(comment_id = %comment.id, error = %e, "Skipping comment"),
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_specific_subreddits_come_first() {
        let ai = relevant_subreddits("AI safety");
        assert_eq!(&ai[..3], &["MachineLearning", "artificial", "deeplearning"]);
        assert_eq!(ai.iter().filter(|s| *s == "MachineLearning").count(), 1);

        let plain = relevant_subreddits("email clients");
        assert_eq!(plain[0], "technology");
    }

    #[test]
    fn timestamps_from_epoch_seconds() {
        assert_eq!(timestamp(0.0).map(|t| t.timestamp()), Some(0));
        assert_eq!(timestamp(1_700_000_000.5).map(|t| t.timestamp()), Some(1_700_000_000));
    }
}
