use crate::fetcher::{FetchRequest, Fetcher};
use crate::quality::{within_range, Candidate, QualityRule};
use crate::traits::{RecordSink, Source};
use crate::types::{CollectOptions, CollectorError, RecordKind, Result, SourceKind, SourceRecord};
use crate::utils::text::{collapse_whitespace, extract_hashtags, extract_mentions, replace_urls};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/2";

const DEFAULT_BUDGET: usize = 50;
const MAX_BUDGET: usize = 100;
const CACHE_TTL: Duration = Duration::from_secs(1800);
const MIN_PAGE: usize = 10;
const MAX_PAGE: usize = 100;

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Post>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
struct Post {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    public_metrics: Metrics,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct Metrics {
    #[serde(default)]
    retweet_count: i64,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    reply_count: i64,
    #[serde(default)]
    quote_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct User {
    id: String,
    name: String,
    username: String,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    description: Option<String>,
}

impl User {
    fn unknown(id: Option<&str>) -> Self {
        Self {
            id: id.unwrap_or("unknown").to_string(),
            name: "Unknown User".to_string(),
            username: "unknown".to_string(),
            verified: false,
            description: None,
        }
    }
}

/// Recent posts from a Twitter-v2-shaped search API.
pub struct SocialSource {
    fetcher: Fetcher,
    bearer: Option<String>,
    api_base: String,
}

impl SocialSource {
    pub fn new(fetcher: Fetcher, bearer: Option<String>) -> Self {
        Self {
            fetcher,
            bearer: bearer.filter(|b| !b.trim().is_empty()),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn search(&self, query: &str, wanted: usize, options: &CollectOptions, bearer: &str) -> Result<Vec<(Post, User)>> {
        let mut request = FetchRequest::get(format!("{}/tweets/search/recent", self.api_base))
            .query("query", query)
            .query("tweet.fields", "created_at,author_id,public_metrics,context_annotations")
            .query("user.fields", "name,username,verified,description,public_metrics")
            .query("expansions", "author_id")
            .query("max_results", wanted.clamp(MIN_PAGE, MAX_PAGE))
            .bearer(bearer);
        if let Some(range) = &options.date_range {
            request = request
                .query("start_time", range.from.to_rfc3339_opts(SecondsFormat::Secs, true))
                .query("end_time", range.to.to_rfc3339_opts(SecondsFormat::Secs, true));
        }

        let response: SearchResponse = self.fetcher.fetch_json(&request).await?;
        let users: HashMap<&str, &User> = response.includes.users.iter().map(|u| (u.id.as_str(), u)).collect();
        Ok(response
            .data
            .iter()
            .map(|post| {
                let author_id = post.author_id.as_deref();
                let user = author_id
                    .and_then(|id| users.get(id))
                    .map(|u| (*u).clone())
                    .unwrap_or_else(|| User::unknown(author_id));
                (post.clone(), user)
            })
            .collect())
    }

    fn to_record(post: &Post, user: &User, query: &str) -> Result<SourceRecord> {
        let url = format!("https://twitter.com/{}/status/{}", user.username, post.id);
        let title = format!("Post by {} (@{})", user.name, user.username);
        let body = collapse_whitespace(&replace_urls(&post.text));
        let metrics = post.public_metrics;

        let mut record = SourceRecord::new(RecordKind::SocialPost, &post.id, &url, &title, &body)?
            .with_author(Some(user.name.clone()))
            .with_published_at(post.created_at)
            .with_attribute("username", user.username.as_str())
            .with_attribute("verified", user.verified)
            .with_attribute("like_count", metrics.like_count)
            .with_attribute("retweet_count", metrics.retweet_count)
            .with_attribute("reply_count", metrics.reply_count)
            .with_attribute("quote_count", metrics.quote_count)
            .with_attribute("query", query)
            .with_attribute("content_type", "post")
            .with_attribute("character_count", post.text.chars().count())
            .with_attribute("hashtags", extract_hashtags(&post.text))
            .with_attribute("mentions", extract_mentions(&post.text));
        if let Some(description) = user.description.as_deref().filter(|d| !d.is_empty()) {
            record = record.with_attribute("description", description);
        }
        Ok(record)
    }
}

#[async_trait]
impl Source for SocialSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Social
    }

    fn source_name(&self) -> String {
        "Twitter".to_string()
    }

    fn is_configured(&self) -> bool {
        self.bearer.is_some()
    }

    fn budget(&self, options: &CollectOptions) -> usize {
        options.max_results.unwrap_or(DEFAULT_BUDGET).min(MAX_BUDGET)
    }

    fn cache_ttl(&self) -> Duration {
        CACHE_TTL
    }

    fn query_variants(&self, topic: &str) -> Vec<String> {
        vec![
            format!("\"{topic}\" tech"),
            format!("{topic} -is:retweet lang:en"),
            format!("\"{topic}\" OR \"{topic} technology\""),
            format!("{topic} (from:techcrunch OR from:verge OR from:wired)"),
        ]
    }

    async fn gather(&self, topic: &str, options: &CollectOptions, sink: &RecordSink) -> Result<()> {
        let bearer = self.bearer.as_deref().ok_or(CollectorError::MissingCredentials(SourceKind::Social))?;
        let rule = QualityRule::social_post();

        for variant in self.query_variants(topic) {
            if sink.is_full() {
                break;
            }
            let posts = match self.search(&variant, sink.remaining(), options, bearer).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(query = %variant, error = %e, "Social search failed");
                    continue;
                }
            };

            for (post, user) in posts {
                if sink.is_full() {
                    break;
                }
                if sink.contains(&SourceRecord::record_id(RecordKind::SocialPost, &post.id)) {
                    continue;
                }
                let candidate = Candidate {
                    text: &post.text,
                    engagement: post.public_metrics.like_count.saturating_add(post.public_metrics.retweet_count),
                    replies: post.public_metrics.reply_count,
                    authoritative: user.verified,
                };
                if !rule.check(&candidate).is_accept() || !within_range(post.created_at, &options.date_range) {
                    debug!(post_id = %post.id, "Post filtered out");
                    continue;
                }
                match Self::to_record(&post, &user, &variant) {
                    Ok(record) => {
                        sink.push(record);
                    }
                    Err(e) => debug!(post_id = %post.id, error = %e, "Skipping post"),
                }
            }
        }
        Ok(())
    }
}
