#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::time::Instant;
use topic_collector::{FetchRequest, FetchResponse, Fetcher, HttpTransport, RateLimiter, RetryPolicy};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

struct Route {
    prefix: String,
    query: Option<(String, String)>,
    responses: Mutex<VecDeque<FetchResponse>>,
}

impl Route {
    fn matches(&self, request: &FetchRequest) -> bool {
        request.url.starts_with(&self.prefix)
            && match &self.query {
                Some((key, value)) => request.query_value(key) == Some(value.as_str()),
                None => true,
            }
    }

    /// Pops scripted responses in order; the last one repeats.
    fn next(&self) -> FetchResponse {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap_or_else(|| FetchResponse::new(404, "empty route"))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatch {
    pub request: FetchRequest,
    pub at: Instant,
}

/// Fake network: URL-prefix routes (optionally keyed on one query parameter)
/// answering with scripted responses. Unrouted requests get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Vec<Route>,
    delay: Option<Duration>,
    log: Mutex<Vec<Dispatch>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, prefix: &str, response: FetchResponse) -> Self {
        self.on_seq(prefix, vec![response])
    }

    pub fn on_seq(mut self, prefix: &str, responses: Vec<FetchResponse>) -> Self {
        self.routes.push(Route {
            prefix: prefix.to_string(),
            query: None,
            responses: Mutex::new(responses.into()),
        });
        self
    }

    pub fn on_query(mut self, prefix: &str, key: &str, value: &str, response: FetchResponse) -> Self {
        self.routes.push(Route {
            prefix: prefix.to_string(),
            query: Some((key.to_string(), value.to_string())),
            responses: Mutex::new(VecDeque::from([response])),
        });
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.log.lock().unwrap().clone()
    }

    pub fn dispatches_to(&self, prefix: &str) -> Vec<Dispatch> {
        self.dispatches().into_iter().filter(|d| d.request.url.starts_with(prefix)).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.dispatches_to(prefix).len()
    }

    pub fn total(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &FetchRequest) -> topic_collector::Result<FetchResponse> {
        self.log.lock().unwrap().push(Dispatch {
            request: request.clone(),
            at: Instant::now(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .routes
            .iter()
            .find(|route| route.matches(request))
            .map(Route::next)
            .unwrap_or_else(|| FetchResponse::new(404, "no route")))
    }
}

/// Fetcher over `transport` with no spacing and short retry delays.
pub fn quick_fetcher(transport: Arc<ScriptedTransport>) -> Fetcher {
    Fetcher::new(transport, Arc::new(RateLimiter::new(Duration::ZERO)))
        .with_policy(RetryPolicy::default().with_delays(Duration::from_millis(20), Duration::from_millis(10)))
}

pub fn json_response(value: Value) -> FetchResponse {
    FetchResponse::new(200, value.to_string()).with_header("content-type", "application/json")
}

pub fn html_response(html: &str) -> FetchResponse {
    FetchResponse::new(200, html).with_header("content-type", "text/html")
}

/// Prose of at least `min_chars` characters, free of any deny marker.
pub fn long_text(seed: &str, min_chars: usize) -> String {
    let mut text = seed.to_string();
    while text.chars().count() < min_chars {
        text.push_str(" Researchers compared evaluation methods across several labs and published the results.");
    }
    text
}

// Forum (Reddit-shaped) fixtures

pub const FORUM_TOKEN_URL: &str = "https://auth.forum.test/token";
pub const FORUM_API: &str = "https://api.forum.test";

pub fn forum_token(expires_in: u64) -> FetchResponse {
    json_response(json!({ "access_token": "forum-token", "token_type": "bearer", "expires_in": expires_in }))
}

pub fn forum_post(id: &str, title: &str, selftext: &str, score: i64, num_comments: i64) -> Value {
    json!({
        "id": id,
        "title": title,
        "selftext": selftext,
        "url": format!("https://external.test/{id}"),
        "author": format!("author_{id}"),
        "subreddit": "MachineLearning",
        "created_utc": (Utc::now().timestamp() - 3600) as f64,
        "score": score,
        "num_comments": num_comments,
        "permalink": format!("/r/MachineLearning/comments/{id}/post/"),
        "over_18": false
    })
}

pub fn forum_listing(posts: Vec<Value>) -> FetchResponse {
    let children: Vec<Value> = posts.into_iter().map(|p| json!({ "kind": "t3", "data": p })).collect();
    json_response(json!({ "kind": "Listing", "data": { "children": children, "after": null } }))
}

pub fn forum_comment(id: &str, body: &str, score: i64) -> Value {
    json!({
        "id": id,
        "body": body,
        "author": format!("commenter_{id}"),
        "created_utc": (Utc::now().timestamp() - 600) as f64,
        "score": score,
        "permalink": format!("/r/MachineLearning/comments/p/post/{id}/")
    })
}

pub fn forum_comments(comments: Vec<Value>) -> FetchResponse {
    let mut children: Vec<Value> = comments.into_iter().map(|c| json!({ "kind": "t1", "data": c })).collect();
    children.push(json!({ "kind": "more", "data": { "count": 40, "children": ["zz"] } }));
    json_response(json!([
        { "kind": "Listing", "data": { "children": [] } },
        { "kind": "Listing", "data": { "children": children } }
    ]))
}

// Social (Twitter-v2-shaped) fixtures

pub const SOCIAL_API: &str = "https://api.social.test/2";
pub const SOCIAL_SEARCH: &str = "https://api.social.test/2/tweets/search/recent";

pub fn social_post(id: &str, author_id: &str, text: &str, likes: i64, retweets: i64, created_at: DateTime<Utc>) -> Value {
    json!({
        "id": id,
        "text": text,
        "author_id": author_id,
        "created_at": created_at.to_rfc3339(),
        "public_metrics": { "retweet_count": retweets, "like_count": likes, "reply_count": 1, "quote_count": 0 }
    })
}

pub fn social_user(id: &str, name: &str, username: &str, verified: bool) -> Value {
    json!({ "id": id, "name": name, "username": username, "verified": verified, "description": format!("{name} writes about tech") })
}

pub fn social_search(posts: Vec<Value>, users: Vec<Value>) -> FetchResponse {
    let count = posts.len();
    json_response(json!({ "data": posts, "includes": { "users": users }, "meta": { "result_count": count } }))
}

pub fn social_empty() -> FetchResponse {
    json_response(json!({ "meta": { "result_count": 0 } }))
}

// Feed and web fixtures

pub fn rss(title: &str, items: &[(&str, &str, &str)]) -> FetchResponse {
    let body: String = items
        .iter()
        .map(|(item_title, link, description)| {
            format!(
                "<item><title>{item_title}</title><link>{link}</link><guid>{link}</guid>\
                 <description>{description}</description><pubDate>{}</pubDate></item>",
                Utc::now().to_rfc2822()
            )
        })
        .collect();
    FetchResponse::new(
        200,
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>{title}</title>{body}</channel></rss>"#),
    )
    .with_header("content-type", "application/rss+xml")
}

pub fn search_page(links: &[(&str, &str)]) -> FetchResponse {
    let anchors: String = links
        .iter()
        .map(|(href, text)| format!(r#"<div class="result"><a class="result__a" href="{href}">{text}</a></div>"#))
        .collect();
    html_response(&format!("<html><body>{anchors}<a href=\"/html/?q=more\">More</a></body></html>"))
}

pub fn article_page(title: &str, text: &str) -> FetchResponse {
    html_response(&format!(
        "<html><head><title>{title}</title><script>track();</script></head><body><h1>{title}</h1><p>{text}</p></body></html>"
    ))
}
