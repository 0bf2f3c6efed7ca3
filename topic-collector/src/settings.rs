use crate::auth::ClientCredentials;
use crate::sources::reader::DEFAULT_READER_BASE_URL;
use crate::sources::FeedSpec;
use crate::types::{CollectorError, FetchConfig, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CACHE_PATH: &str = "./data/cache.db";
const DEFAULT_FORUM_USER_AGENT: &str = "topic-collector/1.0 (research bot)";
const DEFAULT_MAX_SOURCES: usize = 50;
const DEFAULT_RESEARCH_TIMEOUT_SECS: u64 = 1800;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_path: PathBuf,
    /// Present only when both client id and secret are set.
    pub forum: Option<ClientCredentials>,
    pub social_bearer: Option<String>,
    /// Full-text reader service; `READER_BASE_URL=none` turns it off.
    pub reader_base_url: Option<String>,
    pub feeds: Vec<FeedSpec>,
    pub max_sources: usize,
    pub research_timeout: Duration,
    pub fetch: FetchConfig,
}

impl Settings {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let forum = match (get("REDDIT_CLIENT_ID"), get("REDDIT_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(ClientCredentials {
                client_id,
                client_secret,
                user_agent: get("REDDIT_USER_AGENT").unwrap_or_else(|| DEFAULT_FORUM_USER_AGENT.to_string()),
            }),
            _ => None,
        };

        let feeds = match get("FEED_URLS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(FeedSpec::from_url)
                .collect(),
            None => FeedSpec::defaults(),
        };

        let mut fetch = FetchConfig::default();
        if let Some(user_agent) = get("USER_AGENT") {
            fetch.user_agent = user_agent;
        }
        if let Some(raw) = get("HTTP_TIMEOUT_SECS") {
            fetch.timeout_seconds = parse_number("HTTP_TIMEOUT_SECS", &raw)?;
        }

        Ok(Self {
            cache_path: get("CACHE_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH)),
            forum,
            social_bearer: get("TWITTER_BEARER_TOKEN"),
            reader_base_url: match get("READER_BASE_URL") {
                Some(base) if base.eq_ignore_ascii_case("none") => None,
                Some(base) => Some(base),
                None => Some(DEFAULT_READER_BASE_URL.to_string()),
            },
            feeds,
            max_sources: match get("MAX_SOURCES_PER_TOPIC") {
                Some(raw) => parse_number("MAX_SOURCES_PER_TOPIC", &raw)?,
                None => DEFAULT_MAX_SOURCES,
            },
            research_timeout: Duration::from_secs(match get("RESEARCH_TIMEOUT_SECS") {
                Some(raw) => parse_number("RESEARCH_TIMEOUT_SECS", &raw)?,
                None => DEFAULT_RESEARCH_TIMEOUT_SECS,
            }),
            fetch,
        })
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| CollectorError::Parse(format!("{key} must be a non-negative integer, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.cache_path, PathBuf::from(DEFAULT_CACHE_PATH));
        assert!(s.forum.is_none());
        assert!(s.social_bearer.is_none());
        assert_eq!(s.feeds.len(), 5);
        assert_eq!(s.max_sources, 50);
        assert_eq!(s.research_timeout, Duration::from_secs(1800));
        assert_eq!(s.fetch.user_agent, FetchConfig::default().user_agent);
        assert_eq!(s.reader_base_url.as_deref(), Some(DEFAULT_READER_BASE_URL));
    }

    #[test]
    fn reader_can_be_replaced_or_disabled() {
        let s = settings(&[("READER_BASE_URL", "https://reader.internal")]).unwrap();
        assert_eq!(s.reader_base_url.as_deref(), Some("https://reader.internal"));
        assert!(settings(&[("READER_BASE_URL", "None")]).unwrap().reader_base_url.is_none());
    }

    #[test]
    fn forum_needs_both_halves_of_credentials() {
        assert!(settings(&[("REDDIT_CLIENT_ID", "id")]).unwrap().forum.is_none());
        let s = settings(&[("REDDIT_CLIENT_ID", "id"), ("REDDIT_CLIENT_SECRET", "secret")]).unwrap();
        let creds = s.forum.unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.user_agent, DEFAULT_FORUM_USER_AGENT);
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let s = settings(&[
            ("FEED_URLS", "https://a.example/feed, https://b.example/rss"),
            ("MAX_SOURCES_PER_TOPIC", "12"),
            ("TWITTER_BEARER_TOKEN", "  "),
            ("HTTP_TIMEOUT_SECS", "7"),
        ])
        .unwrap();
        assert_eq!(s.feeds.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(), vec!["a.example", "b.example"]);
        assert_eq!(s.max_sources, 12);
        assert!(s.social_bearer.is_none());
        assert_eq!(s.fetch.timeout_seconds, 7);

        assert!(settings(&[("RESEARCH_TIMEOUT_SECS", "soon")]).is_err());
    }
}
