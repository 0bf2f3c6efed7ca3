use crate::types::{CollectorError, Result};
use crate::utils::text::html_to_text;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

/// One feed item, with HTML already reduced to plain text.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub guid: Option<String>,
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl ParsedEntry {
    /// Best available body: full content, else summary.
    pub fn body(&self) -> Option<&str> {
        self.content
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(self.summary.as_deref())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Default)]
pub struct FeedParser {
    seen_guids: HashSet<String>,
    seen_urls: HashSet<String>,
}

impl FeedParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses RSS or Atom. Entries repeated across calls on the same parser are dropped.
    pub fn parse_feed(&mut self, content: &str) -> Result<ParsedFeed> {
        let feed = parser::parse(content.as_bytes())
            .map_err(|e| CollectorError::Parse(format!("Failed to parse feed: {e}")))?;

        let title = feed.title.map(|t| t.content);
        let entries: Vec<ParsedEntry> = feed.entries.into_iter().filter_map(|e| self.parse_entry(e)).collect();

        debug!(title = title.as_deref().unwrap_or("untitled"), entries = entries.len(), "Parsed feed");
        Ok(ParsedFeed { title, entries })
    }

    fn parse_entry(&mut self, entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        let url = entry.links.first()?.href.clone();
        let guid = Some(entry.id.clone()).filter(|id| !id.is_empty());

        if let Some(ref guid) = guid {
            if !self.seen_guids.insert(guid.clone()) {
                debug!(guid, "Skipping duplicate entry");
                return None;
            }
        }
        if !self.seen_urls.insert(url.clone()) {
            debug!(url, "Skipping duplicate entry");
            return None;
        }

        let title = entry
            .title
            .map(|t| html_to_text(&t.content))
            .unwrap_or_else(|| "Untitled".to_string());
        let summary = entry.summary.map(|s| html_to_text(&s.content));
        let content = entry.content.and_then(|c| c.body).map(|b| html_to_text(&b));
        let author = entry.authors.first().map(|a| a.name.clone());
        let published_at = entry.published.or(entry.updated).map(|dt| dt.with_timezone(&Utc));
        let tags = entry.categories.into_iter().map(|c| c.term).collect();

        Some(ParsedEntry {
            guid,
            url,
            title,
            summary,
            content,
            author,
            published_at,
            tags,
        })
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let lower = content.to_lowercase();
        lower.contains("<rss") || lower.contains("<feed") || lower.contains("<channel") || lower.contains("xmlns:atom")
    }
}
