use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The view of a collected record handed to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedItem {
    pub uri: String,
    pub kind: String,
    pub title: String,
    pub author: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Credibility {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    pub key_points: Vec<String>,
    pub quotes: Vec<String>,
    /// 0 (unrelated) to 10 (entirely about the topic).
    pub relevance_score: u8,
    pub credibility: Credibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedItem {
    pub item: CollectedItem,
    pub analysis: Option<Analysis>,
}

// Object style note:
// Analyzers may be slow or unreliable. Retrying or skipping a failed analysis is
// the caller's decision; implementations just report the failure.

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, body: &str, kind: &str, topic: &str) -> Result<Analysis>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, items: &[AnalyzedItem]) -> Result<()>;
}
