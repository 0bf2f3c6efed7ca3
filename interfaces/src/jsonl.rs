use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

use crate::defs::AnalyzedItem;
use crate::defs::Publisher;

#[derive(Serialize)]
struct Line<'a> {
    topic: &'a str,
    #[serde(flatten)]
    item: &'a AnalyzedItem,
}

/// Writes one JSON object per item to the wrapped writer.
pub struct JsonLinesPublisher<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    async fn publish(&self, topic: &str, items: &[AnalyzedItem]) -> Result<()> {
        let mut out = self.out.lock().map_err(|_| anyhow!("publisher writer poisoned"))?;
        for item in items {
            serde_json::to_writer(&mut *out, &Line { topic, item })?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::CollectedItem;

    #[tokio::test]
    async fn writes_one_line_per_item() {
        let publisher = JsonLinesPublisher::new(Vec::new());
        let items = vec![
            AnalyzedItem {
                item: CollectedItem {
                    uri: "https://example.com/1".to_owned(),
                    kind: "web-article".to_owned(),
                    title: "One".to_owned(),
                    author: None,
                    body: "first".to_owned(),
                },
                analysis: None,
            },
            AnalyzedItem {
                item: CollectedItem {
                    uri: "https://example.com/2".to_owned(),
                    kind: "forum-post".to_owned(),
                    title: "Two".to_owned(),
                    author: Some("someone".to_owned()),
                    body: "second".to_owned(),
                },
                analysis: None,
            },
        ];
        publisher.publish("ai safety", &items).await.unwrap();

        let written = String::from_utf8(publisher.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["topic"], "ai safety");
        assert_eq!(first["item"]["uri"], "https://example.com/1");
    }
}
