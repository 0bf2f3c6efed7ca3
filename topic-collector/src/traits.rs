use crate::types::{CollectOptions, Result, SourceKind, SourceRecord};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A queryable origin of records about a topic (feeds, search, forum, social).
#[async_trait]
pub trait Source: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// False when credentials this source needs are absent.
    fn is_configured(&self) -> bool {
        true
    }

    /// Effective record budget for one call.
    fn budget(&self, options: &CollectOptions) -> usize;

    fn cache_ttl(&self) -> Duration;

    /// Query phrasings tried in order. Deterministic for a topic.
    fn query_variants(&self, topic: &str) -> Vec<String>;

    /// Fetch, filter and normalize into `sink` until it is full or variants run out.
    ///
    /// Records pushed before an error stay in the sink.
    async fn gather(&self, topic: &str, options: &CollectOptions, sink: &RecordSink) -> Result<()>;
}

#[derive(Debug, Default)]
struct SinkState {
    capacity: usize,
    records: Vec<SourceRecord>,
    ids: HashSet<String>,
}

/// Budgeted, shared accumulator for one source's records.
///
/// Clones share state, so an abandoned collection still leaves what it found.
#[derive(Debug, Clone, Default)]
pub struct RecordSink {
    inner: Arc<Mutex<SinkState>>,
}

impl RecordSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkState {
                capacity,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False when the sink is full or already holds a record with this id.
    pub fn push(&self, record: SourceRecord) -> bool {
        let mut state = self.state();
        if state.records.len() >= state.capacity || state.ids.contains(&record.id) {
            return false;
        }
        state.ids.insert(record.id.clone());
        state.records.push(record);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state().ids.contains(id)
    }

    pub fn is_full(&self) -> bool {
        let state = self.state();
        state.records.len() >= state.capacity
    }

    pub fn remaining(&self) -> usize {
        let state = self.state();
        state.capacity.saturating_sub(state.records.len())
    }

    pub fn capacity(&self) -> usize {
        self.state().capacity
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<SourceRecord> {
        self.state().records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordKind;

    fn record(n: u32) -> SourceRecord {
        SourceRecord::new(RecordKind::ForumPost, &n.to_string(), "https://example.com/x", "t", "body").unwrap()
    }

    #[test]
    fn sink_caps_and_dedups() {
        let sink = RecordSink::new(2);
        assert!(sink.push(record(1)));
        assert!(!sink.push(record(1)));
        assert!(sink.push(record(2)));
        assert!(sink.is_full());
        assert!(!sink.push(record(3)));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.remaining(), 0);
    }

    #[test]
    fn clones_share_records() {
        let sink = RecordSink::new(5);
        let handle = sink.clone();
        handle.push(record(1));
        assert_eq!(sink.snapshot().len(), 1);
        assert!(sink.contains("forum-post-1"));
    }
}
