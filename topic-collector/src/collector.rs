use crate::cache::ResultCache;
use crate::traits::{RecordSink, Source};
use crate::types::{CollectOptions, Result, SourceKind, SourceRecord};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runs one [`Source`] behind the result cache.
pub struct SourceCollector {
    source: Arc<dyn Source>,
    cache: Arc<ResultCache>,
}

impl SourceCollector {
    pub fn new(source: Arc<dyn Source>, cache: Arc<ResultCache>) -> Self {
        Self { source, cache }
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn budget(&self, options: &CollectOptions) -> usize {
        self.source.budget(options)
    }

    pub fn cache_key(&self, topic: &str, options: &CollectOptions) -> Result<String> {
        let options = serde_json::to_string(options)?;
        Ok(format!("{}:{}:{}", self.source.kind(), topic, options))
    }

    /// Collects records about `topic`. Never fails; problems show up as fewer records.
    pub async fn collect(&self, topic: &str, options: &CollectOptions) -> Vec<SourceRecord> {
        let sink = RecordSink::new(self.budget(options));
        self.collect_into(topic, options, &sink).await;
        sink.snapshot()
    }

    /// Like [`collect`](Self::collect) but streams into a caller-owned sink, so
    /// whatever was found survives if the caller stops waiting.
    pub async fn collect_into(&self, topic: &str, options: &CollectOptions, sink: &RecordSink) {
        let topic = topic.trim();
        if topic.is_empty() {
            warn!(source = %self.source.kind(), "Empty topic, nothing to collect");
            return;
        }

        let key = match self.cache_key(topic, options) {
            Ok(key) => key,
            Err(e) => {
                error!(source = %self.source.kind(), error = %e, "Could not build cache key");
                return;
            }
        };

        let _guard = self.cache.lock_key(&key).await;

        match self.cache.get::<Vec<SourceRecord>>(&key).await {
            Ok(Some(cached)) => {
                debug!(source = %self.source.kind(), topic, records = cached.len(), "Cache hit");
                for record in cached {
                    if !sink.push(record) && sink.is_full() {
                        break;
                    }
                }
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(source = %self.source.kind(), error = %e, "Cache read failed, collecting fresh"),
        }

        info!(
            source = %self.source.kind(),
            name = %self.source.source_name(),
            topic,
            budget = sink.capacity(),
            "Starting collection"
        );
        match self.source.gather(topic, options, sink).await {
            Ok(()) => {
                let records = sink.snapshot();
                info!(source = %self.source.kind(), topic, records = records.len(), "Completed collection");
                if let Err(e) = self.cache.set(&key, &records, self.source.cache_ttl()).await {
                    warn!(source = %self.source.kind(), error = %e, "Cache write failed");
                }
            }
            Err(e) => {
                error!(
                    source = %self.source.kind(),
                    topic,
                    kept = sink.len(),
                    error = %e,
                    "Collection failed"
                );
            }
        }
    }
}
