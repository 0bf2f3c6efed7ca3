use crate::auth::TokenProvider;
use crate::cache::ResultCache;
use crate::collector::SourceCollector;
use crate::fetcher::{Fetcher, ReqwestTransport};
use crate::rate_limit::RateLimiter;
use crate::settings::Settings;
use crate::sources::forum::DEFAULT_TOKEN_URL;
use crate::sources::{FeedSource, ForumSource, Reader, SocialSource, WebSearchSource};
use crate::traits::{RecordSink, Source};
use crate::types::{CollectOptions, Result, SourceKind, SourceRecord};
use crate::utils::url::dedup_key;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const FORUM_API_INTERVAL: Duration = Duration::from_secs(1);
const SOCIAL_API_INTERVAL: Duration = Duration::from_secs(3);

/// Something the caller should know about a run that still produced a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    EmptyTopic,
    UnknownSource(String),
    MissingCredentials(SourceKind),
    DeadlineExceeded { deadline: Duration, pending: Vec<SourceKind> },
    Shortfall { kind: SourceKind, budget: usize, collected: usize },
}

#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub records: Vec<SourceRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Even split of `total` over `parts`; the first `total % parts` get one extra.
pub fn split_budget(total: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = total / parts;
    let extra = total % parts;
    (0..parts).map(|i| base + usize::from(i < extra)).collect()
}

/// Source names to kinds, keeping order and dropping repeats.
pub fn parse_kinds<S: AsRef<str>>(names: &[S]) -> (Vec<SourceKind>, Vec<Diagnostic>) {
    let mut kinds = Vec::new();
    let mut diagnostics = Vec::new();
    for name in names {
        match name.as_ref().parse::<SourceKind>() {
            Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Ok(_) => {}
            Err(_) => diagnostics.push(Diagnostic::UnknownSource(name.as_ref().to_string())),
        }
    }
    (kinds, diagnostics)
}

struct Planned {
    collector: Arc<SourceCollector>,
    share: usize,
    options: CollectOptions,
    sink: RecordSink,
}

/// Fans a topic out to the registered collectors and merges what comes back.
pub struct CollectionOrchestrator {
    collectors: Vec<Arc<SourceCollector>>,
    deadline: Option<Duration>,
}

impl Default for CollectionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionOrchestrator {
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
            deadline: None,
        }
    }

    /// Wires every source kind from settings around one shared cache.
    pub fn from_settings(settings: &Settings, cache: Arc<ResultCache>) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&settings.fetch)?);
        let limiter = Arc::new(
            RateLimiter::new(Duration::from_millis(settings.fetch.min_interval_ms))
                .with_interval("oauth.reddit.com", FORUM_API_INTERVAL)
                .with_interval("api.twitter.com", SOCIAL_API_INTERVAL),
        );
        let fetcher = Fetcher::new(transport, limiter);
        let reader = settings.reader_base_url.as_ref().map(|base| Reader::new(fetcher.clone(), base.clone()));

        let mut feed = FeedSource::new(fetcher.clone(), settings.feeds.clone());
        let mut web = WebSearchSource::new(fetcher.clone());
        if let Some(reader) = reader {
            feed = feed.with_reader(reader.clone());
            web = web.with_reader(reader);
        }
        let tokens = settings
            .forum
            .clone()
            .map(|creds| Arc::new(TokenProvider::new(fetcher.clone(), DEFAULT_TOKEN_URL, creds)));
        let forum = ForumSource::new(fetcher.clone(), tokens);
        let social = SocialSource::new(fetcher, settings.social_bearer.clone());

        Ok(Self::new()
            .register(Arc::new(feed), cache.clone())
            .register(Arc::new(web), cache.clone())
            .register(Arc::new(forum), cache.clone())
            .register(Arc::new(social), cache)
            .with_deadline(settings.research_timeout))
    }

    pub fn register(mut self, source: Arc<dyn Source>, cache: Arc<ResultCache>) -> Self {
        self.collectors.push(Arc::new(SourceCollector::new(source, cache)));
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn kinds(&self) -> Vec<SourceKind> {
        self.collectors.iter().map(|c| c.kind()).collect()
    }

    fn collector_for(&self, kind: SourceKind) -> Option<Arc<SourceCollector>> {
        self.collectors.iter().find(|c| c.kind() == kind).cloned()
    }

    /// Merged, deduplicated records about `topic`, at most `max_results`. Never fails.
    pub async fn run(&self, topic: &str, kinds: &[SourceKind], max_results: usize) -> Vec<SourceRecord> {
        self.run_with_report(topic, kinds, max_results).await.records
    }

    pub async fn run_with_report(&self, topic: &str, kinds: &[SourceKind], max_results: usize) -> CollectionReport {
        self.run_with_options(topic, kinds, max_results, &CollectOptions::default()).await
    }

    /// `base` carries date range and filters; its `max_results` is replaced by each source's share.
    pub async fn run_with_options(
        &self,
        topic: &str,
        kinds: &[SourceKind],
        max_results: usize,
        base: &CollectOptions,
    ) -> CollectionReport {
        let mut report = CollectionReport::default();
        let topic = topic.trim();
        if topic.is_empty() {
            warn!("Refusing to collect for an empty topic");
            report.diagnostics.push(Diagnostic::EmptyTopic);
            return report;
        }

        let mut selected: Vec<Arc<SourceCollector>> = Vec::new();
        let mut seen = HashSet::new();
        for &kind in kinds {
            if !seen.insert(kind) {
                continue;
            }
            match self.collector_for(kind) {
                Some(collector) => selected.push(collector),
                None => report.diagnostics.push(Diagnostic::UnknownSource(kind.to_string())),
            }
        }
        if selected.is_empty() || max_results == 0 {
            return report;
        }

        let shares = split_budget(max_results, selected.len());
        let mut planned = Vec::new();
        for (collector, share) in selected.into_iter().zip(shares) {
            if !collector.source().is_configured() {
                warn!(source = %collector.kind(), "Source not configured, skipping");
                report.diagnostics.push(Diagnostic::MissingCredentials(collector.kind()));
                continue;
            }
            if share == 0 {
                continue;
            }
            let mut options = base.clone();
            options.max_results = Some(share);
            let sink = RecordSink::new(collector.budget(&options));
            planned.push(Planned {
                collector,
                share,
                options,
                sink,
            });
        }

        info!(topic, sources = planned.len(), max_results, "Starting collection run");
        let started = Instant::now();
        let finished: Vec<AtomicBool> = planned.iter().map(|_| AtomicBool::new(false)).collect();
        let runs = planned.iter().zip(&finished).map(|(plan, done)| async move {
            plan.collector.collect_into(topic, &plan.options, &plan.sink).await;
            done.store(true, Ordering::SeqCst);
        });

        match self.deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, join_all(runs)).await.is_err() {
                    let pending: Vec<SourceKind> = planned
                        .iter()
                        .zip(&finished)
                        .filter(|(_, done)| !done.load(Ordering::SeqCst))
                        .map(|(plan, _)| plan.collector.kind())
                        .collect();
                    warn!(topic, ?pending, deadline_ms = deadline.as_millis() as u64, "Deadline reached, keeping partial results");
                    report.diagnostics.push(Diagnostic::DeadlineExceeded { deadline, pending });
                }
            }
            None => {
                join_all(runs).await;
            }
        }

        let mut seen_urls = HashSet::new();
        for plan in &planned {
            let records = plan.sink.snapshot();
            if records.len() < plan.share {
                report.diagnostics.push(Diagnostic::Shortfall {
                    kind: plan.collector.kind(),
                    budget: plan.share,
                    collected: records.len(),
                });
            }
            for record in records {
                if seen_urls.insert(dedup_key(&record.url)) {
                    report.records.push(record);
                }
            }
        }
        report.records.truncate(max_results);

        info!(
            topic,
            records = report.records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collection run finished"
        );
        report
    }
}
