use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use interfaces::{AnalyzedItem, Analyzer, BaselineAnalyzer, CollectedItem, JsonLinesPublisher, NullPublisher, Publisher};
use std::sync::Arc;
use std::time::Duration;
use topic_collector::aggregator::parse_kinds;
use topic_collector::{CollectionOrchestrator, Diagnostic, ResultCache, Settings, SourceRecord};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Collect what feeds, the web, forums and social media say about a topic")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect records about a topic and print them as JSON lines
    Research(ResearchArgs),
    /// Show how many cache entries exist and how many have expired
    CacheStats,
    /// Remove every cache entry
    CacheClear,
}

#[derive(Args)]
struct ResearchArgs {
    topic: String,

    /// Source kinds in priority order
    #[arg(short, long, value_delimiter = ',', default_value = "feed,web,forum,social")]
    sources: Vec<String>,

    /// Overall record budget (defaults to MAX_SOURCES_PER_TOPIC)
    #[arg(short, long)]
    max_sources: Option<usize>,

    /// Deadline in seconds (defaults to RESEARCH_TIMEOUT_SECS)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Collect and analyze, but publish nothing
    #[arg(long)]
    dry_run: bool,

    /// Skip the analysis step
    #[arg(long)]
    no_analyze: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;
    let cache = Arc::new(
        ResultCache::open(&settings.cache_path)
            .await
            .with_context(|| format!("failed to open cache at {}", settings.cache_path.display()))?,
    );

    let outcome = match cli.command {
        Command::Research(args) => research(&settings, cache.clone(), args).await,
        Command::CacheStats => cache_stats(&cache).await,
        Command::CacheClear => cache_clear(&cache).await,
    };

    cache.close().await;
    outcome
}

async fn research(settings: &Settings, cache: Arc<ResultCache>, args: ResearchArgs) -> Result<()> {
    let (kinds, unknown) = parse_kinds(args.sources.as_slice());
    for diagnostic in &unknown {
        warn!(?diagnostic, "Ignoring requested source");
    }

    let mut orchestrator = CollectionOrchestrator::from_settings(settings, cache)?;
    if let Some(secs) = args.timeout {
        orchestrator = orchestrator.with_deadline(Duration::from_secs(secs));
    }
    let max_sources = args.max_sources.unwrap_or(settings.max_sources);

    info!(topic = %args.topic, ?kinds, max_sources, "Starting research");
    let report = orchestrator.run_with_report(&args.topic, &kinds, max_sources).await;
    for diagnostic in &report.diagnostics {
        match diagnostic {
            Diagnostic::Shortfall { .. } => info!(?diagnostic, "Collection diagnostic"),
            _ => warn!(?diagnostic, "Collection diagnostic"),
        }
    }

    let items: Vec<AnalyzedItem> = if args.no_analyze {
        report
            .records
            .iter()
            .map(|record| AnalyzedItem {
                item: CollectedItem::from(record),
                analysis: None,
            })
            .collect()
    } else {
        let analyzer = BaselineAnalyzer;
        join_all(report.records.iter().map(|record| analyze(&analyzer, record, &args.topic))).await
    };

    let publisher: Box<dyn Publisher> = if args.dry_run {
        Box::new(NullPublisher)
    } else {
        Box::new(JsonLinesPublisher::new(std::io::stdout()))
    };
    publisher.publish(&args.topic, &items).await.context("failed to publish results")?;

    info!(
        topic = %args.topic,
        records = items.len(),
        analyzed = items.iter().filter(|i| i.analysis.is_some()).count(),
        dry_run = args.dry_run,
        "Research finished"
    );
    Ok(())
}

async fn cache_stats(cache: &ResultCache) -> Result<()> {
    let stats = cache.stats().await?;
    info!(total = stats.total, expired = stats.expired, "Cache statistics");
    println!("total={} expired={}", stats.total, stats.expired);
    Ok(())
}

async fn cache_clear(cache: &ResultCache) -> Result<()> {
    let removed = cache.clear().await?;
    info!(removed, "Cleared cache");
    Ok(())
}

async fn analyze(analyzer: &dyn Analyzer, record: &SourceRecord, topic: &str) -> AnalyzedItem {
    let analysis = match analyzer.analyze(&record.body, record.kind.as_str(), topic).await {
        Ok(analysis) => Some(analysis),
        Err(e) => {
            warn!(id = %record.id, error = %e, "Analysis failed, publishing without it");
            None
        }
    };
    AnalyzedItem {
        item: CollectedItem::from(record),
        analysis,
    }
}
