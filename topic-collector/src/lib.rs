pub mod types;
pub mod utils;
pub mod rate_limit;
pub mod retry;
pub mod fetcher;
pub mod cache;
pub mod quality;
pub mod auth;
pub mod parser;
pub mod traits;
pub mod collector;
pub mod sources;
pub mod settings;
pub mod aggregator;

pub use types::*;
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use fetcher::{FetchRequest, FetchResponse, Fetcher, HttpTransport, ReqwestTransport};
pub use cache::{CacheStats, ResultCache};
pub use quality::{QualityRule, Verdict};
pub use auth::{ClientCredentials, TokenProvider};
pub use parser::FeedParser;
pub use traits::{RecordSink, Source};
pub use collector::SourceCollector;
pub use settings::Settings;
pub use aggregator::{CollectionOrchestrator, CollectionReport, Diagnostic};
