pub mod baseline;
pub mod defs;
pub mod empty;
pub mod jsonl;

pub use baseline::BaselineAnalyzer;
pub use defs::{Analysis, AnalyzedItem, Analyzer, CollectedItem, Credibility, Publisher};
pub use empty::NullPublisher;
pub use jsonl::JsonLinesPublisher;
