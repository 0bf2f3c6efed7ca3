pub mod feed;
pub mod forum;
pub mod reader;
pub mod social;
pub mod web;

pub use feed::{FeedSource, FeedSpec};
pub use forum::ForumSource;
pub use reader::Reader;
pub use social::SocialSource;
pub use web::WebSearchSource;
