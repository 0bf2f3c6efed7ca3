use crate::fetcher::{FetchRequest, Fetcher};
use crate::types::Result;
use crate::utils::text::{collapse_whitespace, truncate_chars, MAX_BODY_CHARS};

pub const DEFAULT_READER_BASE_URL: &str = "https://r.jina.ai";

/// Full-text extraction service: `GET {base}/{article url}` returns readable text.
#[derive(Clone)]
pub struct Reader {
    fetcher: Fetcher,
    base_url: String,
}

impl Reader {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn read(&self, url: &str) -> Result<String> {
        let request = FetchRequest::get(format!("{}/{}", self.base_url, url));
        let body = self.fetcher.fetch_text(&request).await?;
        Ok(truncate_chars(&collapse_whitespace(&body), MAX_BODY_CHARS))
    }
}
