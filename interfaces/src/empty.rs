use anyhow::Result;
use async_trait::async_trait;

use crate::defs::AnalyzedItem;
use crate::defs::Publisher;

pub struct NullPublisher;

#[async_trait]
impl Publisher for NullPublisher {
    async fn publish(&self, _topic: &str, _items: &[AnalyzedItem]) -> Result<()> {
        // Nothing leaves the process.
        Ok(())
    }
}
