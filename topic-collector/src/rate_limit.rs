use crate::types::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Ceiling for a backoff that would overflow the clock.
const MAX_BACKOFF: Duration = Duration::from_secs(24 * 3600);

/// Dispatch bookkeeping for one target host.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitState {
    pub last_dispatch: Option<Instant>,
    pub backoff_until: Option<Instant>,
}

impl RateLimitState {
    /// Earliest instant the next dispatch may happen, if constrained.
    pub fn ready_at(&self, min_interval: Duration) -> Option<Instant> {
        let spaced = self.last_dispatch.map(|last| last + min_interval);
        match (spaced, self.backoff_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Fixed-delay limiter keyed by target host.
///
/// Each target's state is locked only to read or stamp it, never across a
/// wait, so a backoff recorded while others are waiting applies to them too.
pub struct RateLimiter {
    default_interval: Duration,
    intervals: HashMap<String, Duration>,
    targets: Mutex<HashMap<String, Arc<Mutex<RateLimitState>>>>,
}

impl RateLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            intervals: HashMap::new(),
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// Override the minimum interval for one target.
    pub fn with_interval(mut self, target: impl Into<String>, interval: Duration) -> Self {
        self.intervals.insert(target.into(), interval);
        self
    }

    pub fn interval_for(&self, target: &str) -> Duration {
        self.intervals.get(target).copied().unwrap_or(self.default_interval)
    }

    fn slot(&self, target: &str) -> Arc<Mutex<RateLimitState>> {
        let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        targets.entry(target.to_string()).or_default().clone()
    }

    /// Wait until `target` may be hit again, then record the dispatch.
    ///
    /// The deadline is re-read after every sleep: another dispatch or a
    /// backoff may have moved it while this task was waiting.
    pub async fn acquire(&self, target: &str) {
        let interval = self.interval_for(target);
        let slot = self.slot(target);

        loop {
            let ready_at = {
                let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                match state.ready_at(interval) {
                    Some(ready_at) if ready_at > now => ready_at,
                    _ => {
                        state.last_dispatch = Some(now);
                        return;
                    }
                }
            };
            debug!(
                target_host = target,
                wait_ms = ready_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Rate limiting"
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }

    /// Push the target's backoff deadline out to at least `delay` from now.
    pub fn defer(&self, target: &str, delay: Duration) {
        let slot = self.slot(target);
        let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let until = now.checked_add(delay).unwrap_or_else(|| now + MAX_BACKOFF);
        state.backoff_until = Some(state.backoff_until.map_or(until, |current| current.max(until)));
        debug!(target_host = target, delay_ms = delay.as_millis() as u64, "Backing off target");
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// The rate-limit key for a URL: host, plus port when one is given.
pub fn target_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}
