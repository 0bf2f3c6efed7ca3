use crate::types::CollectorError;
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Header values above this are absolute epoch seconds, below it relative seconds.
const EPOCH_THRESHOLD: u64 = 1_000_000_000;

const RESET_HEADERS: [&str; 3] = ["x-ratelimit-reset", "x-rate-limit-reset", "retry-after"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Transient,
    Fatal,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=399 => StatusClass::Success,
        429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Fatal,
    }
}

/// How a fetch reacts to transient failures. One value per source.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Used on 429 when the target advertises no reset time.
    pub rate_limit_delay: Duration,
    /// Used on 5xx, and as the first step for network-level failures.
    pub transient_delay: Duration,
    pub max_network_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            rate_limit_delay: Duration::from_secs(60),
            transient_delay: Duration::from_secs(5),
            max_network_delay: Duration::from_secs(80),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, rate_limit_delay: Duration, transient_delay: Duration) -> Self {
        self.rate_limit_delay = rate_limit_delay;
        self.transient_delay = transient_delay;
        self.max_network_delay = self.max_network_delay.max(transient_delay);
        self
    }

    /// Fresh schedule for failures that carry no HTTP status.
    pub fn network_backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: self.transient_delay,
            initial_interval: self.transient_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_network_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Delay before the next attempt against the same target.
    pub fn delay_for(
        &self,
        error: &CollectorError,
        network_backoff: &mut ExponentialBackoff<backoff::SystemClock>,
    ) -> Duration {
        match error {
            CollectorError::Transient { status: Some(429), reset_after, .. } => {
                reset_after.unwrap_or(self.rate_limit_delay)
            }
            CollectorError::Transient { status: Some(_), .. } => self.transient_delay,
            _ => network_backoff.next_backoff().unwrap_or(self.max_network_delay),
        }
    }
}

/// Reads the advertised rate-limit reset from response headers (lowercase keys).
pub fn parse_reset_header(headers: &HashMap<String, String>, now: DateTime<Utc>) -> Option<Duration> {
    RESET_HEADERS.iter().find_map(|name| {
        let raw = headers.get(*name)?.trim();
        let Ok(value) = raw.parse::<f64>() else {
            // retry-after may also be an HTTP-date
            let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
            let wait_ms = (at - now).num_milliseconds().max(0);
            return Some(Duration::from_millis(wait_ms as u64));
        };
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        if value as u64 > EPOCH_THRESHOLD {
            let reset_ms = (value * 1000.0) as i64;
            let wait_ms = reset_ms.saturating_sub(now.timestamp_millis()).max(0);
            Some(Duration::from_millis(wait_ms as u64))
        } else {
            Some(Duration::from_secs_f64(value))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient(status: Option<u16>, reset_after: Option<Duration>) -> CollectorError {
        CollectorError::Transient {
            target: "example.com".to_string(),
            status,
            reason: "test".to_string(),
            reset_after,
        }
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify_status(200), StatusClass::Success);
        assert_eq!(classify_status(304), StatusClass::Success);
        assert_eq!(classify_status(429), StatusClass::Transient);
        assert_eq!(classify_status(503), StatusClass::Transient);
        assert_eq!(classify_status(401), StatusClass::Fatal);
        assert_eq!(classify_status(404), StatusClass::Fatal);
    }

    #[test]
    fn delay_follows_status() {
        let policy = RetryPolicy::default();
        let mut network = policy.network_backoff();
        assert_eq!(policy.delay_for(&transient(Some(429), None), &mut network), Duration::from_secs(60));
        assert_eq!(
            policy.delay_for(&transient(Some(429), Some(Duration::from_secs(7))), &mut network),
            Duration::from_secs(7)
        );
        assert_eq!(policy.delay_for(&transient(Some(503), None), &mut network), Duration::from_secs(5));
    }

    #[test]
    fn network_failures_back_off_exponentially() {
        let policy = RetryPolicy::default();
        let mut network = policy.network_backoff();
        assert_eq!(policy.delay_for(&transient(None, None), &mut network), Duration::from_secs(5));
        assert_eq!(policy.delay_for(&transient(None, None), &mut network), Duration::from_secs(10));
    }

    #[test]
    fn reset_header_accepts_epoch_and_relative_seconds() {
        let now = Utc::now();
        let mut headers = HashMap::new();
        headers.insert("x-ratelimit-reset".to_string(), (now.timestamp() + 30).to_string());
        let wait = parse_reset_header(&headers, now).unwrap();
        assert!(wait <= Duration::from_secs(30) && wait >= Duration::from_secs(29));

        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "12".to_string());
        assert_eq!(parse_reset_header(&headers, now), Some(Duration::from_secs(12)));

        let mut headers = HashMap::new();
        headers.insert("x-rate-limit-reset".to_string(), (now.timestamp() - 100).to_string());
        assert_eq!(parse_reset_header(&headers, now), Some(Duration::ZERO));

        assert_eq!(parse_reset_header(&HashMap::new(), now), None);
    }

    #[test]
    fn retry_after_accepts_http_date() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2026 07:28:00 GMT").unwrap().with_timezone(&Utc);
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "Wed, 21 Oct 2026 07:28:45 GMT".to_string());
        assert_eq!(parse_reset_header(&headers, now), Some(Duration::from_secs(45)));

        headers.insert("retry-after".to_string(), "Wed, 21 Oct 2026 07:00:00 GMT".to_string());
        assert_eq!(parse_reset_header(&headers, now), Some(Duration::ZERO));

        headers.insert("retry-after".to_string(), "soon".to_string());
        assert_eq!(parse_reset_header(&headers, now), None);
    }
}
