//! Accept/reject rules applied to candidates before normalization.
//!
//! Every rule has the same shape: a minimum text length, an engagement floor
//! (or an alternative reply count, or an authority bypass), and deny markers
//! that can be overridden by high engagement or authority.

use crate::types::DateRange;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    LowEngagement,
    Denied,
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// What a rule looks at.
#[derive(Debug, Clone, Default)]
pub struct Candidate<'a> {
    pub text: &'a str,
    pub engagement: i64,
    pub replies: i64,
    /// Verified author or similar.
    pub authoritative: bool,
}

impl<'a> Candidate<'a> {
    pub fn text(text: &'a str) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityRule {
    pub min_length: usize,
    pub min_engagement: Option<i64>,
    /// Alternative to the engagement floor.
    pub min_replies: Option<i64>,
    pub authority_bypasses_engagement: bool,
    pub deny_markers: &'static [&'static str],
    pub deny_patterns: &'static [Regex],
    pub deny_override_engagement: Option<i64>,
    pub authority_bypasses_deny: bool,
}

const POST_MARKERS: &[&str] = &["shitpost", "meme", "clickbait", "first time", "new here", "what do you think"];

const SPAM_MARKERS: &[&str] = &["🚀", "click here", "buy now", "free money", "moon", "100x"];

const SPONSORED_MARKERS: &[&str] = &["sponsored", "advertisement", "partner content", "paid post"];

const BROKEN_PAGE_MARKERS: &[&str] = &[
    "subscribe to continue",
    "subscribe to read",
    "access denied",
    "page not found",
    "enable javascript",
    "are you a robot",
];

static LOW_EFFORT_COMMENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)^this\.?$", r"(?i)^thanks!?$", r"(?i)^good point\.?$", r"(?i)^i agree\.?$", r"^\+\d+$", r"(?i)^edit:"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

impl QualityRule {
    pub fn forum_post() -> Self {
        Self {
            min_length: 100,
            min_engagement: Some(3),
            min_replies: Some(5),
            authority_bypasses_engagement: false,
            deny_markers: POST_MARKERS,
            deny_patterns: &[],
            deny_override_engagement: Some(10),
            authority_bypasses_deny: false,
        }
    }

    pub fn forum_comment() -> Self {
        Self {
            min_length: 100,
            min_engagement: Some(1),
            min_replies: None,
            authority_bypasses_engagement: false,
            deny_markers: &[],
            deny_patterns: LOW_EFFORT_COMMENTS.as_slice(),
            deny_override_engagement: None,
            authority_bypasses_deny: false,
        }
    }

    pub fn social_post() -> Self {
        Self {
            min_length: 50,
            min_engagement: Some(5),
            min_replies: None,
            authority_bypasses_engagement: true,
            deny_markers: SPAM_MARKERS,
            deny_patterns: &[],
            deny_override_engagement: None,
            authority_bypasses_deny: true,
        }
    }

    pub fn feed_entry() -> Self {
        Self {
            min_length: 80,
            min_engagement: None,
            min_replies: None,
            authority_bypasses_engagement: false,
            deny_markers: SPONSORED_MARKERS,
            deny_patterns: &[],
            deny_override_engagement: None,
            authority_bypasses_deny: false,
        }
    }

    pub fn web_article() -> Self {
        Self {
            min_length: 200,
            min_engagement: None,
            min_replies: None,
            authority_bypasses_engagement: false,
            deny_markers: BROKEN_PAGE_MARKERS,
            deny_patterns: &[],
            deny_override_engagement: None,
            authority_bypasses_deny: false,
        }
    }

    pub fn check(&self, candidate: &Candidate<'_>) -> Verdict {
        let text = candidate.text.trim();
        if text.chars().count() < self.min_length {
            return Verdict::Reject(RejectReason::TooShort);
        }

        if let Some(floor) = self.min_engagement {
            let engaged = candidate.engagement >= floor
                || self.min_replies.is_some_and(|r| candidate.replies >= r)
                || (self.authority_bypasses_engagement && candidate.authoritative);
            if !engaged {
                return Verdict::Reject(RejectReason::LowEngagement);
            }
        }

        if self.is_denied(text) {
            let overridden = self.deny_override_engagement.is_some_and(|t| candidate.engagement >= t)
                || (self.authority_bypasses_deny && candidate.authoritative);
            if !overridden {
                return Verdict::Reject(RejectReason::Denied);
            }
        }

        Verdict::Accept
    }

    fn is_denied(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.deny_markers.iter().any(|m| lower.contains(m)) || self.deny_patterns.iter().any(|p| p.is_match(text))
    }
}

/// Undated candidates are kept; dated ones must fall inside the range when one is given.
pub fn within_range(published_at: Option<DateTime<Utc>>, range: &Option<DateRange>) -> bool {
    match (published_at, range) {
        (Some(at), Some(range)) => range.contains(at),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn long(prefix: &str, len: usize) -> String {
        let mut text = prefix.to_string();
        while text.chars().count() < len {
            text.push_str(" lorem ipsum");
        }
        text
    }

    #[test]
    fn forum_post_needs_score_or_comments() {
        let rule = QualityRule::forum_post();
        let text = long("A detailed writeup of our migration", 120);
        let low = Candidate { text: &text, engagement: 1, replies: 0, authoritative: false };
        assert_eq!(rule.check(&low), Verdict::Reject(RejectReason::LowEngagement));

        let discussed = Candidate { replies: 6, ..low.clone() };
        assert!(rule.check(&discussed).is_accept());

        let scored = Candidate { engagement: 3, ..low };
        assert!(rule.check(&scored).is_accept());
    }

    #[test]
    fn forum_post_markers_yield_to_high_score() {
        let rule = QualityRule::forum_post();
        let text = long("Clickbait title but the body is long enough", 120);
        let modest = Candidate { text: &text, engagement: 5, replies: 0, authoritative: false };
        assert_eq!(rule.check(&modest), Verdict::Reject(RejectReason::Denied));

        let popular = Candidate { engagement: 10, ..modest };
        assert!(rule.check(&popular).is_accept());
    }

    #[test]
    fn short_text_is_rejected_first() {
        let rule = QualityRule::forum_post();
        let c = Candidate { text: "too short", engagement: 500, replies: 50, authoritative: true };
        assert_eq!(rule.check(&c), Verdict::Reject(RejectReason::TooShort));
    }

    #[test]
    fn low_effort_comments_are_denied() {
        assert!(LOW_EFFORT_COMMENTS.iter().any(|p| p.is_match("This.")));
        assert!(LOW_EFFORT_COMMENTS.iter().any(|p| p.is_match("+1")));
        assert!(LOW_EFFORT_COMMENTS.iter().any(|p| p.is_match("EDIT: fixed typo")));

        let rule = QualityRule::forum_comment();
        let text = long("edit: thanks for the gold, anyway my point stands", 110);
        let c = Candidate { text: &text, engagement: 50, replies: 0, authoritative: false };
        assert_eq!(rule.check(&c), Verdict::Reject(RejectReason::Denied));
    }

    #[test]
    fn verified_social_authors_bypass_engagement_and_spam() {
        let rule = QualityRule::social_post();
        let text = long("New model release 🚀 with details on evaluation", 60);
        let anon = Candidate { text: &text, engagement: 100, replies: 0, authoritative: false };
        assert_eq!(rule.check(&anon), Verdict::Reject(RejectReason::Denied));

        let verified = Candidate { engagement: 0, authoritative: true, ..anon };
        assert!(rule.check(&verified).is_accept());
    }

    #[test]
    fn articles_reject_broken_pages() {
        let rule = QualityRule::web_article();
        let text = long("Access denied. Please verify you are human", 220);
        assert_eq!(rule.check(&Candidate::text(&text)), Verdict::Reject(RejectReason::Denied));

        let fine = long("An in-depth look at evaluation methodology", 220);
        assert!(rule.check(&Candidate::text(&fine)).is_accept());
    }

    #[test]
    fn date_range_only_constrains_dated_items() {
        let now = Utc::now();
        let range = Some(DateRange { from: now - Duration::days(7), to: now });
        assert!(within_range(None, &range));
        assert!(within_range(Some(now - Duration::days(1)), &range));
        assert!(!within_range(Some(now - Duration::days(30)), &range));
        assert!(within_range(Some(now - Duration::days(30)), &None));
    }
}
