use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::defs::Analysis;
use crate::defs::Analyzer;
use crate::defs::Credibility;

const SUMMARY_MAX_CHARS: usize = 280;
const MAX_KEY_POINTS: usize = 3;
const MAX_QUOTES: usize = 3;

struct PonderedTopic {
    pub terms: Vec<String>,
}

fn ponder_topic(topic: &str) -> PonderedTopic {
    let mut terms: Vec<String> = topic
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|word| word.len() > 1)
        .collect();
    terms.dedup();
    PonderedTopic { terms }
}

fn split_sentences(body: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |next| next.is_whitespace());
        if at_boundary {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(space) => format!("{}...", &cut[..space]),
        None => format!("{cut}..."),
    }
}

fn mentions_topic(pondered: &PonderedTopic, sentence: &str) -> bool {
    let lower = sentence.to_lowercase();
    pondered.terms.iter().any(|term| lower.contains(term.as_str()))
}

fn select_key_points(pondered: &PonderedTopic, sentences: &[String]) -> Vec<String> {
    let on_topic: Vec<String> = sentences
        .iter()
        .filter(|s| mentions_topic(pondered, s))
        .take(MAX_KEY_POINTS)
        .cloned()
        .collect();
    if on_topic.is_empty() {
        sentences.iter().take(MAX_KEY_POINTS).cloned().collect()
    } else {
        on_topic
    }
}

fn extract_quotes(body: &str) -> Vec<String> {
    body.split('"')
        .skip(1)
        .step_by(2)
        .map(str::trim)
        .filter(|q| (20..=300).contains(&q.chars().count()))
        .take(MAX_QUOTES)
        .map(str::to_string)
        .collect()
}

fn score_relevance(pondered: &PonderedTopic, body: &str) -> u8 {
    if pondered.terms.is_empty() {
        return 0;
    }
    let lower = body.to_lowercase();
    let hits = pondered.terms.iter().filter(|term| lower.contains(term.as_str())).count();
    ((hits * 10) as f64 / pondered.terms.len() as f64).round() as u8
}

fn judge_credibility(kind: &str, body: &str) -> Credibility {
    let words = body.split_whitespace().count();
    match kind {
        "feed-article" | "web-article" if words >= 600 => Credibility::High,
        "feed-article" | "web-article" => Credibility::Medium,
        _ => Credibility::Low,
    }
}

/// Heuristic analyzer used when no model-backed analyzer is configured.
pub struct BaselineAnalyzer;

#[async_trait]
impl Analyzer for BaselineAnalyzer {
    async fn analyze(&self, body: &str, kind: &str, topic: &str) -> Result<Analysis> {
        if body.trim().is_empty() {
            bail!("nothing to analyze for {kind}");
        }
        let pondered = ponder_topic(topic);
        let sentences = split_sentences(body);
        let summary = sentences.first().map(|s| truncate(s, SUMMARY_MAX_CHARS)).unwrap_or_default();
        Ok(Analysis {
            summary,
            key_points: select_key_points(&pondered, &sentences),
            quotes: extract_quotes(body),
            relevance_score: score_relevance(&pondered, body),
            credibility: judge_credibility(kind, body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn summarizes_and_scores_on_topic_text() {
        let body = "Rust adoption keeps growing. Teams cite memory safety as the main reason. \
                    One engineer said \"we stopped chasing use-after-free bugs entirely\" in a talk.";
        let analysis = BaselineAnalyzer.analyze(body, "web-article", "rust safety").await.unwrap();
        assert_eq!(analysis.summary, "Rust adoption keeps growing.");
        assert_eq!(analysis.relevance_score, 10);
        assert_eq!(analysis.quotes, vec!["we stopped chasing use-after-free bugs entirely".to_string()]);
        assert_eq!(analysis.credibility, Credibility::Medium);
        assert!(analysis.key_points.iter().all(|p| p.to_lowercase().contains("rust") || p.contains("safety")));
    }

    #[tokio::test]
    async fn empty_body_is_an_error() {
        assert!(BaselineAnalyzer.analyze("   ", "forum-post", "anything").await.is_err());
    }

    #[test]
    fn unrelated_text_scores_zero() {
        let pondered = ponder_topic("quantum computing");
        assert_eq!(score_relevance(&pondered, "Cats sleep most of the day."), 0);
    }
}
