//! Evidence Builder
//!
//! Normalizes the outcome of each signal source into an [`Evidence`] record.
//! A failed source still produces a record so the result documents what
//! could not be evaluated, but that record is marked unavailable and is left
//! out of aggregation.

use crate::error::AdapterFailure;
use crate::signals::SignalOutput;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Individual URLs scoring above this are listed as suspicious.
pub const SUSPICIOUS_URL_THRESHOLD: f64 = 0.5;

/// Analysis dimension an evidence record comes from. Declaration order is the
/// order evidence appears in results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Subject,
    Content,
    Links,
    Sender,
}

impl EvidenceKind {
    pub const ALL: [EvidenceKind; 4] = [
        EvidenceKind::Subject,
        EvidenceKind::Content,
        EvidenceKind::Links,
        EvidenceKind::Sender,
    ];

    /// Static aggregation weight. Body content dominates since most phishing
    /// intent is expressed in body text.
    pub fn weight(self) -> f64 {
        match self {
            EvidenceKind::Subject => 0.15,
            EvidenceKind::Content => 0.35,
            EvidenceKind::Links => 0.25,
            EvidenceKind::Sender => 0.25,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceKind::Subject => "subject",
            EvidenceKind::Content => "content",
            EvidenceKind::Links => "links",
            EvidenceKind::Sender => "sender",
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized, weighted risk signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub description: String,
    pub score: f64,
    pub weight: f64,
    #[serde(default)]
    pub suspicious_urls: Vec<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl Evidence {
    /// Evidence from a successful source. Score is clamped to [0,1].
    pub fn new(kind: EvidenceKind, description: impl Into<String>, score: f64) -> Self {
        Self {
            kind,
            description: description.into(),
            score: if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 },
            weight: kind.weight(),
            suspicious_urls: Vec::new(),
            available: true,
        }
    }

    /// Zero-score placeholder for a source that produced nothing usable.
    pub fn unavailable(kind: EvidenceKind, failure: &AdapterFailure) -> Self {
        Self {
            kind,
            description: format!("{kind} analysis unavailable ({failure})"),
            score: 0.0,
            weight: kind.weight(),
            suspicious_urls: Vec::new(),
            available: false,
        }
    }

    /// The single entry reported when no source produced usable evidence.
    pub fn total_failure() -> Self {
        Self {
            kind: EvidenceKind::Content,
            description: "analysis unavailable: no signal source produced usable evidence"
                .to_string(),
            score: 0.0,
            weight: EvidenceKind::Content.weight(),
            suspicious_urls: Vec::new(),
            available: false,
        }
    }
}

pub struct EvidenceBuilder;

impl EvidenceBuilder {
    /// Convert one source outcome into evidence. Never fails.
    pub fn build(kind: EvidenceKind, outcome: Result<SignalOutput, AdapterFailure>) -> Evidence {
        let output = match outcome.and_then(Self::check_output) {
            Ok(output) => output,
            Err(failure) => {
                log::warn!("{} signal unavailable: {}", kind, failure);
                return Evidence::unavailable(kind, &failure);
            }
        };

        let mut evidence = Evidence::new(kind, output.description, output.score);

        if kind == EvidenceKind::Links {
            evidence.suspicious_urls = output
                .url_scores
                .into_iter()
                .filter(|u| u.score > SUSPICIOUS_URL_THRESHOLD)
                .map(|u| u.url)
                .collect();
        }

        log::debug!(
            "{} evidence: score={:.3} weight={:.2} suspicious_urls={}",
            kind,
            evidence.score,
            evidence.weight,
            evidence.suspicious_urls.len()
        );

        evidence
    }

    /// Build evidence for every outcome, ordered by kind.
    pub fn build_all(
        outcomes: impl IntoIterator<Item = (EvidenceKind, Result<SignalOutput, AdapterFailure>)>,
    ) -> Vec<Evidence> {
        let mut evidence: Vec<Evidence> = outcomes
            .into_iter()
            .map(|(kind, outcome)| Self::build(kind, outcome))
            .collect();
        evidence.sort_by_key(|e| e.kind);
        evidence
    }

    fn check_output(output: SignalOutput) -> Result<SignalOutput, AdapterFailure> {
        if !output.score.is_finite() || !(0.0..=1.0).contains(&output.score) {
            return Err(AdapterFailure::Malformed(format!(
                "score {} outside [0, 1]",
                output.score
            )));
        }
        if let Some(bad) = output
            .url_scores
            .iter()
            .find(|u| !u.score.is_finite() || !(0.0..=1.0).contains(&u.score))
        {
            return Err(AdapterFailure::Malformed(format!(
                "url score {} for {} outside [0, 1]",
                bad.score, bad.url
            )));
        }
        Ok(output)
    }
}
