//! Verdict Aggregator
//!
//! Combines weighted evidence into a risk score in [0,100] and maps it onto a
//! fixed verdict tier.

use crate::evidence::Evidence;
use crate::insights::ActionableInsight;
use crate::notification::NotificationOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SUSPICIOUS_THRESHOLD: f64 = 25.0;
pub const DANGEROUS_THRESHOLD: f64 = 55.0;
pub const CRITICAL_THRESHOLD: f64 = 80.0;

/// Categorical classification, ordered by severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Suspicious,
    Dangerous,
    Critical,
}

impl Verdict {
    pub fn from_score(risk_score: f64) -> Self {
        match risk_score {
            s if s >= CRITICAL_THRESHOLD => Verdict::Critical,
            s if s >= DANGEROUS_THRESHOLD => Verdict::Dangerous,
            s if s >= SUSPICIOUS_THRESHOLD => Verdict::Suspicious,
            _ => Verdict::Safe,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Verdict::Safe => "Likely a legitimate message",
            Verdict::Suspicious => "Contains some suspicious elements",
            Verdict::Dangerous => "High likelihood of being a phishing attempt",
            Verdict::Critical => "Almost certainly a phishing or malicious message",
        }
    }

    pub fn recommended_action(self) -> &'static str {
        match self {
            Verdict::Safe => "No action needed",
            Verdict::Suspicious => "Exercise caution before trusting links or attachments",
            Verdict::Dangerous => "Do not click links or open attachments",
            Verdict::Critical => "Report immediately and delete the message",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Safe => "safe",
            Verdict::Suspicious => "suspicious",
            Verdict::Dangerous => "dangerous",
            Verdict::Critical => "critical",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score, tier and the evidence they were computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub risk_score: f64,
    pub verdict: Verdict,
    pub evidence: Vec<Evidence>,
}

/// Aggregate output for one analyzed message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerdictResult {
    pub verdict: Verdict,
    pub risk_score: f64,
    pub description: String,
    pub evidence: Vec<Evidence>,
    pub insights: Vec<ActionableInsight>,
    pub recommended_action: String,
}

/// What callers of the pipeline receive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerdictResponse {
    #[serde(flatten)]
    pub result: VerdictResult,
    pub notification: NotificationOutcome,
}

pub struct VerdictAggregator;

impl VerdictAggregator {
    /// `100 * Σ(score·weight) / Σ(weight)` over available evidence. Kinds that
    /// are absent or unavailable drop out of both sums.
    pub fn aggregate(evidence: &[Evidence]) -> Aggregate {
        let (weighted, total_weight) = evidence
            .iter()
            .filter(|e| e.available)
            .fold((0.0_f64, 0.0_f64), |(sum, weights), e| {
                (sum + e.score * e.weight, weights + e.weight)
            });

        if total_weight <= 0.0 {
            // No usable signal. Reported as safe rather than escalated; the
            // synthetic entry makes the absence of evidence explicit.
            log::warn!("No signal source produced usable evidence, defaulting to safe");
            return Aggregate {
                risk_score: 0.0,
                verdict: Verdict::Safe,
                evidence: vec![Evidence::total_failure()],
            };
        }

        let risk_score = (100.0 * weighted / total_weight).clamp(0.0, 100.0);
        let verdict = Verdict::from_score(risk_score);

        Aggregate {
            risk_score,
            verdict,
            evidence: evidence.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterFailure;
    use crate::evidence::EvidenceKind;

    fn ev(kind: EvidenceKind, score: f64) -> Evidence {
        Evidence::new(kind, format!("{kind} signal"), score)
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(Verdict::from_score(0.0), Verdict::Safe);
        assert_eq!(Verdict::from_score(24.999_999), Verdict::Safe);
        assert_eq!(Verdict::from_score(25.0), Verdict::Suspicious);
        assert_eq!(Verdict::from_score(54.999), Verdict::Suspicious);
        assert_eq!(Verdict::from_score(55.0), Verdict::Dangerous);
        assert_eq!(Verdict::from_score(79.999), Verdict::Dangerous);
        assert_eq!(Verdict::from_score(80.0), Verdict::Critical);
        assert_eq!(Verdict::from_score(100.0), Verdict::Critical);
    }

    #[test]
    fn test_verdict_ordering() {
        assert!(Verdict::Safe < Verdict::Suspicious);
        assert!(Verdict::Suspicious < Verdict::Dangerous);
        assert!(Verdict::Dangerous < Verdict::Critical);
    }

    #[test]
    fn test_worked_example() {
        let evidence = vec![
            ev(EvidenceKind::Subject, 0.9),
            ev(EvidenceKind::Content, 0.9),
            ev(EvidenceKind::Links, 0.1),
            ev(EvidenceKind::Sender, 0.1),
        ];
        let aggregate = VerdictAggregator::aggregate(&evidence);
        assert!((aggregate.risk_score - 50.0).abs() < 1e-9);
        assert_eq!(aggregate.verdict, Verdict::Suspicious);
        assert_eq!(aggregate.evidence, evidence);
    }

    #[test]
    fn test_empty_evidence_is_safe_with_one_synthetic_entry() {
        let aggregate = VerdictAggregator::aggregate(&[]);
        assert_eq!(aggregate.risk_score, 0.0);
        assert_eq!(aggregate.verdict, Verdict::Safe);
        assert_eq!(aggregate.evidence.len(), 1);
        assert!(!aggregate.evidence[0].available);
        assert!(aggregate.evidence[0].description.contains("unavailable"));
    }

    #[test]
    fn test_all_unavailable_collapses_to_synthetic_entry() {
        let evidence: Vec<Evidence> = EvidenceKind::ALL
            .iter()
            .map(|&k| Evidence::unavailable(k, &AdapterFailure::Cancelled))
            .collect();
        let aggregate = VerdictAggregator::aggregate(&evidence);
        assert_eq!(aggregate.verdict, Verdict::Safe);
        assert_eq!(aggregate.evidence, vec![Evidence::total_failure()]);
    }

    #[test]
    fn test_score_independent_of_missing_kinds() {
        // Equal scores on any subset normalize to the same risk score.
        let subsets: Vec<Vec<EvidenceKind>> = vec![
            vec![EvidenceKind::Subject],
            vec![EvidenceKind::Content, EvidenceKind::Sender],
            vec![EvidenceKind::Subject, EvidenceKind::Links, EvidenceKind::Sender],
            EvidenceKind::ALL.to_vec(),
        ];
        for kinds in subsets {
            let evidence: Vec<Evidence> = kinds.iter().map(|&k| ev(k, 0.6)).collect();
            let aggregate = VerdictAggregator::aggregate(&evidence);
            assert!((aggregate.risk_score - 60.0).abs() < 1e-9, "{kinds:?}");
            assert_eq!(aggregate.verdict, Verdict::Dangerous);
        }
    }

    #[test]
    fn test_unavailable_evidence_excluded_from_weights() {
        let present = vec![ev(EvidenceKind::Content, 0.8), ev(EvidenceKind::Links, 0.4)];
        let mut with_failure = present.clone();
        with_failure.push(Evidence::unavailable(
            EvidenceKind::Sender,
            &AdapterFailure::Failed("dns".to_string()),
        ));

        let a = VerdictAggregator::aggregate(&present);
        let b = VerdictAggregator::aggregate(&with_failure);
        assert!((a.risk_score - b.risk_score).abs() < 1e-12);
        assert_eq!(b.evidence.len(), 3);
    }

    #[test]
    fn test_partial_set_normalization() {
        // (0.8*0.35 + 0.2*0.25) / 0.6 = 0.55
        let evidence = vec![ev(EvidenceKind::Content, 0.8), ev(EvidenceKind::Sender, 0.2)];
        let aggregate = VerdictAggregator::aggregate(&evidence);
        assert!((aggregate.risk_score - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_tier_texts() {
        assert_eq!(Verdict::Safe.recommended_action(), "No action needed");
        assert_eq!(
            Verdict::Critical.recommended_action(),
            "Report immediately and delete the message"
        );
        assert_eq!(
            serde_json::to_value(Verdict::Dangerous).unwrap(),
            serde_json::json!("dangerous")
        );
    }
}
