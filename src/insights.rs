use crate::evidence::Evidence;
use crate::verdict::Verdict;
use serde::{Deserialize, Serialize};

/// Evidence scoring above this produces an insight.
pub const INSIGHT_THRESHOLD: f64 = 0.5;
/// Evidence scoring above this produces a danger insight instead of a warning.
pub const DANGER_THRESHOLD: f64 = 0.8;

pub const NO_RISK_MESSAGE: &str = "No significant risk indicators found.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionableInsight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub message: String,
}

pub struct InsightGenerator;

impl InsightGenerator {
    /// One insight per strong piece of evidence, in evidence order. A safe
    /// message with nothing notable gets a single info insight.
    pub fn generate(evidence: &[Evidence], verdict: Verdict) -> Vec<ActionableInsight> {
        let mut insights: Vec<ActionableInsight> = evidence
            .iter()
            .filter(|e| e.score > INSIGHT_THRESHOLD)
            .map(|e| ActionableInsight {
                kind: if e.score > DANGER_THRESHOLD {
                    InsightKind::Danger
                } else {
                    InsightKind::Warning
                },
                message: e.description.clone(),
            })
            .collect();

        if insights.is_empty() && verdict == Verdict::Safe {
            insights.push(ActionableInsight {
                kind: InsightKind::Info,
                message: NO_RISK_MESSAGE.to_string(),
            });
        }

        insights
    }
}
