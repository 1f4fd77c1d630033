use super::{SignalOutput, SignalSource};
use crate::config::{compile_pattern, TextPatternConfig};
use crate::error::{AdapterFailure, ConfigError};
use crate::evidence::EvidenceKind;
use crate::message::MessageInput;
use regex::Regex;

struct CompiledPattern {
    name: String,
    regex: Regex,
    weight: f64,
}

/// Regex-driven stand-in for a text classifier.
///
/// Matched pattern weights combine as independent probabilities,
/// `1 - Π(1 - w)`, so the score stays in [0, 1] however many patterns hit.
pub struct PatternClassifier {
    kind: EvidenceKind,
    name: String,
    patterns: Vec<CompiledPattern>,
}

impl PatternClassifier {
    pub fn subject(config: &TextPatternConfig) -> Result<Self, ConfigError> {
        Self::new(EvidenceKind::Subject, config)
    }

    pub fn content(config: &TextPatternConfig) -> Result<Self, ConfigError> {
        Self::new(EvidenceKind::Content, config)
    }

    fn new(kind: EvidenceKind, config: &TextPatternConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                Ok(CompiledPattern {
                    name: p.name.clone(),
                    regex: compile_pattern(&p.pattern)?,
                    weight: p.weight.clamp(0.0, 1.0),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            kind,
            name: format!("builtin:{kind}"),
            patterns,
        })
    }

    fn location(&self) -> &'static str {
        match self.kind {
            EvidenceKind::Subject => "subject line",
            _ => "message body",
        }
    }

    pub fn classify(&self, text: &str) -> SignalOutput {
        let matched: Vec<&CompiledPattern> =
            self.patterns.iter().filter(|p| p.regex.is_match(text)).collect();

        let score = 1.0 - matched.iter().fold(1.0, |acc, p| acc * (1.0 - p.weight));

        let description = if matched.is_empty() {
            format!("No suspicious language in {}", self.location())
        } else {
            let names: Vec<&str> = matched.iter().map(|p| p.name.as_str()).collect();
            format!(
                "Suspicious language in {}: {}",
                self.location(),
                names.join(", ")
            )
        };

        SignalOutput::new(score, description).with_detail(
            "matched_patterns",
            matched.iter().map(|p| p.name.clone()).collect::<Vec<_>>(),
        )
    }
}

#[async_trait::async_trait]
impl SignalSource for PatternClassifier {
    fn kind(&self) -> EvidenceKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, message: &MessageInput) -> Result<SignalOutput, AdapterFailure> {
        let text = match self.kind {
            EvidenceKind::Subject => &message.subject,
            _ => &message.body,
        };
        Ok(self.classify(text))
    }
}
