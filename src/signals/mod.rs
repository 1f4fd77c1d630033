pub mod http;
pub mod links;
pub mod sender;
pub mod text;

use crate::config::{Config, SourceConfig};
use crate::error::{AdapterFailure, ConfigError};
use crate::evidence::EvidenceKind;
use crate::message::MessageInput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Risk score for a single URL found in the message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrlScore {
    pub url: String,
    pub score: f64,
}

impl UrlScore {
    pub fn new(url: impl Into<String>, score: f64) -> Self {
        Self {
            url: url.into(),
            score,
        }
    }
}

/// Raw output of a signal source, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalOutput {
    pub score: f64,
    pub description: String,
    /// Per-URL scores; only link sources fill this in.
    #[serde(default)]
    pub url_scores: Vec<UrlScore>,
    #[serde(default)]
    pub detail: BTreeMap<String, serde_json::Value>,
}

impl SignalOutput {
    pub fn new(score: f64, description: impl Into<String>) -> Self {
        Self {
            score,
            description: description.into(),
            url_scores: Vec::new(),
            detail: BTreeMap::new(),
        }
    }

    pub fn with_url_scores(mut self, url_scores: Vec<UrlScore>) -> Self {
        self.url_scores = url_scores;
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

/// An external collaborator producing one kind of evidence.
///
/// Implementations must not depend on each other; the pipeline runs them
/// concurrently and may drop an in-flight call on timeout or cancellation.
#[async_trait::async_trait]
pub trait SignalSource: Send + Sync {
    fn kind(&self) -> EvidenceKind;
    fn name(&self) -> &str;
    async fn analyze(&self, message: &MessageInput) -> Result<SignalOutput, AdapterFailure>;
}

/// Instantiate the configured source for every enabled kind.
pub fn sources_from_config(config: &Config) -> Result<Vec<Arc<dyn SignalSource>>, ConfigError> {
    let http_timeout = Duration::from_millis(config.analysis.adapter_timeout_ms);
    let mut sources: Vec<Arc<dyn SignalSource>> = Vec::new();

    for (kind, source) in [
        (EvidenceKind::Subject, &config.signals.subject),
        (EvidenceKind::Content, &config.signals.content),
        (EvidenceKind::Links, &config.signals.links),
        (EvidenceKind::Sender, &config.signals.sender),
    ] {
        match source {
            SourceConfig::Disabled => {
                log::info!("{} signal source disabled", kind);
            }
            SourceConfig::Http { endpoint } => {
                sources.push(Arc::new(http::HttpSignalSource::new(
                    kind,
                    endpoint,
                    http_timeout,
                )?));
            }
            SourceConfig::Builtin => {
                let builtin: Arc<dyn SignalSource> = match kind {
                    EvidenceKind::Subject => Arc::new(text::PatternClassifier::subject(
                        &config.heuristics.subject,
                    )?),
                    EvidenceKind::Content => Arc::new(text::PatternClassifier::content(
                        &config.heuristics.content,
                    )?),
                    EvidenceKind::Links => {
                        Arc::new(links::LinkAnalyzer::new(&config.heuristics.links))
                    }
                    EvidenceKind::Sender => Arc::new(sender::SenderReputationAnalyzer::new(
                        &config.heuristics.sender,
                    )),
                };
                sources.push(builtin);
            }
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_all_builtin_sources() {
        let sources = sources_from_config(&Config::default()).unwrap();
        let kinds: Vec<_> = sources.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, EvidenceKind::ALL.to_vec());
    }

    #[test]
    fn test_disabled_sources_are_skipped() {
        let mut config = Config::default();
        config.signals.links = SourceConfig::Disabled;
        config.signals.subject = SourceConfig::Http {
            endpoint: "http://127.0.0.1:9/subject".to_string(),
        };
        let sources = sources_from_config(&config).unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].name(), "http:subject");
        assert!(sources.iter().all(|s| s.kind() != EvidenceKind::Links));
    }

    #[test]
    fn test_signal_output_deserializes_without_optional_fields() {
        let output: SignalOutput =
            serde_json::from_str(r#"{"score": 0.4, "description": "ok"}"#).unwrap();
        assert_eq!(output, SignalOutput::new(0.4, "ok"));
    }
}
