//! End-to-end verdict pipeline: validate, run every signal source
//! concurrently, then build evidence, aggregate, derive insights and notify.

use crate::config::Config;
use crate::error::{AdapterFailure, ConfigError, VerdictError};
use crate::evidence::{EvidenceBuilder, EvidenceKind};
use crate::insights::InsightGenerator;
use crate::message::MessageInput;
use crate::notification::NotificationDispatcher;
use crate::signals::{self, SignalOutput, SignalSource};
use crate::verdict::{VerdictAggregator, VerdictResponse, VerdictResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Aborts the task when dropped, so dropping an in-flight `analyze` future
/// also stops every signal call it started.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Cooperative cancellation shared between a caller and in-flight analyses.
/// Outstanding signal calls are dropped and reported as cancelled.
#[derive(Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as `self`, so `changed` cannot fail here.
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerdictRequest {
    pub message: MessageInput,
    /// Notification owner. Defaults to the message recipient.
    pub user_id: Option<String>,
    pub send_notification: bool,
}

impl VerdictRequest {
    pub fn new(message: MessageInput) -> Self {
        Self {
            message,
            user_id: None,
            send_notification: false,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn notify(mut self, send_notification: bool) -> Self {
        self.send_notification = send_notification;
        self
    }
}

pub struct PhishingAnalyzer {
    sources: BTreeMap<EvidenceKind, Arc<dyn SignalSource>>,
    adapter_timeout: Duration,
    dispatcher: Arc<NotificationDispatcher>,
}

impl PhishingAnalyzer {
    pub fn new(adapter_timeout: Duration, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            sources: BTreeMap::new(),
            adapter_timeout,
            dispatcher,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let dispatcher = Arc::new(NotificationDispatcher::from_config(&config.notifications));
        let analyzer = Self::new(
            Duration::from_millis(config.analysis.adapter_timeout_ms),
            dispatcher,
        );

        Ok(signals::sources_from_config(config)?
            .into_iter()
            .fold(analyzer, |analyzer, source| analyzer.with_source(source)))
    }

    /// Register a source for its kind, replacing any earlier one.
    pub fn with_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        let kind = source.kind();
        if let Some(previous) = self.sources.insert(kind, source) {
            log::debug!("Replaced {} signal source {}", kind, previous.name());
        }
        self
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.values().map(|s| s.name().to_string()).collect()
    }

    pub async fn analyze(
        &self,
        request: VerdictRequest,
        cancel: Option<&CancelSignal>,
    ) -> Result<VerdictResponse, VerdictError> {
        let VerdictRequest {
            message,
            user_id,
            send_notification,
        } = request;
        message.validate()?;

        let message = Arc::new(message);
        let outcomes = self.collect_signals(Arc::clone(&message), cancel).await;

        let evidence = EvidenceBuilder::build_all(outcomes);
        let aggregate = VerdictAggregator::aggregate(&evidence);
        let insights = InsightGenerator::generate(&aggregate.evidence, aggregate.verdict);

        let result = VerdictResult {
            verdict: aggregate.verdict,
            risk_score: aggregate.risk_score,
            description: aggregate.verdict.description().to_string(),
            evidence: aggregate.evidence,
            insights,
            recommended_action: aggregate.verdict.recommended_action().to_string(),
        };

        log::info!(
            "Verdict {} (risk {:.1}) for message from {} to {}: {:?}",
            result.verdict,
            result.risk_score,
            message.sender,
            message.recipient,
            message.subject
        );

        let user_id = user_id.unwrap_or_else(|| message.recipient.trim().to_string());
        let notification = self.dispatcher.maybe_notify(
            &result,
            &user_id,
            &message.subject,
            &message.sender,
            send_notification,
        );

        Ok(VerdictResponse {
            result,
            notification,
        })
    }

    async fn collect_signals(
        &self,
        message: Arc<MessageInput>,
        cancel: Option<&CancelSignal>,
    ) -> Vec<(EvidenceKind, Result<SignalOutput, AdapterFailure>)> {
        let limit = self.adapter_timeout;

        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|(&kind, source)| {
                let name = source.name().to_string();
                let source = Arc::clone(source);
                let message = Arc::clone(&message);
                let cancel = cancel.cloned();
                let handle = tokio::spawn(async move {
                    let call = timeout(limit, source.analyze(&message));
                    let outcome = match cancel {
                        Some(cancel) => tokio::select! {
                            result = call => result,
                            _ = cancel.cancelled() => return Err(AdapterFailure::Cancelled),
                        },
                        None => call.await,
                    };
                    outcome.unwrap_or(Err(AdapterFailure::Timeout(limit)))
                });
                (kind, name, AbortOnDrop(handle))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (kind, name, mut task) in handles {
            let outcome = match (&mut task.0).await {
                Ok(outcome) => outcome,
                Err(e) => Err(AdapterFailure::Failed(format!("{name} aborted: {e}"))),
            };
            if let Err(failure) = &outcome {
                log::warn!("Signal source {} failed: {}", name, failure);
            }
            outcomes.push((kind, outcome));
        }
        outcomes
    }
}
