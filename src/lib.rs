pub mod analyzer;
pub mod config;
pub mod error;
pub mod evidence;
pub mod insights;
pub mod message;
pub mod notification;
pub mod signals;
pub mod verdict;

pub use analyzer::{CancelSignal, PhishingAnalyzer, VerdictRequest};
pub use config::Config;
pub use error::{AdapterFailure, ConfigError, VerdictError};
pub use evidence::{Evidence, EvidenceBuilder, EvidenceKind};
pub use insights::{ActionableInsight, InsightGenerator, InsightKind};
pub use message::MessageInput;
pub use notification::{
    NotificationAction, NotificationDispatcher, NotificationOutcome, NotificationPage,
    NotificationRecord,
};
pub use signals::{SignalOutput, SignalSource};
pub use verdict::{Verdict, VerdictAggregator, VerdictResponse, VerdictResult};
