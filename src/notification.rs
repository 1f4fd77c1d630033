//! Notification Dispatcher
//!
//! Owns every alert record. Callers only ever see clones and refer to records
//! by id. Each user's records sit behind their own lock so concurrent
//! create/list/action calls for one user are serialized without blocking
//! other users.

use crate::config::NotificationsConfig;
use crate::error::VerdictError;
use crate::verdict::{Verdict, VerdictResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

pub const REASON_NOT_REQUESTED: &str = "notification not requested";
pub const REASON_SAFE: &str = "verdict safe, no notification required";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub verdict: Verdict,
    pub risk_score: f64,
    pub description: String,
    pub recommended_action: String,
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<AdminFeedback>,
    #[serde(skip)]
    sequence: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    TruePositive,
    FalsePositive,
    NeedsReview,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminFeedback {
    pub kind: FeedbackKind,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Result of a `maybe_notify` call. `reason` explains why nothing was sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationOutcome {
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NotificationOutcome {
    fn sent(id: String) -> Self {
        Self {
            sent: true,
            notification_id: Some(id),
            reason: None,
        }
    }

    pub fn skipped(reason: &str) -> Self {
        Self {
            sent: false,
            notification_id: None,
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    Read,
    Delete,
}

impl FromStr for NotificationAction {
    type Err = VerdictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(NotificationAction::Read),
            "delete" => Ok(NotificationAction::Delete),
            other => Err(VerdictError::Validation(format!(
                "unknown notification action: {other}"
            ))),
        }
    }
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationAction::Read => f.write_str("read"),
            NotificationAction::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPage {
    pub user_id: String,
    /// Records in this page.
    pub count: usize,
    /// Records the user has in total.
    pub total: usize,
    pub notifications: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationActionResponse {
    pub status: String,
    pub notification_id: String,
    pub action: NotificationAction,
    pub result: bool,
}

impl NotificationActionResponse {
    pub fn from_result(
        notification_id: &str,
        action: NotificationAction,
        result: &Result<bool, VerdictError>,
    ) -> Self {
        Self {
            status: if result.is_ok() { "success" } else { "error" }.to_string(),
            notification_id: notification_id.to_string(),
            action,
            result: matches!(result, Ok(true)),
        }
    }
}

/// Outward delivery of a newly stored alert (mail, chat, webhook...).
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;
    fn deliver(&self, record: &NotificationRecord) -> anyhow::Result<()>;
}

/// Writes each alert to the log.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, record: &NotificationRecord) -> anyhow::Result<()> {
        log::info!(
            "ALERT [{}] user={} verdict={} score={:.1} from={} subject={:?}",
            record.id,
            record.user_id,
            record.verdict,
            record.risk_score,
            record.sender,
            record.subject
        );
        Ok(())
    }
}

type UserRecords = Arc<Mutex<Vec<NotificationRecord>>>;

pub struct NotificationDispatcher {
    users: RwLock<HashMap<String, UserRecords>>,
    /// notification id -> owning user id
    owners: RwLock<HashMap<String, String>>,
    sequence: AtomicU64,
    sinks: Vec<Box<dyn AlertSink>>,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            sinks: Vec::new(),
        }
    }

    pub fn from_config(config: &NotificationsConfig) -> Self {
        let dispatcher = Self::new();
        if config.log_alerts {
            dispatcher.with_sink(Box::new(LogAlertSink))
        } else {
            dispatcher
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Store (and deliver) an alert iff one was requested and the verdict is
    /// not safe. Creates at most one record per call.
    pub fn maybe_notify(
        &self,
        result: &VerdictResult,
        user_id: &str,
        subject: &str,
        sender: &str,
        send_requested: bool,
    ) -> NotificationOutcome {
        if result.verdict == Verdict::Safe {
            log::debug!("No notification for {}: verdict safe", user_id);
            return NotificationOutcome::skipped(REASON_SAFE);
        }
        if !send_requested {
            log::debug!("No notification for {}: not requested", user_id);
            return NotificationOutcome::skipped(REASON_NOT_REQUESTED);
        }

        let record = NotificationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            subject: subject.to_string(),
            sender: sender.to_string(),
            timestamp: Utc::now(),
            verdict: result.verdict,
            risk_score: result.risk_score,
            description: result.description.clone(),
            recommended_action: result.recommended_action.clone(),
            read: false,
            feedback: None,
            sequence: 0,
        };
        let record = self.store(record);
        log::info!(
            "Created notification {} for user {} ({})",
            record.id,
            record.user_id,
            record.verdict
        );

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(&record) {
                log::warn!(
                    "Alert sink '{}' failed for notification {}: {e}",
                    sink.name(),
                    record.id
                );
            }
        }

        NotificationOutcome::sent(record.id)
    }

    fn store(&self, mut record: NotificationRecord) -> NotificationRecord {
        record.sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let records = self.user_records_or_insert(&record.user_id);
        let mut records = lock(&records);
        self.owners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record.user_id.clone());
        records.push(record.clone());
        record
    }

    fn user_records(&self, user_id: &str) -> Option<UserRecords> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    fn user_records_or_insert(&self, user_id: &str) -> UserRecords {
        if let Some(records) = self.user_records(user_id) {
            return records;
        }
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    fn owner_of(&self, notification_id: &str) -> Result<UserRecords, VerdictError> {
        let owner = self
            .owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(notification_id)
            .cloned()
            .ok_or_else(|| VerdictError::NotFound(notification_id.to_string()))?;
        self.user_records(&owner)
            .ok_or_else(|| VerdictError::NotFound(notification_id.to_string()))
    }

    /// A user's notifications, newest first, sliced by `offset`/`limit`.
    pub fn list_notifications(&self, user_id: &str, limit: usize, offset: usize) -> NotificationPage {
        let mut all = self
            .user_records(user_id)
            .map(|records| lock(&records).clone())
            .unwrap_or_default();
        sort_newest_first(&mut all);

        let total = all.len();
        let notifications: Vec<NotificationRecord> =
            all.into_iter().skip(offset).take(limit).collect();

        NotificationPage {
            user_id: user_id.to_string(),
            count: notifications.len(),
            total,
            notifications,
        }
    }

    /// Every user's notifications, newest first.
    pub fn list_all(&self) -> Vec<NotificationRecord> {
        let users: Vec<UserRecords> = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut all: Vec<NotificationRecord> =
            users.iter().flat_map(|records| lock(records).clone()).collect();
        sort_newest_first(&mut all);
        all
    }

    pub fn get(&self, notification_id: &str) -> Result<NotificationRecord, VerdictError> {
        let records = self.owner_of(notification_id)?;
        let records = lock(&records);
        records
            .iter()
            .find(|r| r.id == notification_id)
            .cloned()
            .ok_or_else(|| VerdictError::NotFound(notification_id.to_string()))
    }

    /// `read` is idempotent; `delete` is permanent. Unknown ids are `NotFound`.
    pub fn action(
        &self,
        notification_id: &str,
        action: NotificationAction,
    ) -> Result<bool, VerdictError> {
        let records = self.owner_of(notification_id)?;
        let mut records = lock(&records);
        let position = records
            .iter()
            .position(|r| r.id == notification_id)
            .ok_or_else(|| VerdictError::NotFound(notification_id.to_string()))?;

        match action {
            NotificationAction::Read => {
                records[position].read = true;
                log::info!("Marked notification {} as read", notification_id);
            }
            NotificationAction::Delete => {
                records.remove(position);
                self.owners
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(notification_id);
                log::info!("Deleted notification {}", notification_id);
            }
        }

        Ok(true)
    }

    /// Attach an admin review to a notification, replacing any earlier one.
    pub fn submit_feedback(
        &self,
        notification_id: &str,
        kind: FeedbackKind,
        notes: Option<String>,
    ) -> Result<NotificationRecord, VerdictError> {
        let records = self.owner_of(notification_id)?;
        let mut records = lock(&records);
        let record = records
            .iter_mut()
            .find(|r| r.id == notification_id)
            .ok_or_else(|| VerdictError::NotFound(notification_id.to_string()))?;

        record.feedback = Some(AdminFeedback {
            kind,
            notes,
            submitted_at: Utc::now(),
        });
        log::info!("Feedback {:?} recorded for notification {}", kind, notification_id);

        Ok(record.clone())
    }
}

fn sort_newest_first(records: &mut [NotificationRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.sequence.cmp(&a.sequence))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result(verdict: Verdict, risk_score: f64) -> VerdictResult {
        VerdictResult {
            verdict,
            risk_score,
            description: verdict.description().to_string(),
            evidence: Vec::new(),
            insights: Vec::new(),
            recommended_action: verdict.recommended_action().to_string(),
        }
    }

    fn notify(dispatcher: &NotificationDispatcher, user: &str, subject: &str) -> String {
        dispatcher
            .maybe_notify(
                &result(Verdict::Dangerous, 70.0),
                user,
                subject,
                "bad@phish.tk",
                true,
            )
            .notification_id
            .unwrap()
    }

    #[test]
    fn test_safe_verdict_never_notifies() {
        let dispatcher = NotificationDispatcher::new();
        for requested in [true, false] {
            let outcome = dispatcher.maybe_notify(
                &result(Verdict::Safe, 10.0),
                "u1",
                "Hi",
                "a@example.com",
                requested,
            );
            assert!(!outcome.sent);
            assert_eq!(outcome.reason.as_deref(), Some(REASON_SAFE));
        }
        assert!(dispatcher.list_all().is_empty());
    }

    #[test]
    fn test_not_requested() {
        let dispatcher = NotificationDispatcher::new();
        let outcome = dispatcher.maybe_notify(
            &result(Verdict::Critical, 95.0),
            "u1",
            "Hi",
            "a@example.com",
            false,
        );
        assert!(!outcome.sent);
        assert_eq!(outcome.reason.as_deref(), Some(REASON_NOT_REQUESTED));
        assert_eq!(dispatcher.list_notifications("u1", 10, 0).total, 0);
    }

    #[test]
    fn test_notify_creates_exactly_one_unread_record() {
        let dispatcher = NotificationDispatcher::new();
        let outcome = dispatcher.maybe_notify(
            &result(Verdict::Suspicious, 40.0),
            "u1",
            "Reset your password",
            "it@phish.tk",
            true,
        );
        assert!(outcome.sent);
        assert!(outcome.reason.is_none());

        let page = dispatcher.list_notifications("u1", 10, 0);
        assert_eq!(page.count, 1);
        let record = &page.notifications[0];
        assert_eq!(Some(&record.id), outcome.notification_id.as_ref());
        assert_eq!(record.verdict, Verdict::Suspicious);
        assert_eq!(record.description, "Contains some suspicious elements");
        assert!(!record.read);
    }

    #[test]
    fn test_pagination_is_newest_first() {
        let dispatcher = NotificationDispatcher::new();
        let ids: Vec<String> = (0..5)
            .map(|i| notify(&dispatcher, "u1", &format!("message {i}")))
            .collect();

        let page = dispatcher.list_notifications("u1", 2, 2);
        assert_eq!(page.total, 5);
        assert_eq!(page.count, 2);
        let got: Vec<&str> = page.notifications.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec![ids[2].as_str(), ids[1].as_str()]);

        let all = dispatcher.list_notifications("u1", 10, 0).notifications;
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(dispatcher.list_notifications("u1", 10, 5).notifications.is_empty());
    }

    #[test]
    fn test_timestamp_order_wins_over_insertion_order() {
        let dispatcher = NotificationDispatcher::new();
        let now = Utc::now();
        let base = |id: &str, offset_minutes: i64| NotificationRecord {
            id: id.to_string(),
            user_id: "u1".to_string(),
            subject: id.to_string(),
            sender: "x@example.com".to_string(),
            timestamp: now + Duration::minutes(offset_minutes),
            verdict: Verdict::Dangerous,
            risk_score: 60.0,
            description: String::new(),
            recommended_action: String::new(),
            read: false,
            feedback: None,
            sequence: 0,
        };
        dispatcher.store(base("older", -10));
        dispatcher.store(base("newest", 5));
        dispatcher.store(base("middle", 0));

        let ids: Vec<String> = dispatcher
            .list_notifications("u1", 10, 0)
            .notifications
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["newest", "middle", "older"]);
    }

    #[test]
    fn test_users_are_isolated() {
        let dispatcher = NotificationDispatcher::new();
        notify(&dispatcher, "alice", "a");
        notify(&dispatcher, "bob", "b");
        notify(&dispatcher, "bob", "c");

        assert_eq!(dispatcher.list_notifications("alice", 10, 0).total, 1);
        assert_eq!(dispatcher.list_notifications("bob", 10, 0).total, 2);
        assert_eq!(dispatcher.list_notifications("carol", 10, 0).total, 0);
        assert_eq!(dispatcher.list_all().len(), 3);
    }

    #[test]
    fn test_read_is_idempotent() {
        let dispatcher = NotificationDispatcher::new();
        let id = notify(&dispatcher, "u1", "a");

        assert_eq!(dispatcher.action(&id, NotificationAction::Read), Ok(true));
        assert_eq!(dispatcher.action(&id, NotificationAction::Read), Ok(true));
        assert!(dispatcher.get(&id).unwrap().read);
    }

    #[test]
    fn test_delete_is_terminal() {
        let dispatcher = NotificationDispatcher::new();
        let id = notify(&dispatcher, "u1", "a");

        assert_eq!(dispatcher.action(&id, NotificationAction::Delete), Ok(true));
        assert_eq!(
            dispatcher.action(&id, NotificationAction::Read),
            Err(VerdictError::NotFound(id.clone()))
        );
        assert_eq!(
            dispatcher.action(&id, NotificationAction::Delete),
            Err(VerdictError::NotFound(id.clone()))
        );
        assert!(matches!(
            dispatcher.submit_feedback(&id, FeedbackKind::TruePositive, None),
            Err(VerdictError::NotFound(_))
        ));
        assert_eq!(dispatcher.list_notifications("u1", 10, 0).total, 0);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let dispatcher = NotificationDispatcher::new();
        assert!(matches!(
            dispatcher.action("missing", NotificationAction::Read),
            Err(VerdictError::NotFound(_))
        ));
    }

    #[test]
    fn test_feedback() {
        let dispatcher = NotificationDispatcher::new();
        let id = notify(&dispatcher, "u1", "a");
        let record = dispatcher
            .submit_feedback(&id, FeedbackKind::FalsePositive, Some("vendor mail".to_string()))
            .unwrap();
        let feedback = record.feedback.unwrap();
        assert_eq!(feedback.kind, FeedbackKind::FalsePositive);
        assert_eq!(feedback.notes.as_deref(), Some("vendor mail"));
    }

    #[test]
    fn test_action_parsing_and_response() {
        assert_eq!("read".parse::<NotificationAction>(), Ok(NotificationAction::Read));
        assert_eq!(" Delete ".parse::<NotificationAction>(), Ok(NotificationAction::Delete));
        assert!("archive".parse::<NotificationAction>().is_err());

        let ok = NotificationActionResponse::from_result("n1", NotificationAction::Read, &Ok(true));
        assert_eq!(ok.status, "success");
        assert!(ok.result);
        let err = NotificationActionResponse::from_result(
            "n1",
            NotificationAction::Delete,
            &Err(VerdictError::NotFound("n1".to_string())),
        );
        assert_eq!(err.status, "error");
        assert!(!err.result);
    }

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver(&self, _record: &NotificationRecord) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }

    #[test]
    fn test_sink_failure_keeps_record() {
        let dispatcher = NotificationDispatcher::new().with_sink(Box::new(FailingSink));
        let id = notify(&dispatcher, "u1", "a");
        assert!(dispatcher.get(&id).is_ok());
    }

    #[test]
    fn test_concurrent_creates_for_one_user() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        notify(&dispatcher, "shared", &format!("{i}-{j}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(dispatcher.list_notifications("shared", 1000, 0).total, 200);
    }
}
