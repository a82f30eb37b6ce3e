//! Page-context reminder scheduling.
//!
//! Every accepted reminder arms two independent timers: one here in the
//! page context and one in the worker, relayed over the message port. The
//! page timer dies with the page; the worker timer survives reloads but
//! not worker termination. Neither supersedes the other, so a reminder
//! can visibly fire twice when the page stays open. That redundancy is
//! the design; do not deduplicate it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use taskwave_common::epoch_ms;

use crate::messages::PageMessage;
use crate::notify::{
    NotificationHost, NotificationOptions, NotificationPermission, NotificationTimers,
};

/// A reminder the application wants surfaced at a target time.
#[derive(Debug, Clone)]
pub struct ReminderRequest {
    /// Correlation id (typically the todo id).
    pub id: String,
    pub title: String,
    pub body: String,
    /// Target display time, ms since epoch.
    pub target_time_ms: u64,
    /// Opaque payload carried through to click handling.
    pub payload: serde_json::Value,
}

/// What became of a schedule call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Platform has no notification support.
    Unsupported,
    /// Permission is not granted; nothing was armed or shown.
    Denied,
    /// Target time had already passed; displayed synchronously.
    ShownImmediately,
    /// Both timer paths armed.
    Scheduled { delay_ms: u64 },
}

/// Schedules reminders from the page context.
pub struct ReminderScheduler {
    host: Arc<dyn NotificationHost>,
    worker_port: mpsc::UnboundedSender<serde_json::Value>,
    timers: NotificationTimers,
}

impl ReminderScheduler {
    /// Create a scheduler posting relay messages into `worker_port`.
    pub fn new(
        host: Arc<dyn NotificationHost>,
        worker_port: mpsc::UnboundedSender<serde_json::Value>,
    ) -> Self {
        Self {
            host,
            worker_port,
            timers: NotificationTimers::new(),
        }
    }

    /// Page-side timers currently armed.
    pub fn timers(&self) -> &NotificationTimers {
        &self.timers
    }

    /// Schedule a reminder.
    pub async fn schedule(&self, request: ReminderRequest) -> ScheduleOutcome {
        if !self.host.supported() {
            warn!(id = %request.id, "notifications unsupported on this platform");
            return ScheduleOutcome::Unsupported;
        }
        if self.host.permission() != NotificationPermission::Granted {
            warn!(id = %request.id, "notification permission not granted");
            return ScheduleOutcome::Denied;
        }

        let options = NotificationOptions::reminder(&request.body, request.payload.clone());
        let now = epoch_ms();
        if request.target_time_ms <= now {
            self.host.show(&request.title, &options);
            debug!(id = %request.id, "target time already passed, shown immediately");
            return ScheduleOutcome::ShownImmediately;
        }

        let delay_ms = request.target_time_ms - now;
        self.arm_local_timer(&request, options.clone(), delay_ms).await;
        self.relay_to_worker(&request, options, delay_ms);
        ScheduleOutcome::Scheduled { delay_ms }
    }

    /// Page-context timer: fires a direct display call.
    async fn arm_local_timer(
        &self,
        request: &ReminderRequest,
        options: NotificationOptions,
        delay_ms: u64,
    ) {
        let host = self.host.clone();
        let timers = self.timers.clone();
        let id = request.id.clone();
        let title = request.title.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if host.permission() == NotificationPermission::Granted {
                host.show(&title, &options);
                debug!(id = %id, "page timer fired");
            } else {
                warn!(id = %id, "permission not granted at fire time; display skipped");
            }
            timers.remove(&id).await;
        });
        self.timers.insert(&request.id, handle).await;
        debug!(id = %request.id, delay_ms, "page timer armed");
    }

    /// Worker-context path: relay the request over the message port. A
    /// closed port (no worker yet) is tolerated; the page timer still
    /// covers the common case.
    fn relay_to_worker(
        &self,
        request: &ReminderRequest,
        options: NotificationOptions,
        delay_ms: u64,
    ) {
        let message = PageMessage::ScheduleNotification {
            id: request.id.clone(),
            title: request.title.clone(),
            options,
            delay: delay_ms,
        };
        match serde_json::to_value(&message) {
            Ok(value) => {
                let _ = self.worker_port.send(value);
            }
            Err(e) => warn!(id = %request.id, error = %e, "failed to encode relay message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingHost;

    fn reminder(id: &str, target_time_ms: u64) -> ReminderRequest {
        ReminderRequest {
            id: id.to_string(),
            title: "Water the plants".to_string(),
            body: "Due".to_string(),
            target_time_ms,
            payload: serde_json::json!({"todoId": id, "url": "/"}),
        }
    }

    #[tokio::test]
    async fn test_denied_permission_is_a_no_op() {
        let host = Arc::new(RecordingHost::with_permission(NotificationPermission::Denied));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = ReminderScheduler::new(host.clone(), tx);

        let outcome = scheduler.schedule(reminder("t1", epoch_ms() + 1000)).await;

        assert_eq!(outcome, ScheduleOutcome::Denied);
        assert!(host.shown().is_empty());
        assert!(rx.try_recv().is_err());
        assert!(scheduler.timers().is_empty().await);
    }

    #[tokio::test]
    async fn test_default_permission_is_also_denied() {
        let host = Arc::new(RecordingHost::with_permission(NotificationPermission::Default));
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = ReminderScheduler::new(host.clone(), tx);

        let outcome = scheduler.schedule(reminder("t1", epoch_ms() + 1000)).await;

        assert_eq!(outcome, ScheduleOutcome::Denied);
        assert!(host.shown().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let mut host = RecordingHost::granted();
        host.supported = false;
        let host = Arc::new(host);
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = ReminderScheduler::new(host.clone(), tx);

        let outcome = scheduler.schedule(reminder("t1", epoch_ms() + 1000)).await;

        assert_eq!(outcome, ScheduleOutcome::Unsupported);
        assert!(host.shown().is_empty());
    }

    #[tokio::test]
    async fn test_past_target_shows_immediately() {
        let host = Arc::new(RecordingHost::granted());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = ReminderScheduler::new(host.clone(), tx);

        let outcome = scheduler.schedule(reminder("t1", epoch_ms().saturating_sub(500))).await;

        assert_eq!(outcome, ScheduleOutcome::ShownImmediately);
        assert_eq!(host.shown().len(), 1);
        // No timers armed, nothing relayed to the worker.
        assert!(scheduler.timers().is_empty().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_target_arms_both_paths() {
        let host = Arc::new(RecordingHost::granted());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = ReminderScheduler::new(host.clone(), tx);

        let outcome = scheduler.schedule(reminder("t9", epoch_ms() + 5000)).await;

        let ScheduleOutcome::Scheduled { delay_ms } = outcome else {
            panic!("expected Scheduled, got {outcome:?}");
        };
        assert!(delay_ms > 4000 && delay_ms <= 5000);
        assert!(scheduler.timers().contains("t9").await);

        // Relay message carries the full schedule request.
        let relayed: PageMessage = serde_json::from_value(rx.recv().await.unwrap()).unwrap();
        let PageMessage::ScheduleNotification { id, delay, .. } = relayed;
        assert_eq!(id, "t9");
        assert_eq!(delay, delay_ms);

        // Nothing before the delay elapses, one page-path display after.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(host.shown().is_empty());

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        assert_eq!(host.shown().len(), 1);
        assert!(scheduler.timers().is_empty().await);
    }
}
