//! Notification display types and the worker-side timer path.
//!
//! The worker never persists timers: a scheduled reminder survives page
//! reloads (the worker outlives the page) but not worker termination.

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::messages::WorkerReply;

/// Icon attached to scheduled and push notifications.
pub const ICON_PATH: &str = "/icons/icon-192.png";

/// Badge attached to scheduled and push notifications.
pub const BADGE_PATH: &str = "/icons/icon-192.png";

/// On/off/on vibration, in milliseconds.
pub const VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];

/// Process-wide notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    Default,
    Granted,
    Denied,
}

/// A notification action button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Display options for a notification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vibrate: Vec<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,

    /// Opaque correlation data carried through to click handling.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl NotificationOptions {
    /// Standard options for a reminder body and correlation payload.
    pub fn reminder(body: &str, data: serde_json::Value) -> Self {
        Self {
            body: Some(body.to_string()),
            icon: Some(ICON_PATH.to_string()),
            badge: Some(BADGE_PATH.to_string()),
            vibrate: VIBRATE_PATTERN.to_vec(),
            actions: Vec::new(),
            data,
        }
    }
}

// ==================== Host ====================

/// The platform's notification display surface.
pub trait NotificationHost: Send + Sync {
    /// Whether the platform supports notifications at all.
    fn supported(&self) -> bool {
        true
    }

    /// Current permission state.
    fn permission(&self) -> NotificationPermission;

    /// Display a notification. Callers gate on [`Self::permission`] first.
    fn show(&self, title: &str, options: &NotificationOptions);
}

// ==================== Worker timers ====================

/// In-flight reminder timers for one context, keyed by correlation id.
#[derive(Clone, Default)]
pub struct NotificationTimers {
    inner: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
}

impl NotificationTimers {
    /// Create an empty timer map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a timer handle under its correlation id.
    pub async fn insert(&self, id: &str, handle: JoinHandle<()>) {
        self.inner.write().await.insert(id.to_string(), handle);
    }

    /// Drop tracking for a fired or torn-down timer.
    pub async fn remove(&self, id: &str) {
        self.inner.write().await.remove(id);
    }

    /// Number of armed timers.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether no timers are armed.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Whether a timer is armed for this correlation id.
    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }
}

fn send_reply(reply: &mpsc::UnboundedSender<serde_json::Value>, message: WorkerReply) {
    match serde_json::to_value(&message) {
        // The page may be gone; a dead port is not an error.
        Ok(value) => {
            let _ = reply.send(value);
        }
        Err(e) => warn!(error = %e, "failed to encode worker reply"),
    }
}

/// Arm the worker-context timer for a relayed schedule request.
///
/// Acks `NOTIFICATION_SCHEDULED` immediately; on fire, displays and acks
/// `NOTIFICATION_SHOWN` if the page port is still reachable.
pub async fn schedule_worker_timer(
    host: Arc<dyn NotificationHost>,
    timers: NotificationTimers,
    reply: mpsc::UnboundedSender<serde_json::Value>,
    id: String,
    title: String,
    options: NotificationOptions,
    delay_ms: u64,
) {
    send_reply(&reply, WorkerReply::NotificationScheduled { id: id.clone() });
    debug!(id = %id, delay_ms, "worker timer armed");

    let task_timers = timers.clone();
    let task_id = id.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if host.permission() == NotificationPermission::Granted {
            host.show(&title, &options);
            debug!(id = %task_id, "worker timer fired");
            send_reply(&reply, WorkerReply::NotificationShown { id: task_id.clone() });
        } else {
            warn!(id = %task_id, "permission not granted at fire time; display skipped");
        }
        task_timers.remove(&task_id).await;
    });

    timers.insert(&id, handle).await;
}

// ==================== Test host ====================
