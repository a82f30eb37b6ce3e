//! Push payload decoding and notification-click routing.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::clients::Clients;
use crate::notify::{
    NotificationAction, NotificationHost, NotificationOptions, NotificationPermission,
    BADGE_PATH, ICON_PATH, VIBRATE_PATTERN,
};

/// Title substituted when a push payload carries none.
pub const DEFAULT_PUSH_TITLE: &str = "แจ้งเตือนจาก Taskwave";

/// Body substituted when a push payload carries none.
pub const DEFAULT_PUSH_BODY: &str = "มีรายการที่ต้องดำเนินการ";

/// Click target substituted when a push payload carries none.
pub const DEFAULT_PUSH_URL: &str = "/";

/// Action id that routes to the target URL.
pub const ACTION_VIEW: &str = "view";

/// Action id that dismisses with no further effect.
pub const ACTION_CLOSE: &str = "close";

/// Inbound push payload; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub todo_id: Option<String>,
}

/// Decode a push event payload and display it.
///
/// Malformed payloads are logged and swallowed; a push must never crash
/// the worker.
pub fn handle_push(host: &dyn NotificationHost, payload: &[u8]) {
    let payload: PushPayload = match serde_json::from_slice(payload) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "malformed push payload");
            return;
        }
    };

    if host.permission() != NotificationPermission::Granted {
        warn!("push received without notification permission");
        return;
    }

    let title = payload.title.as_deref().unwrap_or(DEFAULT_PUSH_TITLE);
    let body = payload.body.as_deref().unwrap_or(DEFAULT_PUSH_BODY);
    let url = payload.url.as_deref().unwrap_or(DEFAULT_PUSH_URL);

    let options = NotificationOptions {
        body: Some(body.to_string()),
        icon: Some(ICON_PATH.to_string()),
        badge: Some(BADGE_PATH.to_string()),
        vibrate: VIBRATE_PATTERN.to_vec(),
        actions: vec![
            NotificationAction {
                action: ACTION_VIEW.to_string(),
                title: "ดูรายการ".to_string(),
            },
            NotificationAction {
                action: ACTION_CLOSE.to_string(),
                title: "ปิด".to_string(),
            },
        ],
        data: json!({ "url": url, "todoId": payload.todo_id }),
    };

    debug!(title, url, "displaying push notification");
    host.show(title, &options);
}

/// Where a notification click ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The close action; nothing else happens.
    Dismissed,
    /// Focused an existing window client.
    Focused(String),
    /// No window matched; opened a new one.
    Opened(String),
}

/// Route a notification click.
///
/// Any interaction other than the close action focuses the first window
/// whose URL equals the notification's target exactly, or opens a new
/// window there. Exact string match only, no normalization.
pub fn handle_notification_click(
    clients: &mut Clients,
    action: &str,
    data: &serde_json::Value,
) -> ClickOutcome {
    if action == ACTION_CLOSE {
        return ClickOutcome::Dismissed;
    }

    let target = data
        .get("url")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(DEFAULT_PUSH_URL);

    let matched = clients
        .windows()
        .iter()
        .find(|c| c.url == target)
        .map(|c| c.id.clone());

    match matched {
        Some(id) => {
            clients.focus(&id);
            debug!(client = %id, url = %target, "focused existing window");
            ClickOutcome::Focused(id)
        }
        None => {
            let client = clients.open_window(target);
            debug!(client = %client.id, url = %target, "opened new window");
            ClickOutcome::Opened(client.id)
        }
    }
}
