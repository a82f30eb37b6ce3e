//! Page ⇄ worker message protocol.
//!
//! Messages travel as JSON values (the structured-clone analogue); these
//! enums give them shape. Unknown inbound types fail to decode and are
//! logged and dropped by the dispatcher, never surfaced as errors.

use serde::{Deserialize, Serialize};

use crate::notify::NotificationOptions;

/// Messages the page posts to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    /// Ask the worker to arm its own timer for a reminder.
    #[serde(rename = "SCHEDULE_NOTIFICATION")]
    ScheduleNotification {
        /// Correlation id matching acks to this request.
        id: String,
        title: String,
        options: NotificationOptions,
        /// Delay until display, in milliseconds.
        delay: u64,
    },
}

/// Messages the worker posts back to the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerReply {
    /// Receipt, sent synchronously when the schedule request arrives.
    #[serde(rename = "NOTIFICATION_SCHEDULED")]
    NotificationScheduled { id: String },

    /// Sent after the worker timer fired and the notification was shown.
    #[serde(rename = "NOTIFICATION_SHOWN")]
    NotificationShown { id: String },
}
