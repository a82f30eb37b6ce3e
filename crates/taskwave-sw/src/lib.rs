//! # Taskwave Service Worker Core
//!
//! Offline caching and notification scheduling for the Taskwave task
//! manager. The surrounding application is plain CRUD over local storage;
//! this crate is the background worker that sits between it and the
//! network.
//!
//! ## Features
//!
//! - **App-shell provisioning**: atomic install of the offline bootstrap set
//! - **Cache generations**: versioned stores, stale generations purged on activate
//! - **Fetch interception**: stale-while-revalidate with offline fallback
//! - **Dynamic cache trimming**: FIFO eviction under a fixed entry ceiling
//! - **Notification scheduling**: dual page/worker timers with message acks
//! - **Push routing**: payload decode, display, and click-to-client focus
//!
//! ## Architecture
//!
//! ```text
//! Page context                         Worker context
//!     │                                    │
//!     ├── ReminderScheduler ── message ──→ ServiceWorkerGlobal
//!     │       └── local timer             ├── CacheStorage
//!     │                                   │     ├── taskwave-shell-vN
//!     ◄──────── acks (mpsc) ──────────────┤     └── taskwave-dynamic-vN
//!                                         ├── Clients
//!     page fetch ──→ dispatch(Fetch) ────→├── NetworkBackend
//!                                         └── NotificationHost
//! ```
//!
//! Each context is a single-threaded event loop; they share nothing and
//! communicate only over channels.

use thiserror::Error;
use url::Url;

pub mod cache;
pub mod clients;
pub mod dispatch;
pub mod fetch;
pub mod lifecycle;
pub mod messages;
pub mod notify;
pub mod page;
pub mod push;

pub use cache::{Cache, CacheEntry, CacheStorage, ResponseKind};
pub use clients::{Client, ClientKind, Clients};
pub use dispatch::{EventOutcome, ServiceWorkerGlobal, WorkerEvent};
pub use fetch::{FetchDecision, FetchRequest, FetchResponse, NetworkBackend};
pub use lifecycle::ServiceWorkerState;
pub use messages::{PageMessage, WorkerReply};
pub use notify::{
    NotificationAction, NotificationHost, NotificationOptions, NotificationPermission,
    NotificationTimers,
};
pub use page::{ReminderRequest, ReminderScheduler, ScheduleOutcome};
pub use push::{ClickOutcome, PushPayload};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

// ==================== Configuration ====================

/// Worker configuration.
///
/// The platform imposes singleton-worker semantics; rather than ambient
/// globals, every handler receives this struct through
/// [`ServiceWorkerGlobal`].
#[derive(Debug, Clone)]
pub struct SwConfig {
    /// Scope the worker controls; app-shell paths resolve against it.
    pub scope: Url,
    /// Running version; bumping it retires every older cache generation.
    pub version: u32,
    /// Name prefix of the app-shell generation.
    pub shell_prefix: String,
    /// Name prefix of the dynamic generation.
    pub dynamic_prefix: String,
    /// Paths provisioned at install time (the offline bootstrap set).
    pub app_shell: Vec<String>,
    /// Fallback page served for failed document navigations.
    pub offline_page: String,
    /// Requests whose path contains this segment are never cached.
    pub api_segment: String,
    /// Entry ceiling for the dynamic generation.
    pub dynamic_max_entries: usize,
}

impl SwConfig {
    /// Configuration for a deployment rooted at `scope`.
    pub fn for_scope(scope: Url, version: u32) -> Self {
        Self {
            scope,
            version,
            shell_prefix: "taskwave-shell".to_string(),
            dynamic_prefix: "taskwave-dynamic".to_string(),
            app_shell: vec![
                "/".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192.png".to_string(),
                "/icons/icon-512.png".to_string(),
                "/offline.html".to_string(),
            ],
            offline_page: "/offline.html".to_string(),
            api_segment: "/api/".to_string(),
            dynamic_max_entries: 50,
        }
    }

    /// Name of the current app-shell cache generation.
    pub fn shell_cache_name(&self) -> String {
        format!("{}-v{}", self.shell_prefix, self.version)
    }

    /// Name of the current dynamic cache generation.
    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-v{}", self.dynamic_prefix, self.version)
    }

    /// Resolve an app-relative path against the worker scope.
    pub fn resolve(&self, path: &str) -> Result<Url, ServiceWorkerError> {
        self.scope
            .join(path)
            .map_err(|e| ServiceWorkerError::InstallFailed(format!("bad path {path}: {e}")))
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> SwConfig {
    SwConfig::for_scope(Url::parse("https://taskwave.local/").unwrap(), 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_generation_names() {
        let config = test_config();
        assert_eq!(config.shell_cache_name(), "taskwave-shell-v3");
        assert_eq!(config.dynamic_cache_name(), "taskwave-dynamic-v3");
    }

    #[test]
    fn test_resolve_against_scope() {
        let config = test_config();
        let url = config.resolve("/offline.html").unwrap();
        assert_eq!(url.as_str(), "https://taskwave.local/offline.html");
    }

    #[test]
    fn test_app_shell_includes_offline_page() {
        let config = test_config();
        assert!(config.app_shell.contains(&config.offline_page));
        assert_eq!(config.dynamic_max_entries, 50);
    }
}
