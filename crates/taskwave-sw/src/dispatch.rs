//! Event dispatch for the worker context.
//!
//! The platform delivers lifecycle and runtime events through ambient
//! listener registration; here that is an explicit tagged union routed by
//! [`ServiceWorkerGlobal::dispatch`], so the state machine is visible and
//! handlers receive their dependencies instead of reaching for globals.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::fetch::{self, FetchDecision, FetchRequest, NetworkBackend};
use crate::lifecycle::{self, ServiceWorkerState};
use crate::messages::PageMessage;
use crate::notify::{self, NotificationHost, NotificationTimers};
use crate::push::{self, ClickOutcome};
use crate::{ServiceWorkerError, SwConfig};

/// An inbound worker event.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Worker install lifecycle event.
    Install,
    /// Worker activate lifecycle event.
    Activate,
    /// An intercepted network request.
    Fetch(FetchRequest),
    /// A push event with its raw payload.
    Push(Vec<u8>),
    /// A message posted from a page, with the port for replies.
    Message {
        data: serde_json::Value,
        reply: mpsc::UnboundedSender<serde_json::Value>,
    },
    /// A notification click.
    NotificationClick {
        action: String,
        data: serde_json::Value,
    },
    /// Background sync wake-up.
    Sync { tag: String },
}

/// What dispatching an event produced.
#[derive(Debug)]
pub enum EventOutcome {
    Installed,
    Activated { purged: Vec<String> },
    Fetch(FetchDecision),
    PushHandled,
    MessageHandled,
    Click(ClickOutcome),
    /// Sync acknowledged but deferred; no durable queue backs it.
    SyncDeferred,
}

/// The worker global scope: configuration plus every shared resource a
/// handler needs.
pub struct ServiceWorkerGlobal {
    config: SwConfig,
    state: RwLock<ServiceWorkerState>,
    caches: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<Clients>>,
    network: Arc<dyn NetworkBackend>,
    notifications: Arc<dyn NotificationHost>,
    timers: NotificationTimers,
}

impl ServiceWorkerGlobal {
    /// Create a worker global for the given deployment.
    pub fn new(
        config: SwConfig,
        network: Arc<dyn NetworkBackend>,
        notifications: Arc<dyn NotificationHost>,
    ) -> Self {
        Self {
            config,
            state: RwLock::new(ServiceWorkerState::Parsed),
            caches: Arc::new(RwLock::new(CacheStorage::new())),
            clients: Arc::new(RwLock::new(Clients::new())),
            network,
            notifications,
            timers: NotificationTimers::new(),
        }
    }

    /// Worker configuration.
    pub fn config(&self) -> &SwConfig {
        &self.config
    }

    /// Cache storage shared with handlers.
    pub fn caches(&self) -> Arc<RwLock<CacheStorage>> {
        self.caches.clone()
    }

    /// Open clients registry.
    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        self.clients.clone()
    }

    /// Worker-context timers.
    pub fn timers(&self) -> &NotificationTimers {
        &self.timers
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServiceWorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ServiceWorkerState) {
        *self.state.write().await = state;
    }

    /// Route one event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, ServiceWorkerError> {
        match event {
            WorkerEvent::Install => self.on_install().await,
            WorkerEvent::Activate => self.on_activate().await,
            WorkerEvent::Fetch(request) => {
                let decision = fetch::handle_fetch(
                    &self.config,
                    self.caches.clone(),
                    self.network.clone(),
                    request,
                )
                .await;
                Ok(EventOutcome::Fetch(decision))
            }
            WorkerEvent::Push(payload) => {
                push::handle_push(self.notifications.as_ref(), &payload);
                Ok(EventOutcome::PushHandled)
            }
            WorkerEvent::Message { data, reply } => self.on_message(data, reply).await,
            WorkerEvent::NotificationClick { action, data } => {
                let mut clients = self.clients.write().await;
                let outcome = push::handle_notification_click(&mut clients, &action, &data);
                Ok(EventOutcome::Click(outcome))
            }
            WorkerEvent::Sync { tag } => {
                debug!(tag = %tag, "sync event deferred; no durable queue");
                Ok(EventOutcome::SyncDeferred)
            }
        }
    }

    async fn on_install(&self) -> Result<EventOutcome, ServiceWorkerError> {
        self.set_state(ServiceWorkerState::Installing).await;
        match lifecycle::install(&self.config, &self.caches, &self.network).await {
            Ok(()) => {
                // Skip waiting: installed means immediately activatable.
                self.set_state(ServiceWorkerState::Installed).await;
                Ok(EventOutcome::Installed)
            }
            Err(e) => {
                self.set_state(ServiceWorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    async fn on_activate(&self) -> Result<EventOutcome, ServiceWorkerError> {
        if self.state().await != ServiceWorkerState::Installed {
            return Err(ServiceWorkerError::StateError(
                "activate before successful install".to_string(),
            ));
        }
        self.set_state(ServiceWorkerState::Activating).await;
        let purged = lifecycle::activate(&self.config, &self.caches, &self.clients).await;
        self.set_state(ServiceWorkerState::Activated).await;
        Ok(EventOutcome::Activated { purged })
    }

    async fn on_message(
        &self,
        data: serde_json::Value,
        reply: mpsc::UnboundedSender<serde_json::Value>,
    ) -> Result<EventOutcome, ServiceWorkerError> {
        match serde_json::from_value::<PageMessage>(data) {
            Ok(PageMessage::ScheduleNotification {
                id,
                title,
                options,
                delay,
            }) => {
                notify::schedule_worker_timer(
                    self.notifications.clone(),
                    self.timers.clone(),
                    reply,
                    id,
                    title,
                    options,
                    delay,
                )
                .await;
            }
            Err(e) => {
                // Forward compatibility: unknown message types are noise,
                // not errors.
                debug!(error = %e, "ignoring unrecognized page message");
            }
        }
        Ok(EventOutcome::MessageHandled)
    }
}
