//! Taskwave worker smoke harness.
//!
//! Exercises the full worker lifecycle against a scripted in-memory
//! network: install with stale generations left behind by an older
//! deployment, activation convergence, warm and offline fetches, a
//! notification schedule round-trip over the message port, and push with
//! click routing. Logs a summary at the end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::info;
use url::Url;

use taskwave_common::{epoch_ms, init_logging, LogConfig};
use taskwave_sw::{
    Client, EventOutcome, FetchRequest, FetchResponse, NetworkBackend, NotificationHost,
    NotificationOptions, NotificationPermission, ReminderRequest, ReminderScheduler,
    ServiceWorkerError, ServiceWorkerGlobal, SwConfig, WorkerEvent,
};

/// Scripted network: fixed routes, flippable offline switch.
struct StaticNetwork {
    routes: Mutex<HashMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl StaticNetwork {
    fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    fn route(&self, url: &Url, body: &str) {
        self.routes
            .lock()
            .expect("route table poisoned")
            .insert(url.to_string(), body.as_bytes().to_vec());
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl NetworkBackend for StaticNetwork {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> BoxFuture<'static, Result<FetchResponse, ServiceWorkerError>> {
        let result = if self.offline.load(Ordering::SeqCst) {
            Err(ServiceWorkerError::NetworkError("offline".to_string()))
        } else {
            self.routes
                .lock()
                .expect("route table poisoned")
                .get(request.url.as_str())
                .map(|body| FetchResponse::ok(body.clone()))
                .ok_or_else(|| ServiceWorkerError::NotFound(request.url.to_string()))
        };
        Box::pin(async move { result })
    }
}

/// Notification host that logs displays instead of rendering them.
struct ConsoleHost;

impl NotificationHost for ConsoleHost {
    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Granted
    }

    fn show(&self, title: &str, options: &NotificationOptions) {
        info!(title, body = ?options.body, data = %options.data, "notification displayed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogConfig::default().with_filter("sw_harness=info,taskwave_sw=debug"));

    let scope = Url::parse("https://taskwave.local/")?;
    let config = SwConfig::for_scope(scope, 3);

    let network = Arc::new(StaticNetwork::new());
    for path in &config.app_shell {
        network.route(&config.resolve(path)?, &format!("<asset {path}>"));
    }
    let board = config.resolve("/board")?;
    network.route(&board, "<html>board</html>");

    let host = Arc::new(ConsoleHost);
    let global = Arc::new(ServiceWorkerGlobal::new(
        config.clone(),
        network.clone(),
        host.clone(),
    ));

    // Leftovers from an older deployment, including a legacy unversioned
    // generation; activation must purge them.
    {
        let caches = global.caches();
        let mut storage = caches.write().await;
        storage.open("taskwave-shell-v2");
        storage.open("taskwave-dynamic");
    }

    global.dispatch(WorkerEvent::Install).await?;
    info!(state = ?global.state().await, "install complete");

    let outcome = global.dispatch(WorkerEvent::Activate).await?;
    if let EventOutcome::Activated { purged } = outcome {
        info!(?purged, "activation converged cache generations");
    }

    // Cold fetch hits the network and populates the dynamic generation.
    let decision = global
        .dispatch(WorkerEvent::Fetch(FetchRequest::get(board.clone())))
        .await?;
    if let EventOutcome::Fetch(decision) = decision {
        let response = decision.response().ok_or("expected a response")?;
        info!(from_cache = response.from_cache, "cold fetch served");
    }

    // Warm fetch is served from cache while the network leg revalidates.
    network.route(&board, "<html>board v2</html>");
    let decision = global
        .dispatch(WorkerEvent::Fetch(FetchRequest::get(board.clone())))
        .await?;
    if let EventOutcome::Fetch(taskwave_sw::FetchDecision::Respond {
        response,
        revalidation,
    }) = decision
    {
        info!(from_cache = response.from_cache, "warm fetch served");
        if let Some(handle) = revalidation {
            handle.await?;
            info!("background revalidation settled");
        }
    }

    // Offline: document navigations degrade to the offline page, assets
    // to a synthetic 408, API traffic bypasses entirely.
    network.set_offline(true);
    let nav = FetchRequest::get(config.resolve("/week")?).header("accept", "text/html");
    if let EventOutcome::Fetch(decision) = global.dispatch(WorkerEvent::Fetch(nav)).await? {
        let response = decision.response().ok_or("expected a response")?;
        info!(status = response.status, "offline navigation served fallback");
    }
    let asset = FetchRequest::get(config.resolve("/missing.js")?);
    if let EventOutcome::Fetch(decision) = global.dispatch(WorkerEvent::Fetch(asset)).await? {
        let response = decision.response().ok_or("expected a response")?;
        info!(status = response.status, "offline asset got synthetic error");
    }
    let api = FetchRequest::with_method("POST", config.resolve("/api/todos")?);
    if let EventOutcome::Fetch(decision) = global.dispatch(WorkerEvent::Fetch(api)).await? {
        info!(bypassed = decision.response().is_none(), "api request bypassed");
    }
    network.set_offline(false);

    // Notification round-trip: the page schedules, the worker acks twice.
    let (page_tx, mut page_rx) = mpsc::unbounded_channel();
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
    let pump = {
        let global = global.clone();
        tokio::spawn(async move {
            while let Some(data) = page_rx.recv().await {
                let _ = global
                    .dispatch(WorkerEvent::Message {
                        data,
                        reply: ack_tx.clone(),
                    })
                    .await;
            }
        })
    };

    let scheduler = ReminderScheduler::new(host.clone(), page_tx);
    let outcome = scheduler
        .schedule(ReminderRequest {
            id: "todo-1".to_string(),
            title: "Submit report".to_string(),
            body: "Due in a moment".to_string(),
            target_time_ms: epoch_ms() + 700,
            payload: serde_json::json!({"todoId": "todo-1", "url": "/board"}),
        })
        .await;
    info!(?outcome, "reminder scheduled");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let mut acks = Vec::new();
    while let Ok(ack) = ack_rx.try_recv() {
        acks.push(ack["type"].as_str().unwrap_or("?").to_string());
    }
    info!(?acks, "worker acks received");
    pump.abort();

    // Push display and click routing.
    {
        let clients = global.clients();
        let mut clients = clients.write().await;
        clients.add(Client::window("/board"));
        clients.add(Client::window("/stats"));
    }
    global
        .dispatch(WorkerEvent::Push(
            br#"{"title":"Due soon","body":"1 task overdue","url":"/board","todoId":"todo-9"}"#
                .to_vec(),
        ))
        .await?;
    let click = global
        .dispatch(WorkerEvent::NotificationClick {
            action: "view".to_string(),
            data: serde_json::json!({"url": "/board"}),
        })
        .await?;
    if let EventOutcome::Click(outcome) = click {
        info!(?outcome, "notification click routed");
    }

    info!("smoke run complete");
    Ok(())
}
