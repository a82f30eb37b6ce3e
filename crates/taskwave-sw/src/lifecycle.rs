//! Install and activate: app-shell provisioning and cache-generation
//! convergence.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheStorage};
use crate::clients::Clients;
use crate::fetch::{FetchRequest, NetworkBackend};
use crate::{ServiceWorkerError, SwConfig};

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceWorkerState {
    /// Initial state.
    #[default]
    Parsed,
    /// Install event in flight.
    Installing,
    /// Installed; with skip-waiting semantics this is immediately
    /// activatable, no tab close required.
    Installed,
    /// Activate event in flight.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install failed; this worker never goes live.
    Redundant,
}

/// Provision the app shell for the current version.
///
/// All-or-nothing: every manifest asset is fetched before anything is
/// written, so one broken asset fails the install and leaves the shell
/// generation untouched. A partial shell is worse than no shell.
pub async fn install(
    config: &SwConfig,
    caches: &Arc<RwLock<CacheStorage>>,
    network: &Arc<dyn NetworkBackend>,
) -> Result<(), ServiceWorkerError> {
    let mut staged: Vec<(String, CacheEntry)> = Vec::with_capacity(config.app_shell.len());

    for path in &config.app_shell {
        let url = config.resolve(path)?;
        let response = network
            .fetch(FetchRequest::get(url.clone()))
            .await
            .map_err(|e| ServiceWorkerError::InstallFailed(format!("{path}: {e}")))?;
        if !response.is_storable() {
            return Err(ServiceWorkerError::InstallFailed(format!(
                "{path}: status {}",
                response.status
            )));
        }
        staged.push((url.to_string(), response.to_entry(url.as_str())));
    }

    let mut storage = caches.write().await;
    let shell = storage.open(&config.shell_cache_name());
    for (url, entry) in staged {
        shell.put(&url, entry);
    }
    // Open, but do not populate, the dynamic generation.
    storage.open(&config.dynamic_cache_name());

    info!(
        shell = %config.shell_cache_name(),
        assets = config.app_shell.len(),
        "app shell provisioned"
    );
    Ok(())
}

/// Whether a generation name belongs to a retired deployment.
///
/// Prefix match, not exact: legacy unversioned names from earlier
/// deployments must also converge. Names outside our role prefixes are
/// not ours to touch.
fn is_stale_generation(config: &SwConfig, name: &str) -> bool {
    let ours =
        name.starts_with(&config.shell_prefix) || name.starts_with(&config.dynamic_prefix);
    ours && name != config.shell_cache_name() && name != config.dynamic_cache_name()
}

/// Purge stale cache generations and claim every open client.
///
/// Returns the names of the generations that were deleted.
pub async fn activate(
    config: &SwConfig,
    caches: &Arc<RwLock<CacheStorage>>,
    clients: &Arc<RwLock<Clients>>,
) -> Vec<String> {
    let mut purged = Vec::new();
    {
        let mut storage = caches.write().await;
        let names: Vec<String> = storage.keys().iter().map(|s| s.to_string()).collect();
        for name in names {
            if is_stale_generation(config, &name) && storage.delete(&name) {
                debug!(cache = %name, "purged stale generation");
                purged.push(name);
            }
        }
    }

    clients.write().await.claim();
    info!(purged = purged.len(), version = config.version, "activated");
    purged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::Client;
    use crate::fetch::testing::ScriptedNetwork;
    use crate::fetch::FetchResponse;
    use crate::test_config;

    fn setup() -> (SwConfig, Arc<RwLock<CacheStorage>>, Arc<ScriptedNetwork>) {
        (
            test_config(),
            Arc::new(RwLock::new(CacheStorage::new())),
            Arc::new(ScriptedNetwork::new()),
        )
    }

    fn route_shell(config: &SwConfig, network: &ScriptedNetwork) {
        for path in &config.app_shell {
            let url = config.resolve(path).unwrap();
            network.route(url.as_str(), FetchResponse::ok(path.as_bytes().to_vec()));
        }
    }

    #[tokio::test]
    async fn test_install_provisions_shell_and_opens_dynamic() {
        let (config, caches, network) = setup();
        route_shell(&config, &network);
        let backend: Arc<dyn NetworkBackend> = network.clone();

        install(&config, &caches, &backend).await.unwrap();

        let storage = caches.read().await;
        let shell = storage.get(&config.shell_cache_name()).unwrap();
        assert_eq!(shell.len(), config.app_shell.len());
        let offline = config.resolve(&config.offline_page).unwrap();
        assert!(shell.match_request(offline.as_str()).is_some());

        let dynamic = storage.get(&config.dynamic_cache_name()).unwrap();
        assert!(dynamic.is_empty());
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let (config, caches, network) = setup();
        route_shell(&config, &network);
        // One asset 404s; the whole install must fail with nothing written.
        let icon = config.resolve("/icons/icon-512.png").unwrap();
        let mut gone = FetchResponse::ok(Vec::new());
        gone.status = 404;
        network.route(icon.as_str(), gone);
        let backend: Arc<dyn NetworkBackend> = network.clone();

        let result = install(&config, &caches, &backend).await;

        assert!(matches!(result, Err(ServiceWorkerError::InstallFailed(_))));
        assert!(caches.read().await.keys().is_empty());
    }

    #[tokio::test]
    async fn test_activate_converges_generations() {
        let (config, caches, _network) = setup();
        {
            let mut storage = caches.write().await;
            // Current generations plus leftovers from two older deployments,
            // one of them the legacy unversioned name.
            storage.open(&config.shell_cache_name());
            storage.open(&config.dynamic_cache_name());
            storage.open("taskwave-shell-v2");
            storage.open("taskwave-dynamic-v1");
            storage.open("taskwave-shell");
            storage.open("unrelated-cache");
        }
        let clients = Arc::new(RwLock::new(Clients::new()));

        let mut purged = activate(&config, &caches, &clients).await;
        purged.sort();

        assert_eq!(
            purged,
            vec!["taskwave-dynamic-v1", "taskwave-shell", "taskwave-shell-v2"]
        );
        let storage = caches.read().await;
        let mut remaining = storage.keys();
        remaining.sort_unstable();
        assert_eq!(
            remaining,
            vec!["taskwave-dynamic-v3", "taskwave-shell-v3", "unrelated-cache"]
        );
    }

    #[tokio::test]
    async fn test_activate_claims_clients() {
        let (config, caches, _network) = setup();
        let clients = Arc::new(RwLock::new(Clients::new()));
        let id = clients.write().await.add(Client::window("/board"));

        activate(&config, &caches, &clients).await;

        assert!(clients.read().await.get(&id).unwrap().controlled);
    }

    #[test]
    fn test_stale_predicate() {
        let config = test_config();
        assert!(is_stale_generation(&config, "taskwave-shell-v1"));
        assert!(is_stale_generation(&config, "taskwave-shell"));
        assert!(is_stale_generation(&config, "taskwave-dynamic-v2"));
        assert!(!is_stale_generation(&config, "taskwave-shell-v3"));
        assert!(!is_stale_generation(&config, "taskwave-dynamic-v3"));
        assert!(!is_stale_generation(&config, "someone-elses-cache"));
    }
}
