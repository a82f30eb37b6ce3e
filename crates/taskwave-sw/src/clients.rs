//! Controlled page registry.
//!
//! Client URLs stay plain strings: notification-click routing is an
//! exact-string match over app-relative paths, with no normalization.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Window,
    Worker,
}

/// A client (controlled page).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL, as the page reports it.
    pub url: String,

    /// Client type.
    pub kind: ClientKind,

    /// Whether focused.
    pub focused: bool,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

impl Client {
    fn next_id() -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a window client at the given URL.
    pub fn window(url: &str) -> Self {
        Self {
            id: Self::next_id(),
            url: url.to_string(),
            kind: ClientKind::Window,
            focused: false,
            controlled: false,
        }
    }
}

/// All open clients, in the order they appeared.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
    order: Vec<String>,
}

impl Clients {
    /// Create a new clients registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) -> String {
        let id = client.id.clone();
        if self.clients.insert(id.clone(), client).is_none() {
            self.order.push(id.clone());
        }
        id
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        let removed = self.clients.remove(id);
        if removed.is_some() {
            self.order.retain(|i| i != id);
        }
        removed
    }

    /// Window clients, oldest first.
    pub fn windows(&self) -> Vec<&Client> {
        self.order
            .iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|c| c.kind == ClientKind::Window)
            .collect()
    }

    /// Focus a client by ID. Returns false for unknown or non-window clients.
    pub fn focus(&mut self, id: &str) -> bool {
        match self.clients.get_mut(id) {
            Some(client) if client.kind == ClientKind::Window => {
                client.focused = true;
                true
            }
            _ => false,
        }
    }

    /// Open a new focused window at the given URL.
    pub fn open_window(&mut self, url: &str) -> Client {
        let mut client = Client::window(url);
        client.focused = true;
        client.controlled = true;
        let id = self.add(client);
        // Present by construction.
        self.clients[&id].clone()
    }

    /// Take control of every open client, so the new worker logic governs
    /// in-flight requests without a page reload.
    pub fn claim(&mut self) {
        for client in self.clients.values_mut() {
            client.controlled = true;
        }
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are open.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_in_arrival_order() {
        let mut clients = Clients::new();
        let a = clients.add(Client::window("/a"));
        let b = clients.add(Client::window("/b"));

        let windows = clients.windows();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].id, a);
        assert_eq!(windows[1].id, b);
    }

    #[test]
    fn test_focus_window() {
        let mut clients = Clients::new();
        let id = clients.add(Client::window("/a"));

        assert!(clients.focus(&id));
        assert!(clients.get(&id).unwrap().focused);
        assert!(!clients.focus("client-nope"));
    }

    #[test]
    fn test_open_window_is_focused_and_controlled() {
        let mut clients = Clients::new();
        let client = clients.open_window("/c");

        assert!(client.focused);
        assert!(client.controlled);
        assert_eq!(client.url, "/c");
        assert_eq!(clients.len(), 1);
    }

    #[test]
    fn test_claim_controls_everything() {
        let mut clients = Clients::new();
        let a = clients.add(Client::window("/a"));
        let b = clients.add(Client::window("/b"));
        assert!(!clients.get(&a).unwrap().controlled);

        clients.claim();
        assert!(clients.get(&a).unwrap().controlled);
        assert!(clients.get(&b).unwrap().controlled);
    }

    #[test]
    fn test_remove() {
        let mut clients = Clients::new();
        let id = clients.add(Client::window("/a"));
        assert!(clients.remove(&id).is_some());
        assert!(clients.is_empty());
    }
}
