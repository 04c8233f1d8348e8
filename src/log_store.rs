use crate::types::{LogEntry, LogRecord};
use log::{debug, warn};
use std::collections::VecDeque;

/// Ordered log buffer, most recent first, scoped to an optional client.
///
/// No size bound is applied here; retention is the server's concern.
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    scope: Option<String>,
    next_id: u64,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            scope: None,
            next_id: 1,
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Changes the client scope and empties the buffer.
    pub fn set_scope(&mut self, scope: Option<String>) {
        self.scope = scope;
        self.entries.clear();
    }

    pub fn in_scope(&self, client_id: &str) -> bool {
        self.scope.as_deref().map_or(true, |scope| scope == client_id)
    }

    /// Prepends a live record. Returns the new entry's id, or `None` when the
    /// record belongs to a client outside the current scope.
    pub fn append(&mut self, record: LogRecord, client_id: String) -> Option<u64> {
        if !self.in_scope(&client_id) {
            debug!("Dropping log from {} outside scope", client_id);
            return None;
        }

        let id = self.allocate_id();
        self.entries.push_front(LogEntry {
            id,
            client_id,
            record,
        });
        Some(id)
    }

    /// Replaces the buffer with server history delivered oldest first.
    ///
    /// Records are reversed so the newest is at the front and ids are handed
    /// out in that order. Records without a client id take `fallback_client`.
    pub fn replace(&mut self, history: Vec<LogRecord>, fallback_client: Option<&str>) {
        let mut entries = VecDeque::with_capacity(history.len());

        for mut record in history.into_iter().rev() {
            let client_id = record
                .client_id
                .take()
                .or_else(|| fallback_client.map(str::to_string))
                .or_else(|| self.scope.clone())
                .unwrap_or_default();

            if !self.in_scope(&client_id) {
                warn!("Discarding history record from {} outside scope", client_id);
                continue;
            }

            let id = self.allocate_id();
            entries.push_back(LogEntry {
                id,
                client_id,
                record,
            });
        }

        self.entries = entries;
    }

    /// Empties the buffer without touching the scope.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Known client ids in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct ClientRoster {
    clients: Vec<String>,
}

impl ClientRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the roster with the server's authoritative list.
    pub fn replace(&mut self, clients: Vec<String>) {
        let mut unique: Vec<String> = Vec::with_capacity(clients.len());
        for client in clients {
            if !unique.contains(&client) {
                unique.push(client);
            }
        }
        self.clients = unique;
    }

    /// Adds a client if it is new. Returns `true` when the roster changed.
    pub fn observe(&mut self, client_id: &str) -> bool {
        if self.contains(client_id) {
            return false;
        }
        self.clients.push(client_id.to_string());
        true
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.iter().any(|c| c == client_id)
    }

    pub fn clients(&self) -> &[String] {
        &self.clients
    }
}
