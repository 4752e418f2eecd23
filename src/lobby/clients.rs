use hashbrown::HashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::game::constants::session::MAX_NAME_LEN;
use crate::game::world::ClientId;

/// Identity of a connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub client_id: ClientId,
    /// Stable UID, issued once per registration
    pub client_uid: String,
    pub display_name: String,
}

/// Maps transport client ids to stable UIDs and display names
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientRecord>>,
}

/// Trimmed, capped display name, or `Player {id}` when blank
pub fn sanitize_display_name(client_id: ClientId, name: Option<&str>) -> String {
    let trimmed = name.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        format!("Player {}", client_id)
    } else {
        trimmed.chars().take(MAX_NAME_LEN).collect()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client_id`, or refresh its name if already registered.
    /// Returns the client's UID; an existing UID is kept.
    pub fn register(&self, client_id: ClientId, display_name: Option<&str>) -> String {
        let mut clients = self.clients.write();
        let record = clients.entry(client_id).or_insert_with(|| ClientRecord {
            client_id,
            client_uid: Uuid::new_v4().simple().to_string(),
            display_name: sanitize_display_name(client_id, None),
        });
        if display_name.is_some() {
            record.display_name = sanitize_display_name(client_id, display_name);
        }
        record.client_uid.clone()
    }

    pub fn unregister(&self, client_id: ClientId) -> Option<ClientRecord> {
        self.clients.write().remove(&client_id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<ClientRecord> {
        self.clients.read().get(&client_id).cloned()
    }

    /// Registered name, or the fallback name for unknown clients
    pub fn display_name(&self, client_id: ClientId) -> String {
        self.clients
            .read()
            .get(&client_id)
            .map(|r| r.display_name.clone())
            .unwrap_or_else(|| sanitize_display_name(client_id, None))
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
