use hashbrown::HashSet;

use crate::game::world::ClientId;
use crate::util::Vec2;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Gathering players
    Lobby,
    /// Game instance being built
    Starting,
    /// Game instance active
    Running,
    /// Game finished; members may remain
    Ended,
}

/// Member of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMember {
    pub client_id: ClientId,
    pub client_uid: String,
}

/// One isolated session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub session_uid: String,
    pub name: String,
    pub state: SessionState,
    pub mode_id: String,
    pub host: ClientId,
    /// Join order; the host is first
    pub members: Vec<SessionMember>,
    pub ready: HashSet<ClientId>,
    pub world_offset: Vec2,
}

impl SessionEntry {
    pub fn is_member(&self, client_id: ClientId) -> bool {
        self.members.iter().any(|m| m.client_id == client_id)
    }

    pub fn member_ids(&self) -> Vec<ClientId> {
        self.members.iter().map(|m| m.client_id).collect()
    }

    pub fn add_member(&mut self, client_id: ClientId, client_uid: String) -> bool {
        if self.is_member(client_id) {
            return false;
        }
        self.members.push(SessionMember { client_id, client_uid });
        true
    }

    pub fn remove_member(&mut self, client_id: ClientId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.client_id != client_id);
        self.ready.remove(&client_id);
        self.members.len() != before
    }

    pub fn ready_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| self.ready.contains(&m.client_id))
            .count()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_uid: self.session_uid.clone(),
            name: self.name.clone(),
            host: self.host,
            mode_id: self.mode_id.clone(),
            player_count: self.members.len(),
            ready_count: self.ready_count(),
            state: self.state,
            world_offset: self.world_offset,
        }
    }
}

/// Session information for listing
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_uid: String,
    pub name: String,
    pub host: ClientId,
    pub mode_id: String,
    pub player_count: usize,
    pub ready_count: usize,
    pub state: SessionState,
    pub world_offset: Vec2,
}
