//! Session registry
//!
//! Tracks isolated sessions, their members and lifecycle, and hands game
//! creation, late joins and leaves to the instance scheduler. The session
//! map lock only covers membership bookkeeping; scheduler calls happen after
//! it is released.

use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::constants::session::DEFAULT_MODE;
use crate::game::instance::PlayerSeat;
use crate::game::modes::ModeRegistry;
use crate::game::scheduler::{GameRequest, InstanceScheduler};
use crate::game::world::ClientId;
use crate::lobby::clients::ClientRegistry;
use crate::lobby::session::{SessionEntry, SessionMember, SessionState, SessionSummary};
use crate::lobby::validation::{GameStartFailure, GameStartFailureReason};
use crate::metrics::Metrics;
use crate::util::Vec2;

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created { session_name: String, session_uid: String },
    Destroyed { session_name: String, session_uid: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session name cannot be empty")]
    EmptyName,
    #[error("Session '{0}' already exists")]
    NameTaken(String),
    #[error("Too many sessions")]
    TooManySessions,
    #[error("Session not found")]
    NotFound,
    #[error("Already in another session")]
    AlreadyInSession,
    #[error("Session is full")]
    SessionFull,
    #[error("Session is starting")]
    SessionStarting,
    #[error("Not a member of this session")]
    NotMember,
    #[error("Only the session host can do that")]
    NotHost,
    #[error("Unknown game mode '{0}'")]
    UnknownMode(String),
    #[error("Game already started")]
    GameInProgress,
}

#[derive(Default)]
struct RegistryInner {
    /// Keyed by session UID
    sessions: HashMap<String, SessionEntry>,
    /// Lowercased name to UID
    names: HashMap<String, String>,
    /// Client to the UID of the session it belongs to
    memberships: HashMap<ClientId, String>,
    next_index: u32,
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl RegistryInner {
    fn uid_for_name(&self, name: &str) -> Option<String> {
        self.names.get(&name_key(name)).cloned()
    }

    fn entry_by_name(&self, name: &str) -> Option<&SessionEntry> {
        self.uid_for_name(name).and_then(|uid| self.sessions.get(&uid))
    }

    fn entry_by_name_mut(&mut self, name: &str) -> Option<&mut SessionEntry> {
        let uid = self.uid_for_name(name)?;
        self.sessions.get_mut(&uid)
    }

    /// Drop a session and every index entry pointing at it
    fn remove_session(&mut self, session_uid: &str) -> Option<SessionEntry> {
        let entry = self.sessions.remove(session_uid)?;
        self.names.remove(&name_key(&entry.name));
        for member in &entry.members {
            if self.memberships.get(&member.client_id).map(String::as_str) == Some(session_uid) {
                self.memberships.remove(&member.client_id);
            }
        }
        Some(entry)
    }
}

pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    scheduler: Arc<InstanceScheduler>,
    clients: Arc<ClientRegistry>,
    modes: Arc<ModeRegistry>,
    metrics: Arc<Metrics>,
    max_sessions: usize,
    max_players: usize,
    offset_spacing: f32,
    events: Option<Sender<SessionEvent>>,
}

impl SessionRegistry {
    pub fn new(
        config: &ServerConfig,
        scheduler: Arc<InstanceScheduler>,
        clients: Arc<ClientRegistry>,
        modes: Arc<ModeRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            scheduler,
            clients,
            modes,
            metrics,
            max_sessions: config.max_sessions,
            max_players: config.max_players_per_session,
            offset_spacing: config.session_offset_spacing,
            events: None,
        }
    }

    pub fn with_event_sink(mut self, sink: Sender<SessionEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            if let Err(TrySendError::Full(event)) = events.try_send(event) {
                debug!("Session event sink full, dropping {:?}", event);
            }
        }
    }

    /// Member cap for a session running `mode_id`
    fn capacity(&self, mode_id: &str) -> usize {
        self.modes
            .get(mode_id)
            .map_or(self.max_players, |mode| self.max_players.min(mode.max_players()))
    }

    fn refresh_gauges(&self, inner: &RegistryInner) {
        Metrics::set(&self.metrics.active_sessions, inner.sessions.len() as u64);
        Metrics::set(&self.metrics.connected_clients, self.clients.len() as u64);
    }

    /// Tear down whatever outlives a removed session entry
    fn finish_destroy(&self, entry: SessionEntry) {
        self.scheduler.destroy_game(&entry.name);
        info!("Session '{}' destroyed", entry.name);
        self.emit(SessionEvent::Destroyed {
            session_name: entry.name,
            session_uid: entry.session_uid,
        });
    }

    /// Open a session hosted by `host`.
    ///
    /// The name is trimmed and must be unique (case-insensitive). Each
    /// session gets the next world offset slot along X.
    pub fn create_session(
        &self,
        host: ClientId,
        name: &str,
        host_name: Option<&str>,
    ) -> Result<SessionSummary, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        let host_uid = self.clients.register(host, host_name);

        let summary = {
            let mut inner = self.inner.lock();
            if inner.memberships.contains_key(&host) {
                return Err(SessionError::AlreadyInSession);
            }
            if inner.names.contains_key(&name_key(name)) {
                return Err(SessionError::NameTaken(name.to_string()));
            }
            if inner.sessions.len() >= self.max_sessions {
                return Err(SessionError::TooManySessions);
            }

            let index = inner.next_index;
            inner.next_index += 1;
            let session_uid = Uuid::new_v4().simple().to_string();
            let entry = SessionEntry {
                session_uid: session_uid.clone(),
                name: name.to_string(),
                state: SessionState::Lobby,
                mode_id: DEFAULT_MODE.to_string(),
                host,
                members: vec![SessionMember {
                    client_id: host,
                    client_uid: host_uid,
                }],
                ready: HashSet::new(),
                world_offset: Vec2::new(index as f32 * self.offset_spacing, 0.0),
            };
            let summary = entry.summary();
            inner.names.insert(name_key(name), session_uid.clone());
            inner.memberships.insert(host, session_uid.clone());
            inner.sessions.insert(session_uid, entry);
            self.refresh_gauges(&inner);
            summary
        };

        info!(
            "Session '{}' created by client {} at offset ({}, {})",
            summary.name, host, summary.world_offset.x, summary.world_offset.y
        );
        self.emit(SessionEvent::Created {
            session_name: summary.name.clone(),
            session_uid: summary.session_uid.clone(),
        });
        Ok(summary)
    }

    /// Add `client_id` to a session. Joining a running session spawns the
    /// player into the live game.
    pub fn join_session(
        &self,
        client_id: ClientId,
        name: &str,
        player_name: Option<&str>,
    ) -> Result<SessionSummary, SessionError> {
        let client_uid = self.clients.register(client_id, player_name);

        let (summary, late_join) = {
            let mut inner = self.inner.lock();
            let uid = inner.uid_for_name(name).ok_or(SessionError::NotFound)?;
            if let Some(current) = inner.memberships.get(&client_id) {
                if *current != uid {
                    return Err(SessionError::AlreadyInSession);
                }
                let summary = inner.sessions.get(&uid).map(SessionEntry::summary);
                return summary.ok_or(SessionError::NotFound);
            }

            let entry = inner.sessions.get_mut(&uid).ok_or(SessionError::NotFound)?;
            if entry.state == SessionState::Starting {
                return Err(SessionError::SessionStarting);
            }
            if entry.members.len() >= self.capacity(&entry.mode_id) {
                return Err(SessionError::SessionFull);
            }
            entry.add_member(client_id, client_uid.clone());
            entry.ready.remove(&client_id);
            let summary = entry.summary();
            let late_join = entry.state == SessionState::Running;
            inner.memberships.insert(client_id, uid);
            self.refresh_gauges(&inner);
            (summary, late_join)
        };

        info!("Client {} joined session '{}'", client_id, summary.name);
        if late_join {
            let seat = PlayerSeat {
                client_id,
                client_uid,
                display_name: self.clients.display_name(client_id),
            };
            if let Err(e) = self.scheduler.add_player_to_game(&summary.name, seat) {
                warn!("Late join of client {} into '{}' failed: {}", client_id, summary.name, e);
            }
        }
        Ok(summary)
    }

    /// Remove `client_id` from a session.
    ///
    /// The host leaving, or the last member leaving, destroys the session
    /// and its game. Otherwise the player's entity is removed from any
    /// running game.
    pub fn leave_session(&self, client_id: ClientId, name: &str) -> Result<(), SessionError> {
        enum Outcome {
            Destroyed(SessionEntry),
            Left { session_name: String, running: bool },
        }

        let outcome = {
            let mut inner = self.inner.lock();
            let uid = inner.uid_for_name(name).ok_or(SessionError::NotFound)?;
            let entry = inner.sessions.get_mut(&uid).ok_or(SessionError::NotFound)?;
            if !entry.is_member(client_id) {
                return Err(SessionError::NotMember);
            }

            let outcome = if entry.host == client_id {
                inner.remove_session(&uid).map(Outcome::Destroyed)
            } else {
                entry.remove_member(client_id);
                if entry.members.is_empty() {
                    inner.remove_session(&uid).map(Outcome::Destroyed)
                } else {
                    let left = Outcome::Left {
                        session_name: entry.name.clone(),
                        running: entry.state == SessionState::Running,
                    };
                    inner.memberships.remove(&client_id);
                    Some(left)
                }
            };
            self.refresh_gauges(&inner);
            outcome.ok_or(SessionError::NotFound)?
        };

        match outcome {
            Outcome::Destroyed(entry) => {
                info!("Client {} left session '{}'", client_id, entry.name);
                self.finish_destroy(entry);
            }
            Outcome::Left { session_name, running } => {
                info!("Client {} left session '{}'", client_id, session_name);
                if running {
                    self.scheduler.remove_player_from_game(&session_name, client_id);
                }
            }
        }
        Ok(())
    }

    /// Leave whatever session the client is in and forget the client
    pub fn handle_disconnect(&self, client_id: ClientId) {
        let session_name = self.client_session(client_id);
        if let Some(name) = session_name {
            if let Err(e) = self.leave_session(client_id, &name) {
                warn!("Disconnect cleanup for client {} failed: {}", client_id, e);
            }
        }
        self.clients.unregister(client_id);
        self.refresh_gauges(&self.inner.lock());
    }

    pub fn set_ready(&self, client_id: ClientId, name: &str, ready: bool) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let entry = inner.entry_by_name_mut(name).ok_or(SessionError::NotFound)?;
        if !entry.is_member(client_id) {
            return Err(SessionError::NotMember);
        }
        if ready {
            entry.ready.insert(client_id);
        } else {
            entry.ready.remove(&client_id);
        }
        Ok(())
    }

    /// Host-only; the mode must be registered, must fit the current members
    /// and no game may be running
    pub fn set_mode(&self, client_id: ClientId, name: &str, mode_id: &str) -> Result<(), SessionError> {
        let mode_id = mode_id.trim();
        if !self.modes.contains(mode_id) {
            return Err(SessionError::UnknownMode(mode_id.to_string()));
        }
        let capacity = self.capacity(mode_id);
        let mut inner = self.inner.lock();
        let entry = inner.entry_by_name_mut(name).ok_or(SessionError::NotFound)?;
        if entry.host != client_id {
            return Err(SessionError::NotHost);
        }
        if matches!(entry.state, SessionState::Starting | SessionState::Running) {
            return Err(SessionError::GameInProgress);
        }
        if entry.members.len() > capacity {
            return Err(SessionError::SessionFull);
        }
        entry.mode_id = mode_id.to_string();
        Ok(())
    }

    /// Validate and start the session's game, then send every member a
    /// full snapshot. On failure the session is left as it was.
    pub fn start_game(&self, client_id: ClientId, name: &str) -> Result<(), GameStartFailure> {
        use GameStartFailureReason as Reason;

        let name = name.trim();
        if name.is_empty() {
            return Err(Reason::SessionNotFound.into());
        }

        let request = {
            let mut inner = self.inner.lock();
            let entry = inner
                .entry_by_name_mut(name)
                .ok_or(GameStartFailure::new(Reason::SessionNotFound))?;
            if entry.host != client_id {
                return Err(Reason::NotSessionHost.into());
            }
            if matches!(entry.state, SessionState::Starting | SessionState::Running) {
                return Err(Reason::GameAlreadyStarted.into());
            }
            if entry.members.is_empty() {
                return Err(Reason::NotEnoughPlayers.into());
            }
            let mode = self
                .modes
                .get(&entry.mode_id)
                .ok_or(GameStartFailure::new(Reason::InvalidGameType))?;
            let required = mode.min_players().max(1);
            if entry.members.len() < required {
                return Err(GameStartFailure::with_message(
                    Reason::NotEnoughPlayers,
                    format!("Need at least {} players", required),
                ));
            }
            let capacity = self.max_players.min(mode.max_players());
            if entry.members.len() > capacity {
                return Err(GameStartFailure::with_message(
                    Reason::InvalidGameType,
                    format!("{} allows at most {} players", mode.display_name(), capacity),
                ));
            }
            if entry.ready_count() < entry.members.len() {
                return Err(Reason::NotAllPlayersReady.into());
            }

            entry.state = SessionState::Starting;
            GameRequest {
                session_name: entry.name.clone(),
                session_uid: entry.session_uid.clone(),
                mode_id: entry.mode_id.clone(),
                world_offset: entry.world_offset,
                players: entry
                    .members
                    .iter()
                    .map(|m| PlayerSeat {
                        client_id: m.client_id,
                        client_uid: m.client_uid.clone(),
                        display_name: self.clients.display_name(m.client_id),
                    })
                    .collect(),
            }
        };

        let session_name = request.session_name.clone();
        let session_uid = request.session_uid.clone();
        if let Err(e) = self.scheduler.create_game(request) {
            warn!("Starting game for '{}' failed: {}", session_name, e);
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.sessions.get_mut(&session_uid) {
                if entry.state == SessionState::Starting {
                    entry.state = SessionState::Lobby;
                }
            }
            return Err(GameStartFailure::with_message(Reason::ServerError, e.to_string()));
        }

        let members = {
            let mut inner = self.inner.lock();
            match inner.sessions.get_mut(&session_uid) {
                Some(entry) => {
                    entry.state = SessionState::Running;
                    Some(entry.member_ids())
                }
                None => None,
            }
        };
        let Some(members) = members else {
            // Session vanished while the game was being built
            self.scheduler.destroy_game(&session_name);
            return Err(Reason::SessionNotFound.into());
        };
        // Members who left while Starting never reached the scheduler
        let departed = self.scheduler.retain_players(&session_name, &members);
        if !departed.is_empty() {
            warn!(
                "Dropped {} departed clients from '{}' before its first snapshot",
                departed.len(),
                session_name
            );
        }

        self.scheduler.send_full_snapshot(&session_name, &members, true);
        info!("Game started for session '{}' with {} players", session_name, members.len());
        Ok(())
    }

    /// Stop a running game. Members stay and may start again.
    pub fn end_game(&self, name: &str) -> bool {
        let session_name = {
            let mut inner = self.inner.lock();
            match inner.entry_by_name_mut(name) {
                Some(entry) if entry.state == SessionState::Running => {
                    entry.state = SessionState::Ended;
                    entry.ready.clear();
                    entry.name.clone()
                }
                _ => return false,
            }
        };
        self.scheduler.destroy_game(&session_name);
        info!("Game ended for session '{}'", session_name);
        true
    }

    /// Session name for a session UID, falling back to treating the input
    /// as a session name
    pub fn resolve_session_name(&self, uid_or_name: &str) -> Option<String> {
        let key = uid_or_name.trim();
        if key.is_empty() {
            return None;
        }
        let inner = self.inner.lock();
        if let Some(entry) = inner.sessions.get(key) {
            return Some(entry.name.clone());
        }
        inner.entry_by_name(key).map(|e| e.name.clone())
    }

    pub fn session(&self, name: &str) -> Option<SessionSummary> {
        self.inner.lock().entry_by_name(name).map(SessionEntry::summary)
    }

    /// Member ids in join order
    pub fn members(&self, name: &str) -> Vec<ClientId> {
        self.inner
            .lock()
            .entry_by_name(name)
            .map(SessionEntry::member_ids)
            .unwrap_or_default()
    }

    /// Name of the session `client_id` belongs to
    pub fn client_session(&self, client_id: ClientId) -> Option<String> {
        let inner = self.inner.lock();
        let uid = inner.memberships.get(&client_id)?;
        inner.sessions.get(uid).map(|e| e.name.clone())
    }

    pub fn is_member(&self, client_id: ClientId, name: &str) -> bool {
        self.inner
            .lock()
            .entry_by_name(name)
            .map(|e| e.is_member(client_id))
            .unwrap_or(false)
    }

    /// All sessions, sorted by name
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .inner
            .lock()
            .sessions
            .values()
            .map(SessionEntry::summary)
            .collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        sessions
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }
}
