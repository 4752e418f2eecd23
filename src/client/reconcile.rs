//! Client-side reconciliation of the replicated command stream
//!
//! A map config starts a new world at version 0. Spawns are snapshot
//! chunks and may share a version. Updates and removes must arrive in strict
//! version order: anything older is stale, anything that skips a version
//! means a lost batch and triggers a resync request.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::client::view::{EntityView, ViewWorld};
use crate::game::grid::{CellCoord, GridDirection};
use crate::game::map::MapConfig;
use crate::game::world::ClientId;
use crate::net::protocol::{decode_batch, DecodeError, GameCommand};
use crate::util::Vec2;

/// Result of feeding one command to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Queued until the client is ready for presentation
    Buffered,
    Applied,
    /// Version 0, already applied, or not a server command
    Dropped,
    /// Dropped and a resync request was queued
    ResyncRequested,
}

pub struct ReconciliationClient<V: EntityView = ViewWorld> {
    view: V,
    map_config: Option<MapConfig>,
    session_uid: Option<String>,
    fallback_session_name: Option<String>,
    last_applied_version: u32,
    ready: bool,
    buffered: VecDeque<GameCommand>,
    /// Commands waiting to go to the server, oldest first
    outgoing: VecDeque<GameCommand>,
    resyncs_requested: u32,
}

impl ReconciliationClient<ViewWorld> {
    /// Client with an in-memory view that knows its own client id
    pub fn headless(client_id: ClientId) -> Self {
        Self::new(ViewWorld::for_client(client_id))
    }
}

impl<V: EntityView> ReconciliationClient<V> {
    /// New client; commands are buffered until [`Self::set_ready`]
    pub fn new(view: V) -> Self {
        Self {
            view,
            map_config: None,
            session_uid: None,
            fallback_session_name: None,
            last_applied_version: 0,
            ready: false,
            buffered: VecDeque::new(),
            outgoing: VecDeque::new(),
            resyncs_requested: 0,
        }
    }

    /// Session name used for resync and input before any UID is known
    pub fn set_fallback_session_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.fallback_session_name = if name.trim().is_empty() { None } else { Some(name) };
    }

    /// Open or close the presentation gate. Opening replays the buffer in
    /// arrival order.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
        if !ready {
            return;
        }
        if !self.buffered.is_empty() {
            debug!("Replaying {} buffered commands", self.buffered.len());
        }
        while self.ready {
            let Some(command) = self.buffered.pop_front() else {
                break;
            };
            self.apply(command);
        }
    }

    pub fn receive(&mut self, command: GameCommand) -> ApplyOutcome {
        if !self.ready {
            self.buffered.push_back(command);
            return ApplyOutcome::Buffered;
        }
        self.apply(command)
    }

    pub fn receive_batch(&mut self, commands: impl IntoIterator<Item = GameCommand>) -> Vec<ApplyOutcome> {
        commands.into_iter().map(|c| self.receive(c)).collect()
    }

    /// Decode an encoded batch and receive it in order
    pub fn receive_payload(&mut self, payload: &[u8]) -> Result<Vec<ApplyOutcome>, DecodeError> {
        let commands = decode_batch(payload)?;
        Ok(self.receive_batch(commands))
    }

    fn apply(&mut self, command: GameCommand) -> ApplyOutcome {
        let uid = command.session_uid();
        if self.session_uid.is_none() && !uid.is_empty() {
            self.session_uid = Some(uid.to_string());
        }

        match command {
            GameCommand::MapConfig { header, mut config } => {
                config.normalize_dimensions();
                info!(
                    "Map config '{}' {}x{} for session {}",
                    config.map_name, config.grid_width, config.grid_height, header.session_uid
                );
                if !header.session_uid.is_empty() {
                    self.session_uid = Some(header.session_uid);
                }
                self.map_config = Some(config);
                self.last_applied_version = 0;
                self.view.clear();
                ApplyOutcome::Applied
            }
            GameCommand::Spawn { header, entity } => {
                if !self.accept_snapshot(header.version) {
                    return ApplyOutcome::Dropped;
                }
                let position = self.world_position(entity.cell);
                self.view.spawn(&entity, position);
                ApplyOutcome::Applied
            }
            GameCommand::Update { header, entity } => {
                if let Some(outcome) = self.reject_incremental(header.version) {
                    return outcome;
                }
                let position = self.world_position(entity.cell);
                if !self.view.update(entity.entity_id, entity.cell, position) {
                    debug!("Update for unknown entity {}", entity.entity_id);
                }
                ApplyOutcome::Applied
            }
            GameCommand::Remove { header, entity_id } => {
                if let Some(outcome) = self.reject_incremental(header.version) {
                    return outcome;
                }
                self.view.remove(entity_id);
                ApplyOutcome::Applied
            }
            GameCommand::MoveInput { .. } | GameCommand::ResyncRequest { .. } => ApplyOutcome::Dropped,
        }
    }

    fn world_position(&self, cell: CellCoord) -> Vec2 {
        match &self.map_config {
            Some(config) => config.cell_to_world(cell),
            None => MapConfig::default().cell_to_world(cell),
        }
    }

    /// Snapshot chunks apply at or above the current version
    fn accept_snapshot(&mut self, version: u32) -> bool {
        if version == 0 || version < self.last_applied_version {
            return false;
        }
        self.last_applied_version = version;
        true
    }

    /// `None` when an incremental command at `version` should apply; the
    /// version is advanced in that case
    fn reject_incremental(&mut self, version: u32) -> Option<ApplyOutcome> {
        if version == 0 {
            return Some(ApplyOutcome::Dropped);
        }
        if self.last_applied_version == 0 {
            return Some(self.resync_outcome("update before snapshot"));
        }
        if version > self.last_applied_version + 1 {
            let reason = format!(
                "missing versions: have {}, received {}",
                self.last_applied_version, version
            );
            return Some(self.resync_outcome(&reason));
        }
        if version <= self.last_applied_version {
            return Some(ApplyOutcome::Dropped);
        }
        self.last_applied_version = version;
        None
    }

    fn resync_outcome(&mut self, reason: &str) -> ApplyOutcome {
        if self.request_resync(reason) {
            ApplyOutcome::ResyncRequested
        } else {
            ApplyOutcome::Dropped
        }
    }

    fn session_key(&self) -> Option<&str> {
        self.session_uid
            .as_deref()
            .or(self.fallback_session_name.as_deref())
    }

    /// Queue a resync request. Every call queues one, even while an earlier
    /// request is unanswered. Returns false when no session is known.
    pub fn request_resync(&mut self, reason: &str) -> bool {
        let Some(key) = self.session_key() else {
            warn!("Cannot request resync without a session ({})", reason);
            return false;
        };
        warn!("Requesting resync: {}", reason);
        let command = GameCommand::resync_request(key);
        self.outgoing.push_back(command);
        self.resyncs_requested += 1;
        true
    }

    /// Queue a movement intent for the local entity
    pub fn move_input(&mut self, direction: GridDirection) -> bool {
        let Some(key) = self.session_key() else {
            return false;
        };
        let command = GameCommand::move_input(key, direction);
        self.outgoing.push_back(command);
        true
    }

    /// Take everything queued for the server
    pub fn take_outgoing(&mut self) -> Vec<GameCommand> {
        self.outgoing.drain(..).collect()
    }

    pub fn last_applied_version(&self) -> u32 {
        self.last_applied_version
    }

    pub fn session_uid(&self) -> Option<&str> {
        self.session_uid.as_deref()
    }

    pub fn map_config(&self) -> Option<&MapConfig> {
        self.map_config.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    pub fn resyncs_requested(&self) -> u32 {
        self.resyncs_requested
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }
}
