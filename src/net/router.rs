//! Inbound command routing
//!
//! Client-originated commands carry a session UID (or, before a map config
//! arrived, a session name). The router resolves that to an active session
//! and feeds movement into the input buffer or answers a resync with a full
//! snapshot. Server-to-client command kinds are rejected.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::game::input_buffer::{InputBufferError, InputMessage, InputSender};
use crate::game::scheduler::InstanceScheduler;
use crate::game::world::ClientId;
use crate::lobby::manager::SessionRegistry;
use crate::metrics::Metrics;
use crate::net::protocol::{decode_batch, DecodeError, GameCommand};

/// What happened to one inbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    InputQueued,
    SnapshotSent,
    /// Dropped; the reason has been logged
    Ignored,
}

pub struct CommandRouter {
    sessions: Arc<SessionRegistry>,
    scheduler: Arc<InstanceScheduler>,
    inputs: InputSender,
    metrics: Arc<Metrics>,
}

impl CommandRouter {
    pub fn new(sessions: Arc<SessionRegistry>, scheduler: Arc<InstanceScheduler>, metrics: Arc<Metrics>) -> Self {
        let inputs = scheduler.input_sender();
        Self {
            sessions,
            scheduler,
            inputs,
            metrics,
        }
    }

    /// Session name for a UID, then a name, then an active instance UID
    pub fn resolve_session(&self, uid_or_name: &str) -> Option<String> {
        let key = uid_or_name.trim();
        if key.is_empty() {
            return None;
        }
        self.sessions
            .resolve_session_name(key)
            .or_else(|| self.scheduler.session_name_for_uid(key))
    }

    pub fn handle_command(&self, sender: ClientId, command: &GameCommand) -> RouteOutcome {
        match command {
            GameCommand::MoveInput { header, direction } => {
                let Some(session_name) = self.resolve_session(&header.session_uid) else {
                    warn!("MoveInput from client {} for unknown session '{}'", sender, header.session_uid);
                    return RouteOutcome::Ignored;
                };
                let message = InputMessage {
                    session_name,
                    client_id: sender,
                    direction: *direction,
                };
                match self.inputs.try_send(message) {
                    Ok(()) => RouteOutcome::InputQueued,
                    Err(InputBufferError::Full) => {
                        Metrics::incr(&self.metrics.inputs_dropped, 1);
                        debug!("Input buffer full, dropping input from client {}", sender);
                        RouteOutcome::Ignored
                    }
                    Err(InputBufferError::Disconnected) => {
                        warn!("Input buffer disconnected, dropping input from client {}", sender);
                        RouteOutcome::Ignored
                    }
                }
            }
            GameCommand::ResyncRequest { header } => {
                let Some(session_name) = self.resolve_session(&header.session_uid) else {
                    warn!("ResyncRequest from client {} for unknown session '{}'", sender, header.session_uid);
                    return RouteOutcome::Ignored;
                };
                if !self.scheduler.is_player_in_game(&session_name, sender) {
                    warn!("ResyncRequest from client {} who is not in game '{}'", sender, session_name);
                    return RouteOutcome::Ignored;
                }
                if !self.scheduler.send_full_snapshot(&session_name, &[sender], true) {
                    return RouteOutcome::Ignored;
                }
                Metrics::incr(&self.metrics.resyncs_served, 1);
                info!("Resync served to client {} for '{}'", sender, session_name);
                RouteOutcome::SnapshotSent
            }
            other => {
                warn!("Client {} sent server-only command {:?}", sender, other.kind());
                RouteOutcome::Ignored
            }
        }
    }

    /// Decode an encoded batch and route each command in order
    pub fn handle_payload(&self, sender: ClientId, payload: &[u8]) -> Result<Vec<RouteOutcome>, DecodeError> {
        let commands = decode_batch(payload)?;
        Ok(commands.iter().map(|c| self.handle_command(sender, c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::grid::{CellCoord, GridDirection};
    use crate::game::modes::ModeRegistry;
    use crate::game::repository::GridRepository;
    use crate::lobby::clients::ClientRegistry;
    use crate::net::protocol::{encode_batch, CommandKind};
    use crate::net::sender::{ChannelCommandSender, OutboundBatch};
    use crossbeam_channel::Receiver;

    struct Fixture {
        router: CommandRouter,
        sessions: Arc<SessionRegistry>,
        scheduler: Arc<InstanceScheduler>,
        metrics: Arc<Metrics>,
        outbound: Receiver<OutboundBatch>,
        session_uid: String,
    }

    fn running_fixture(config: ServerConfig) -> Fixture {
        let (sender, outbound) = ChannelCommandSender::new();
        let modes = Arc::new(ModeRegistry::with_builtin_modes());
        let metrics = Arc::new(Metrics::new());
        let scheduler = Arc::new(InstanceScheduler::new(
            &config,
            modes.clone(),
            GridRepository::new(),
            Arc::new(sender),
            metrics.clone(),
        ));
        let sessions = Arc::new(SessionRegistry::new(
            &config,
            scheduler.clone(),
            Arc::new(ClientRegistry::new()),
            modes,
            metrics.clone(),
        ));
        let session_uid = sessions.create_session(1, "room", None).unwrap().session_uid;
        sessions.set_ready(1, "room", true).unwrap();
        sessions.start_game(1, "room").unwrap();
        outbound.try_iter().count();

        let router = CommandRouter::new(sessions.clone(), scheduler.clone(), metrics.clone());
        Fixture {
            router,
            sessions,
            scheduler,
            metrics,
            outbound,
            session_uid,
        }
    }

    fn entity_cell(f: &Fixture) -> CellCoord {
        f.scheduler
            .with_instance("room", |inst| {
                let id = inst.world().entity_for_owner(1).unwrap();
                inst.world().get(id).unwrap().cell
            })
            .unwrap()
    }

    #[test]
    fn test_resolve_prefers_uid_then_name() {
        let f = running_fixture(ServerConfig::default());
        assert_eq!(f.router.resolve_session(&f.session_uid).as_deref(), Some("room"));
        assert_eq!(f.router.resolve_session("room").as_deref(), Some("room"));
        assert_eq!(f.router.resolve_session("  "), None);
        assert_eq!(f.router.resolve_session("other"), None);
    }

    #[test]
    fn test_move_input_is_queued_and_applied_on_update() {
        let f = running_fixture(ServerConfig::default());
        let before = entity_cell(&f);
        let command = GameCommand::move_input(&f.session_uid, GridDirection::Right);
        assert_eq!(f.router.handle_command(1, &command), RouteOutcome::InputQueued);

        let summary = f.scheduler.update(0.0);
        assert_eq!(summary.inputs_applied, 1);
        let direction = f
            .scheduler
            .with_instance("room", |inst| {
                let id = inst.world().entity_for_owner(1).unwrap();
                inst.world().get(id).unwrap().direction
            })
            .unwrap();
        assert_eq!(direction, GridDirection::Right);
        assert_eq!(entity_cell(&f), before);
    }

    #[test]
    fn test_full_input_buffer_counts_drops() {
        let f = running_fixture(ServerConfig {
            input_buffer_capacity: 1,
            ..Default::default()
        });
        let command = GameCommand::move_input("room", GridDirection::Up);
        assert_eq!(f.router.handle_command(1, &command), RouteOutcome::InputQueued);
        assert_eq!(f.router.handle_command(1, &command), RouteOutcome::Ignored);
        assert_eq!(f.metrics.inputs_dropped.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_resync_sends_snapshot_to_requester_only() {
        let f = running_fixture(ServerConfig::default());
        let command = GameCommand::resync_request(&f.session_uid);
        assert_eq!(f.router.handle_command(1, &command), RouteOutcome::SnapshotSent);

        let batches: Vec<_> = f.outbound.try_iter().collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].targets.as_slice(), &[1]);
        assert_eq!(batches[0].commands[0].kind(), CommandKind::MapConfig);
        assert_eq!(batches[0].commands[1].kind(), CommandKind::Spawn);
    }

    #[test]
    fn test_resync_from_outsider_is_ignored() {
        let f = running_fixture(ServerConfig::default());
        f.sessions.create_session(9, "elsewhere", None).unwrap();
        let command = GameCommand::resync_request(&f.session_uid);
        assert_eq!(f.router.handle_command(9, &command), RouteOutcome::Ignored);
        assert!(f.outbound.try_recv().is_err());
    }

    #[test]
    fn test_server_only_commands_are_rejected() {
        let f = running_fixture(ServerConfig::default());
        let command = GameCommand::remove(5, &f.session_uid, 1);
        assert_eq!(f.router.handle_command(1, &command), RouteOutcome::Ignored);
    }

    #[test]
    fn test_handle_payload_routes_in_order() {
        let f = running_fixture(ServerConfig::default());
        let payload = encode_batch(&[
            GameCommand::move_input(&f.session_uid, GridDirection::Left),
            GameCommand::resync_request(&f.session_uid),
        ])
        .unwrap();
        let outcomes = f.router.handle_payload(1, &payload).unwrap();
        assert_eq!(outcomes, vec![RouteOutcome::InputQueued, RouteOutcome::SnapshotSent]);
        assert!(f.router.handle_payload(1, &[0xFF, 0xFF]).is_err());
    }
}
