//! Instance scheduler
//!
//! Owns every active game instance, runs fixed-step simulation with a
//! bounded catch-up and a slower replication pass, and brokers late joins,
//! leaves and full snapshots. Instances are looked up by session name or
//! session UID.
//!
//! Only the authoritative role mutates anything. On other roles every
//! mutating call is a logged no-op.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::game::grid::GridDirection;
use crate::game::input_buffer::{InputBuffer, InputSender};
use crate::game::instance::{GameInstance, PlayerSeat};
use crate::game::map::{compute_seed, MapShape};
use crate::game::modes::ModeRegistry;
use crate::game::repository::GridRepository;
use crate::game::world::{ClientId, EntityId, SpawnError};
use crate::metrics::Metrics;
use crate::net::protocol::GameCommand;
use crate::net::sender::{CommandSender, Targets};
use crate::util::Vec2;

pub type SharedInstance = Arc<Mutex<GameInstance>>;

/// Lifecycle notifications for instance owners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    GameCreated {
        session_name: String,
        session_uid: String,
        mode_id: String,
    },
    GameDestroyed {
        session_name: String,
        session_uid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateGameError {
    #[error("scheduler is not authoritative")]
    NotAuthoritative,
    #[error("session name and uid are required")]
    MissingSession,
    #[error("session '{0}' already has an active game")]
    AlreadyActive(String),
    #[error("unknown game mode '{0}'")]
    UnknownMode(String),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LateJoinError {
    #[error("scheduler is not authoritative")]
    NotAuthoritative,
    #[error("no active game for session '{0}'")]
    NoActiveGame(String),
    #[error("client {0} is already in the game")]
    AlreadyInGame(ClientId),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Everything needed to start an instance
#[derive(Debug, Clone)]
pub struct GameRequest {
    pub session_name: String,
    pub session_uid: String,
    pub mode_id: String,
    pub world_offset: Vec2,
    /// Seats in join order; index decides spawn slot and colour
    pub players: Vec<PlayerSeat>,
}

/// What one outer update did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub inputs_applied: u32,
    pub sim_steps: u32,
    pub replication_cycles: u32,
    pub batches_sent: u32,
}

#[derive(Default)]
struct ActiveGames {
    by_name: BTreeMap<String, SharedInstance>,
    uid_to_name: HashMap<String, String>,
}

impl ActiveGames {
    fn contains(&self, session_name: &str, session_uid: &str) -> bool {
        self.by_name.contains_key(session_name) || self.uid_to_name.contains_key(session_uid)
    }
}

/// State touched only by the update loop
#[derive(Default)]
struct TickState {
    sim_accumulator: f32,
    replication_accumulator: f32,
    /// Reused snapshot of active instances
    instances: Vec<SharedInstance>,
    /// Reused dirty-id harvest buffer
    dirty_ids: Vec<EntityId>,
}

pub struct InstanceScheduler {
    sim_step: f32,
    replication_step: f32,
    max_catch_up_steps: u32,
    authoritative: bool,
    modes: Arc<ModeRegistry>,
    grids: GridRepository,
    sender: Arc<dyn CommandSender>,
    metrics: Arc<Metrics>,
    inputs: InputBuffer,
    games: RwLock<ActiveGames>,
    tick: Mutex<TickState>,
    events: Option<Sender<SchedulerEvent>>,
}

impl InstanceScheduler {
    pub fn new(
        config: &ServerConfig,
        modes: Arc<ModeRegistry>,
        grids: GridRepository,
        sender: Arc<dyn CommandSender>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            sim_step: config.sim_step(),
            replication_step: config.replication_step(),
            max_catch_up_steps: config.max_catch_up_steps.max(1),
            authoritative: config.is_authoritative(),
            modes,
            grids,
            sender,
            metrics,
            inputs: InputBuffer::new(config.input_buffer_capacity),
            games: RwLock::new(ActiveGames::default()),
            tick: Mutex::new(TickState::default()),
            events: None,
        }
    }

    /// Deliver lifecycle events to `sink`
    pub fn with_event_sink(mut self, sink: Sender<SchedulerEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn sim_step(&self) -> f32 {
        self.sim_step
    }

    pub fn replication_step(&self) -> f32 {
        self.replication_step
    }

    /// Handle for queueing move inputs from other threads
    pub fn input_sender(&self) -> InputSender {
        self.inputs.sender()
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(events) = &self.events {
            if let Err(TrySendError::Full(event)) = events.try_send(event) {
                debug!("Scheduler event sink full, dropping {:?}", event);
            }
        }
    }

    fn send(&self, targets: &[ClientId], commands: &[GameCommand]) {
        if targets.is_empty() || commands.is_empty() {
            return;
        }
        self.sender.send_commands(targets, commands);
        Metrics::incr(&self.metrics.commands_sent, (commands.len() * targets.len()) as u64);
    }

    fn refresh_active_gauge(&self, games: &ActiveGames) {
        Metrics::set(&self.metrics.active_instances, games.by_name.len() as u64);
    }

    /// Build an instance for `request` and publish it.
    ///
    /// Nothing is published on error. A session that already has an active
    /// game (by name or UID) is rejected, both before construction and again
    /// at publish time.
    pub fn create_game(&self, request: GameRequest) -> Result<(), CreateGameError> {
        if !self.authoritative {
            warn!("create_game ignored: not authoritative");
            return Err(CreateGameError::NotAuthoritative);
        }
        let name = request.session_name.trim();
        let uid = request.session_uid.trim();
        if name.is_empty() || uid.is_empty() {
            warn!("create_game rejected: missing session name or uid");
            return Err(CreateGameError::MissingSession);
        }
        if self.games.read().contains(name, uid) {
            warn!("create_game rejected: '{}' already has an active game", name);
            return Err(CreateGameError::AlreadyActive(name.to_string()));
        }

        let mode = self
            .modes
            .get(&request.mode_id)
            .ok_or_else(|| CreateGameError::UnknownMode(request.mode_id.clone()))?;

        let seed = compute_seed(uid, request.world_offset);
        let map_config = mode.build_map_config(request.world_offset, seed);
        let mut grid = self.grids.load_or_generate(
            mode.id(),
            map_config.grid_width,
            map_config.grid_height,
            map_config.cell_size,
            map_config.world_offset,
            seed,
            mode.wall_density(),
        );
        if map_config.shape == MapShape::Circle {
            grid.apply_circle_mask(map_config.circle_radius);
        }

        let mut instance = GameInstance::new(name, uid, mode.clone(), map_config, grid);
        let total = request.players.len();
        for (index, seat) in request.players.iter().enumerate() {
            instance.add_player(seat, index, total)?;
        }

        {
            let mut games = self.games.write();
            if games.contains(name, uid) {
                warn!("create_game lost publish race for '{}'", name);
                return Err(CreateGameError::AlreadyActive(name.to_string()));
            }
            games
                .by_name
                .insert(name.to_string(), Arc::new(Mutex::new(instance)));
            games.uid_to_name.insert(uid.to_string(), name.to_string());
            self.refresh_active_gauge(&games);
        }

        info!(
            "Game created for session '{}' ({} [{}], {} players, seed {})",
            name,
            mode.display_name(),
            mode.id(),
            total,
            seed
        );
        self.emit(SchedulerEvent::GameCreated {
            session_name: name.to_string(),
            session_uid: uid.to_string(),
            mode_id: mode.id().to_string(),
        });
        Ok(())
    }

    /// Unpublish the session's instance. Returns false if none was active.
    pub fn destroy_game(&self, session_name: &str) -> bool {
        if !self.authoritative {
            warn!("destroy_game ignored: not authoritative");
            return false;
        }
        let removed = {
            let mut games = self.games.write();
            let removed = games.by_name.remove(session_name);
            if let Some(instance) = &removed {
                let uid = instance.lock().session_uid().to_string();
                games.uid_to_name.remove(&uid);
            }
            self.refresh_active_gauge(&games);
            removed
        };

        let Some(instance) = removed else {
            return false;
        };
        let (session_uid, mode) = {
            let inst = instance.lock();
            (inst.session_uid().to_string(), inst.mode().clone())
        };
        mode.cleanup(session_name);
        info!("Game destroyed for session '{}'", session_name);
        self.emit(SchedulerEvent::GameDestroyed {
            session_name: session_name.to_string(),
            session_uid,
        });
        true
    }

    /// Spawn a player into a running instance.
    ///
    /// Existing members receive the spawn at the bumped version; the joiner
    /// receives a full snapshot including the map config.
    pub fn add_player_to_game(&self, session_name: &str, seat: PlayerSeat) -> Result<EntityId, LateJoinError> {
        if !self.authoritative {
            warn!("add_player_to_game ignored: not authoritative");
            return Err(LateJoinError::NotAuthoritative);
        }
        let instance = self
            .instance(session_name)
            .ok_or_else(|| LateJoinError::NoActiveGame(session_name.to_string()))?;
        let mut inst = instance.lock();
        if inst.has_player(seat.client_id) {
            return Err(LateJoinError::AlreadyInGame(seat.client_id));
        }

        let join_index = inst.players().len();
        let entity_id = inst.add_player(&seat, join_index, join_index + 1)?;
        let version = inst.bump_version();

        let others: Targets = inst
            .players()
            .iter()
            .copied()
            .filter(|c| *c != seat.client_id)
            .collect();
        if let Some(spawn) = inst.spawn_command(entity_id, version) {
            self.send(&others, &[spawn]);
        }
        self.snapshot_locked(&inst, &[seat.client_id], true);

        info!(
            "Client {} joined running game '{}' as entity {}",
            seat.client_id, session_name, entity_id
        );
        Ok(entity_id)
    }

    /// Drop a player from a running instance.
    ///
    /// Returns false when there is no such game or the client is not a
    /// member. A member without an entity is just dropped from the roster.
    pub fn remove_player_from_game(&self, session_name: &str, client_id: ClientId) -> bool {
        if !self.authoritative {
            warn!("remove_player_from_game ignored: not authoritative");
            return false;
        }
        let Some(instance) = self.instance(session_name) else {
            return false;
        };
        let mut inst = instance.lock();
        if !inst.has_player(client_id) {
            return false;
        }

        let Some(entity_id) = inst.world().entity_for_owner(client_id) else {
            inst.remove_player(client_id);
            return true;
        };

        let version = inst.bump_version();
        inst.remove_player(client_id);
        let remove = inst.remove_command(entity_id, version);
        self.send(inst.players(), &[remove]);
        info!(
            "Client {} left game '{}' (entity {} removed at v{})",
            client_id, session_name, entity_id, version
        );
        true
    }

    /// Drop every rostered player not in `keep` without sending anything.
    /// Used before the first snapshot, when nobody holds state to correct.
    /// Returns the dropped clients.
    pub fn retain_players(&self, session_name: &str, keep: &[ClientId]) -> Vec<ClientId> {
        if !self.authoritative {
            return Vec::new();
        }
        let Some(instance) = self.instance(session_name) else {
            return Vec::new();
        };
        let mut inst = instance.lock();
        let departed: Vec<ClientId> = inst
            .players()
            .iter()
            .copied()
            .filter(|c| !keep.contains(c))
            .collect();
        for client_id in &departed {
            inst.remove_player(*client_id);
            info!("Client {} dropped from game '{}' before it started", client_id, session_name);
        }
        departed
    }

    /// Send the current state to `targets`. Returns false if no game is active.
    pub fn send_full_snapshot(&self, session_name: &str, targets: &[ClientId], include_map_config: bool) -> bool {
        let Some(instance) = self.instance(session_name) else {
            return false;
        };
        let inst = instance.lock();
        self.snapshot_locked(&inst, targets, include_map_config);
        true
    }

    fn snapshot_locked(&self, inst: &GameInstance, targets: &[ClientId], include_map_config: bool) {
        let commands = inst.snapshot_commands(include_map_config);
        self.send(targets, &commands);
        Metrics::incr(&self.metrics.snapshots_sent, targets.len() as u64);
        debug!(
            "Snapshot of '{}' at v{} ({} commands) to {} clients",
            inst.session_name(),
            inst.version(),
            commands.len(),
            targets.len()
        );
    }

    /// Apply a movement intent immediately. Use [`Self::input_sender`] from
    /// threads other than the update loop.
    pub fn set_player_input(&self, session_name: &str, client_id: ClientId, direction: GridDirection) -> bool {
        if !self.authoritative {
            debug!("set_player_input ignored: not authoritative");
            return false;
        }
        match self.instance(session_name) {
            Some(instance) => instance.lock().world_mut().set_input(client_id, direction),
            None => false,
        }
    }

    fn apply_pending_inputs(&self) -> u32 {
        let mut applied = 0;
        for input in self.inputs.drain() {
            if self.set_player_input(&input.session_name, input.client_id, input.direction) {
                applied += 1;
            }
        }
        applied
    }

    /// One outer update of `dt` seconds.
    ///
    /// Drains queued inputs, runs at most `max_catch_up_steps` fixed
    /// simulation steps (leftover time carries to the next call), then runs
    /// every due replication pass.
    pub fn update(&self, dt: f32) -> TickSummary {
        let mut summary = TickSummary::default();
        if !self.authoritative {
            debug!("update ignored: not authoritative");
            return summary;
        }
        let started = Instant::now();
        Metrics::incr(&self.metrics.outer_updates, 1);
        summary.inputs_applied = self.apply_pending_inputs();

        let mut tick = self.tick.lock();
        let TickState {
            sim_accumulator,
            replication_accumulator,
            instances,
            dirty_ids,
        } = &mut *tick;

        instances.clear();
        instances.extend(self.games.read().by_name.values().cloned());
        if instances.is_empty() || !dt.is_finite() || dt <= 0.0 {
            return summary;
        }

        *sim_accumulator += dt;
        *replication_accumulator += dt;

        while *sim_accumulator >= self.sim_step && summary.sim_steps < self.max_catch_up_steps {
            for instance in instances.iter() {
                instance.lock().step(self.sim_step);
            }
            *sim_accumulator -= self.sim_step;
            summary.sim_steps += 1;
        }
        if *sim_accumulator >= self.sim_step {
            Metrics::incr(&self.metrics.catch_up_capped, 1);
            debug!(
                "Catch-up cap reached, {:.3}s of simulation deferred",
                *sim_accumulator
            );
        }

        while *replication_accumulator >= self.replication_step {
            *replication_accumulator -= self.replication_step;
            summary.replication_cycles += 1;
            for instance in instances.iter() {
                if self.replicate_dirty(&mut instance.lock(), dirty_ids) {
                    summary.batches_sent += 1;
                }
            }
        }

        Metrics::incr(&self.metrics.sim_steps, summary.sim_steps as u64);
        Metrics::incr(&self.metrics.replication_cycles, summary.replication_cycles as u64);
        Metrics::incr(&self.metrics.update_batches_sent, summary.batches_sent as u64);
        self.metrics.record_update_time(started.elapsed());
        summary
    }

    /// Send one update per dirty entity to the instance's members
    fn replicate_dirty(&self, inst: &mut GameInstance, dirty_ids: &mut Vec<EntityId>) -> bool {
        if !inst.world().is_dirty() {
            return false;
        }
        inst.world().collect_dirty(dirty_ids);
        if dirty_ids.is_empty() {
            inst.world_mut().clear_dirty();
            return false;
        }

        let version = inst.bump_version();
        let commands: Vec<GameCommand> = dirty_ids
            .iter()
            .filter_map(|id| inst.update_command(*id, version))
            .collect();
        inst.world_mut().clear_dirty();

        self.send(inst.players(), &commands);
        debug!(
            "Replicated {} updates for '{}' at v{}",
            commands.len(),
            inst.session_name(),
            version
        );
        true
    }

    /// Shared handle to the session's instance
    pub fn instance(&self, session_name: &str) -> Option<SharedInstance> {
        self.games.read().by_name.get(session_name).cloned()
    }

    /// Run `f` against the session's instance under its lock
    pub fn with_instance<R>(&self, session_name: &str, f: impl FnOnce(&GameInstance) -> R) -> Option<R> {
        self.instance(session_name).map(|instance| f(&instance.lock()))
    }

    pub fn has_active_game(&self, session_name: &str) -> bool {
        self.games.read().by_name.contains_key(session_name)
    }

    pub fn session_name_for_uid(&self, session_uid: &str) -> Option<String> {
        self.games.read().uid_to_name.get(session_uid).cloned()
    }

    pub fn is_player_in_game(&self, session_name: &str, client_id: ClientId) -> bool {
        self.with_instance(session_name, |inst| inst.has_player(client_id))
            .unwrap_or(false)
    }

    pub fn instance_version(&self, session_name: &str) -> Option<u32> {
        self.with_instance(session_name, |inst| inst.version())
    }

    pub fn active_count(&self) -> usize {
        self.games.read().by_name.len()
    }

    /// Names of active sessions, sorted
    pub fn active_sessions(&self) -> Vec<String> {
        self.games.read().by_name.keys().cloned().collect()
    }
}
