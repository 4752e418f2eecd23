//! Explicitly constructed server state
//!
//! A [`ServerContext`] owns one scheduler, one session registry and the
//! registries and channels around them. Nothing here is global, so tests
//! and benches can build as many independent servers as they like.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::game::constants::net::EVENT_CHANNEL_CAPACITY;
use crate::game::modes::{GameMode, ModeRegistry};
use crate::game::repository::{GridLoadError, GridRepository};
use crate::game::scheduler::{InstanceScheduler, SchedulerEvent, TickSummary};
use crate::lobby::clients::ClientRegistry;
use crate::lobby::manager::{SessionEvent, SessionRegistry};
use crate::metrics::Metrics;
use crate::net::router::CommandRouter;
use crate::net::sender::{ChannelCommandSender, CommandSender, OutboundBatch};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to load grid layouts: {0}")]
    Grids(#[from] GridLoadError),
}

pub struct ServerContext {
    pub config: ServerConfig,
    pub metrics: Arc<Metrics>,
    pub modes: Arc<ModeRegistry>,
    pub clients: Arc<ClientRegistry>,
    pub scheduler: Arc<InstanceScheduler>,
    pub sessions: Arc<SessionRegistry>,
    pub router: CommandRouter,
    /// Batches produced by the default channel sender; `None` when a custom
    /// sender was supplied
    pub outbound: Option<Receiver<OutboundBatch>>,
    /// Bounded; events past capacity are dropped until the owner drains
    pub scheduler_events: Receiver<SchedulerEvent>,
    pub session_events: Receiver<SessionEvent>,
}

impl ServerContext {
    pub fn builder(config: ServerConfig) -> ServerContextBuilder {
        ServerContextBuilder::new(config)
    }

    /// Context with the built-in modes and a channel sender
    pub fn new(config: ServerConfig) -> Result<Self, ContextError> {
        Self::builder(config).build()
    }

    /// One outer update of the scheduler
    pub fn update(&self, dt: f32) -> TickSummary {
        Metrics::set(&self.metrics.connected_clients, self.clients.len() as u64);
        self.scheduler.update(dt)
    }
}

pub struct ServerContextBuilder {
    config: ServerConfig,
    modes: ModeRegistry,
    grids: GridRepository,
    sender: Option<Arc<dyn CommandSender>>,
    metrics: Option<Arc<Metrics>>,
}

impl ServerContextBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            modes: ModeRegistry::with_builtin_modes(),
            grids: GridRepository::new(),
            sender: None,
            metrics: None,
        }
    }

    /// Register an extra game mode. Ids already taken are ignored.
    pub fn mode(mut self, mode: Arc<dyn GameMode>) -> Self {
        let id = mode.id().to_string();
        if !self.modes.register(mode) {
            warn!("Game mode '{}' already registered", id);
        }
        self
    }

    pub fn grids(mut self, grids: GridRepository) -> Self {
        self.grids = grids;
        self
    }

    pub fn sender(mut self, sender: Arc<dyn CommandSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<ServerContext, ContextError> {
        let Self {
            config,
            modes,
            mut grids,
            sender,
            metrics,
        } = self;
        config.validate().map_err(ContextError::InvalidConfig)?;

        if let Some(dir) = &config.maps_dir {
            grids.load_dir(dir)?;
        }

        let (sender, outbound) = match sender {
            Some(sender) => (sender, None),
            None => {
                let (channel, receiver) = ChannelCommandSender::new();
                let sender: Arc<dyn CommandSender> = Arc::new(channel);
                (sender, Some(receiver))
            }
        };

        let metrics = metrics.unwrap_or_else(|| Arc::new(Metrics::new()));
        let modes = Arc::new(modes);
        let clients = Arc::new(ClientRegistry::new());
        let (scheduler_tx, scheduler_events) = bounded(EVENT_CHANNEL_CAPACITY);
        let (session_tx, session_events) = bounded(EVENT_CHANNEL_CAPACITY);

        let scheduler = Arc::new(
            InstanceScheduler::new(&config, modes.clone(), grids, sender, metrics.clone())
                .with_event_sink(scheduler_tx),
        );
        let sessions = Arc::new(
            SessionRegistry::new(
                &config,
                scheduler.clone(),
                clients.clone(),
                modes.clone(),
                metrics.clone(),
            )
            .with_event_sink(session_tx),
        );
        let router = CommandRouter::new(sessions.clone(), scheduler.clone(), metrics.clone());

        info!(
            "Server context ready: role={:?}, modes={:?}, sim={}Hz, replication={}Hz",
            config.role,
            modes.ids(),
            config.sim_tick_rate,
            config.replication_tick_rate
        );

        Ok(ServerContext {
            config,
            metrics,
            modes,
            clients,
            scheduler,
            sessions,
            router,
            outbound,
            scheduler_events,
            session_events,
        })
    }
}
