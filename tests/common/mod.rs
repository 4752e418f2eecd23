//! Shared harness: one server context plus a reconciliation client per
//! viewer, connected through encoded payloads.

#![allow(dead_code)]

use std::collections::BTreeMap;

use gridsync_server::client::ReconciliationClient;
use gridsync_server::config::ServerConfig;
use gridsync_server::game::grid::CellCoord;
use gridsync_server::game::world::{ClientId, EntityId};
use gridsync_server::net::protocol::encode_batch;
use gridsync_server::net::sender::OutboundBatch;
use gridsync_server::ServerContext;

/// One simulation step and one replication pass per `STEP` update
pub const STEP: f32 = 0.1;

pub fn test_config() -> ServerConfig {
    ServerConfig {
        sim_tick_rate: 10.0,
        replication_tick_rate: 10.0,
        ..Default::default()
    }
}

pub struct Harness {
    pub ctx: ServerContext,
    pub clients: BTreeMap<ClientId, ReconciliationClient>,
    /// Every batch delivered so far, in order
    pub delivered: Vec<OutboundBatch>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self::from_context(ServerContext::new(config).expect("valid config"))
    }

    pub fn from_context(ctx: ServerContext) -> Self {
        Self {
            ctx,
            clients: BTreeMap::new(),
            delivered: Vec::new(),
        }
    }

    /// Add a viewer that is ready for presentation
    pub fn connect(&mut self, client_id: ClientId) {
        let mut client = ReconciliationClient::headless(client_id);
        client.set_ready(true);
        self.clients.insert(client_id, client);
    }

    pub fn client(&self, client_id: ClientId) -> &ReconciliationClient {
        &self.clients[&client_id]
    }

    pub fn client_mut(&mut self, client_id: ClientId) -> &mut ReconciliationClient {
        self.clients.get_mut(&client_id).expect("connected client")
    }

    /// Pending outbound batches, not yet delivered
    pub fn take_outbound(&mut self) -> Vec<OutboundBatch> {
        self.ctx
            .outbound
            .as_ref()
            .expect("channel sender")
            .try_iter()
            .collect()
    }

    /// Encode each pending batch and feed it to its targets
    pub fn deliver(&mut self) {
        let batches = self.take_outbound();
        self.deliver_batches(batches, &[]);
    }

    /// Like [`Self::deliver`], but `dropped` clients lose these batches
    pub fn deliver_except(&mut self, dropped: &[ClientId]) {
        let batches = self.take_outbound();
        self.deliver_batches(batches, dropped);
    }

    fn deliver_batches(&mut self, batches: Vec<OutboundBatch>, dropped: &[ClientId]) {
        for batch in batches {
            let payload = encode_batch(&batch.commands).expect("encodable batch");
            for target in &batch.targets {
                if dropped.contains(target) {
                    continue;
                }
                if let Some(client) = self.clients.get_mut(target) {
                    client.receive_payload(&payload).expect("decodable batch");
                }
            }
            self.delivered.push(batch);
        }
    }

    /// Route every client's queued commands to the server
    pub fn flush_client_commands(&mut self) {
        for (client_id, client) in self.clients.iter_mut() {
            for command in client.take_outgoing() {
                self.ctx.router.handle_command(*client_id, &command);
            }
        }
    }

    /// Run one outer update and deliver what it produced
    pub fn tick(&mut self) {
        self.ctx.update(STEP);
        self.deliver();
    }

    /// Server-side cells of every entity in `session`, keyed by entity id
    pub fn server_cells(&self, session: &str) -> BTreeMap<EntityId, CellCoord> {
        self.ctx
            .scheduler
            .with_instance(session, |inst| {
                let mut ids = Vec::new();
                inst.world().collect_all(&mut ids);
                ids.into_iter()
                    .filter_map(|id| inst.world().get(id).map(|e| (id, e.cell)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cells as materialized by `client_id`'s view
    pub fn client_cells(&self, client_id: ClientId) -> BTreeMap<EntityId, CellCoord> {
        let view = self.client(client_id).view();
        view.entity_ids()
            .into_iter()
            .filter_map(|id| view.get(id).map(|e| (id, e.cell)))
            .collect()
    }

    /// Create `session` hosted by the first client, join the rest, ready
    /// everyone and start the game
    pub fn start_session(&mut self, session: &str, members: &[ClientId]) {
        let (host, rest) = members.split_first().expect("at least one member");
        let sessions = &self.ctx.sessions;
        sessions
            .create_session(*host, session, Some(&format!("Host{}", host)))
            .expect("create session");
        for member in rest {
            sessions
                .join_session(*member, session, Some(&format!("Guest{}", member)))
                .expect("join session");
        }
        for member in members {
            sessions.set_ready(*member, session, true).expect("ready");
        }
        sessions.start_game(*host, session).expect("start game");
        self.deliver();
    }
}
