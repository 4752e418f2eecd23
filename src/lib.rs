//! Gridsync Server Library
//!
//! Server-authoritative simulation and state replication for session-based
//! grid games. Each running session gets its own game instance; a single
//! scheduler steps every instance at a fixed rate and streams dirty-entity
//! updates to that session's members. The [`client`] module is the matching
//! receiving side.

pub mod client;
pub mod config;
pub mod context;
pub mod game;
pub mod lobby;
pub mod metrics;
pub mod net;
pub mod util;

pub use context::{ContextError, ServerContext};
