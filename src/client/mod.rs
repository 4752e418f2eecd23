//! Receiving side of replication
//!
//! Applies the server's command stream to a local view under the version
//! ordering rules and asks for a fresh snapshot when a gap is detected.

pub mod reconcile;
pub mod view;

pub use reconcile::{ApplyOutcome, ReconciliationClient};
pub use view::{EntityView, ViewEntity, ViewWorld};
