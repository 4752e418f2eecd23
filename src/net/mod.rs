//! Replication protocol and the command delivery boundary

pub mod protocol;
pub mod router;
pub mod sender;

pub use protocol::{CommandKind, GameCommand};
pub use router::{CommandRouter, RouteOutcome};
pub use sender::{ChannelCommandSender, CommandSender, OutboundBatch};
