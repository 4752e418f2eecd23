//! Outbound command delivery seam

use crossbeam_channel::{unbounded, Receiver, Sender};
use smallvec::SmallVec;
use tracing::warn;

use crate::game::world::ClientId;
use crate::net::protocol::GameCommand;

/// Recipient list; most instances hold a handful of players
pub type Targets = SmallVec<[ClientId; 8]>;

/// Delivers an ordered command batch to a set of clients.
///
/// Implementations must preserve batch order per recipient.
pub trait CommandSender: Send + Sync {
    fn send_commands(&self, targets: &[ClientId], commands: &[GameCommand]);
}

/// One call to [`CommandSender::send_commands`]
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundBatch {
    pub targets: Targets,
    pub commands: Vec<GameCommand>,
}

impl OutboundBatch {
    pub fn is_for(&self, client: ClientId) -> bool {
        self.targets.contains(&client)
    }
}

/// Hands batches to whichever task owns the transport
#[derive(Clone)]
pub struct ChannelCommandSender {
    sender: Sender<OutboundBatch>,
}

impl ChannelCommandSender {
    pub fn new() -> (Self, Receiver<OutboundBatch>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl CommandSender for ChannelCommandSender {
    fn send_commands(&self, targets: &[ClientId], commands: &[GameCommand]) {
        if targets.is_empty() || commands.is_empty() {
            return;
        }
        let batch = OutboundBatch {
            targets: targets.iter().copied().collect(),
            commands: commands.to_vec(),
        };
        if self.sender.send(batch).is_err() {
            warn!("Outbound channel closed, dropping {} commands", commands.len());
        }
    }
}
