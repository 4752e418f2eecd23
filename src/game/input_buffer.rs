//! Bounded move-input queue between network handlers and the scheduler
//!
//! Handlers submit from any thread without blocking; the scheduler drains
//! everything pending at the start of each outer update so inputs are only
//! ever applied on the scheduler's own tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::game::grid::GridDirection;
use crate::game::world::ClientId;

/// Movement intent addressed to one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMessage {
    pub session_name: String,
    pub client_id: ClientId,
    pub direction: GridDirection,
}

pub struct InputBuffer {
    sender: Sender<InputMessage>,
    receiver: Receiver<InputMessage>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Clonable handle for submitting inputs
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Take every pending input in submission order
    pub fn drain(&self) -> Vec<InputMessage> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(crate::game::constants::net::INPUT_BUFFER_CAPACITY)
    }
}

#[derive(Clone)]
pub struct InputSender {
    sender: Sender<InputMessage>,
}

impl InputSender {
    /// Non-blocking submit. `Full` means the scheduler is falling behind.
    #[inline]
    pub fn try_send(&self, message: InputMessage) -> Result<(), InputBufferError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => InputBufferError::Full,
            TrySendError::Disconnected(_) => InputBufferError::Disconnected,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    #[error("input buffer full")]
    Full,
    #[error("input buffer disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(session: &str, client_id: ClientId, direction: GridDirection) -> InputMessage {
        InputMessage {
            session_name: session.to_string(),
            client_id,
            direction,
        }
    }

    #[test]
    fn test_submit_and_drain_in_order() {
        let buffer = InputBuffer::new(8);
        let sender = buffer.sender();
        sender.try_send(input("a", 1, GridDirection::Up)).unwrap();
        sender.try_send(input("b", 2, GridDirection::Left)).unwrap();
        assert_eq!(buffer.pending_count(), 2);

        let drained = buffer.drain();
        assert_eq!(drained[0], input("a", 1, GridDirection::Up));
        assert_eq!(drained[1], input("b", 2, GridDirection::Left));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_backpressure() {
        let buffer = InputBuffer::new(2);
        let sender = buffer.sender();
        sender.try_send(input("a", 1, GridDirection::Up)).unwrap();
        sender.try_send(input("a", 1, GridDirection::Down)).unwrap();
        assert_eq!(
            sender.try_send(input("a", 1, GridDirection::Right)),
            Err(InputBufferError::Full)
        );
    }

    #[test]
    fn test_cloned_senders_share_queue() {
        let buffer = InputBuffer::new(4);
        let a = buffer.sender();
        let b = a.clone();
        a.try_send(input("a", 1, GridDirection::Up)).unwrap();
        b.try_send(input("a", 2, GridDirection::Up)).unwrap();
        assert_eq!(buffer.drain().len(), 2);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(InputBuffer::default().capacity(), 1024);
    }
}
