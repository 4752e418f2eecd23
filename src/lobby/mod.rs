//! Session management
//!
//! Client identities, isolated sessions with host and ready tracking, and
//! the game-start validation that gates instance creation.

pub mod clients;
pub mod manager;
pub mod session;
pub mod validation;

pub use clients::ClientRegistry;
pub use manager::{SessionError, SessionEvent, SessionRegistry};
pub use validation::{GameStartFailure, GameStartFailureReason};
