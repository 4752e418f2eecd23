/// Why a start request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStartFailureReason {
    SessionNotFound,
    NotSessionHost,
    NotEnoughPlayers,
    NotAllPlayersReady,
    GameAlreadyStarted,
    InvalidGameType,
    ServerError,
}

impl GameStartFailureReason {
    pub fn default_message(self) -> &'static str {
        match self {
            Self::SessionNotFound => "Session not found",
            Self::NotSessionHost => "Only the session host can start the game",
            Self::NotEnoughPlayers => "Not enough players to start",
            Self::NotAllPlayersReady => "Not all players are ready",
            Self::GameAlreadyStarted => "Game already started",
            Self::InvalidGameType => "Invalid game type",
            Self::ServerError => "Server error",
        }
    }
}

/// Structured refusal returned to the requester only
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct GameStartFailure {
    pub reason: GameStartFailureReason,
    pub message: String,
}

impl GameStartFailure {
    pub fn new(reason: GameStartFailureReason) -> Self {
        Self {
            reason,
            message: reason.default_message().to_string(),
        }
    }

    pub fn with_message(reason: GameStartFailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<GameStartFailureReason> for GameStartFailure {
    fn from(reason: GameStartFailureReason) -> Self {
        Self::new(reason)
    }
}
