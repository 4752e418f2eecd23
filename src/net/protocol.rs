//! Game command wire format
//!
//! Every command is one enum variant, so the encoded variant index is the
//! first thing on the wire and receivers can dispatch before reading the
//! rest. Each variant carries a [`CommandHeader`] with the state version
//! and the session UID it belongs to.

use serde::{Deserialize, Serialize};

use crate::game::grid::{CellCoord, GridDirection};
use crate::game::map::MapConfig;
use crate::game::world::{ClientId, EntityData, EntityId, VisualKind};

/// Entity kind string carried on spawn commands
pub const ENTITY_TYPE_PLAYER: &str = "player";

/// Discriminant of a [`GameCommand`], for logging and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    MapConfig,
    Spawn,
    Update,
    Remove,
    MoveInput,
    ResyncRequest,
}

/// Fields common to every command
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandHeader {
    /// Instance state version the command was stamped with
    pub version: u32,
    /// Session the command belongs to; clients capture it for resync requests
    pub session_uid: String,
}

/// Full description of a newly visible entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpawn {
    pub entity_id: EntityId,
    pub entity_type: String,
    pub owner_client_id: ClientId,
    pub owner_client_uid: String,
    pub display_name: String,
    pub color_index: u8,
    pub visual: VisualKind,
    pub cell: CellCoord,
}

impl From<EntityData> for EntitySpawn {
    fn from(data: EntityData) -> Self {
        Self {
            entity_id: data.id,
            entity_type: ENTITY_TYPE_PLAYER.to_string(),
            owner_client_id: data.owner,
            owner_client_uid: data.owner_uid,
            display_name: data.display_name,
            color_index: data.color_index,
            visual: data.visual,
            cell: data.cell,
        }
    }
}

/// Position change of an existing entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub entity_id: EntityId,
    pub cell: CellCoord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameCommand {
    MapConfig {
        header: CommandHeader,
        config: MapConfig,
    },
    Spawn {
        header: CommandHeader,
        entity: EntitySpawn,
    },
    Update {
        header: CommandHeader,
        entity: EntityUpdate,
    },
    Remove {
        header: CommandHeader,
        entity_id: EntityId,
    },
    /// Client to server: movement intent for the sender's own entity
    MoveInput {
        header: CommandHeader,
        direction: GridDirection,
    },
    /// Client to server: ask for a full snapshot
    ResyncRequest { header: CommandHeader },
}

fn header(version: u32, session_uid: &str) -> CommandHeader {
    CommandHeader {
        version,
        session_uid: session_uid.to_string(),
    }
}

impl GameCommand {
    pub fn map_config(version: u32, session_uid: &str, config: MapConfig) -> Self {
        GameCommand::MapConfig {
            header: header(version, session_uid),
            config,
        }
    }

    pub fn spawn(version: u32, session_uid: &str, data: EntityData) -> Self {
        GameCommand::Spawn {
            header: header(version, session_uid),
            entity: data.into(),
        }
    }

    pub fn update(version: u32, session_uid: &str, entity_id: EntityId, cell: CellCoord) -> Self {
        GameCommand::Update {
            header: header(version, session_uid),
            entity: EntityUpdate { entity_id, cell },
        }
    }

    pub fn remove(version: u32, session_uid: &str, entity_id: EntityId) -> Self {
        GameCommand::Remove {
            header: header(version, session_uid),
            entity_id,
        }
    }

    pub fn move_input(session_uid: &str, direction: GridDirection) -> Self {
        GameCommand::MoveInput {
            header: header(0, session_uid),
            direction,
        }
    }

    pub fn resync_request(session_uid: &str) -> Self {
        GameCommand::ResyncRequest {
            header: header(0, session_uid),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            GameCommand::MapConfig { .. } => CommandKind::MapConfig,
            GameCommand::Spawn { .. } => CommandKind::Spawn,
            GameCommand::Update { .. } => CommandKind::Update,
            GameCommand::Remove { .. } => CommandKind::Remove,
            GameCommand::MoveInput { .. } => CommandKind::MoveInput,
            GameCommand::ResyncRequest { .. } => CommandKind::ResyncRequest,
        }
    }

    pub fn header(&self) -> &CommandHeader {
        match self {
            GameCommand::MapConfig { header, .. }
            | GameCommand::Spawn { header, .. }
            | GameCommand::Update { header, .. }
            | GameCommand::Remove { header, .. }
            | GameCommand::MoveInput { header, .. }
            | GameCommand::ResyncRequest { header } => header,
        }
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.header().version
    }

    #[inline]
    pub fn session_uid(&self) -> &str {
        &self.header().session_uid
    }
}

/// Encode a message using bincode's legacy (fixed-int) configuration
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

/// Encode an ordered batch as one payload
pub fn encode_batch(commands: &[GameCommand]) -> Result<Vec<u8>, EncodeError> {
    encode(&commands)
}

pub fn decode_batch(data: &[u8]) -> Result<Vec<GameCommand>, DecodeError> {
    decode(data)
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
