//! Presentation binding for replicated entities
//!
//! [`EntityView`] is what the reconciliation client drives once a command
//! has passed version checks. [`ViewWorld`] is the in-memory implementation
//! used by headless clients and tests.

use hashbrown::HashMap;

use crate::game::grid::CellCoord;
use crate::game::world::{ClientId, EntityId, VisualKind};
use crate::net::protocol::EntitySpawn;
use crate::util::Vec2;

/// Consumer of applied replication commands
pub trait EntityView {
    /// Create the entity, or refresh it if it already exists
    fn spawn(&mut self, entity: &EntitySpawn, position: Vec2);
    /// Returns false for unknown entities
    fn update(&mut self, entity_id: EntityId, cell: CellCoord, position: Vec2) -> bool;
    /// Returns false for unknown entities
    fn remove(&mut self, entity_id: EntityId) -> bool;
    /// Drop everything; a new map means a new world
    fn clear(&mut self);
}

/// Materialized copy of one replicated entity
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEntity {
    pub entity_id: EntityId,
    pub owner: ClientId,
    pub display_name: String,
    pub color_index: u8,
    pub visual: VisualKind,
    pub cell: CellCoord,
    /// World-space centre of `cell`
    pub position: Vec2,
}

#[derive(Debug, Default)]
pub struct ViewWorld {
    local_client: Option<ClientId>,
    entities: HashMap<EntityId, ViewEntity>,
}

impl ViewWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// View that can tell which entity belongs to `client_id`
    pub fn for_client(client_id: ClientId) -> Self {
        Self {
            local_client: Some(client_id),
            entities: HashMap::new(),
        }
    }

    pub fn get(&self, entity_id: EntityId) -> Option<&ViewEntity> {
        self.entities.get(&entity_id)
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.entities.contains_key(&entity_id)
    }

    /// The local client's own entity, if spawned
    pub fn local_entity(&self) -> Option<&ViewEntity> {
        let local = self.local_client?;
        self.entities.values().find(|e| e.owner == local)
    }

    /// Entity ids, ascending
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityView for ViewWorld {
    fn spawn(&mut self, entity: &EntitySpawn, position: Vec2) {
        self.entities.insert(
            entity.entity_id,
            ViewEntity {
                entity_id: entity.entity_id,
                owner: entity.owner_client_id,
                display_name: entity.display_name.clone(),
                color_index: entity.color_index,
                visual: entity.visual,
                cell: entity.cell,
                position,
            },
        );
    }

    fn update(&mut self, entity_id: EntityId, cell: CellCoord, position: Vec2) -> bool {
        match self.entities.get_mut(&entity_id) {
            Some(view) => {
                view.cell = cell;
                view.position = position;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, entity_id: EntityId) -> bool {
        self.entities.remove(&entity_id).is_some()
    }

    fn clear(&mut self) {
        self.entities.clear();
    }
}
