//! Entity world for one game instance
//!
//! Holds player-owned entities, applies grid movement each simulation step
//! and tracks which entities changed since the last replication pass.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::grid::{CellCoord, GridDirection, GridService};

/// Entity identifier, unique within one world
pub type EntityId = u32;

/// Transport-level client identifier
pub type ClientId = u64;

/// How clients should render an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum VisualKind {
    #[default]
    Square = 1,
    Circle = 2,
}

/// Player-owned entity
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub owner: ClientId,
    pub owner_uid: String,
    pub display_name: String,
    pub color_index: u8,
    pub visual: VisualKind,
    pub cell: CellCoord,
    pub direction: GridDirection,
    /// Fractional cells accumulated towards the next move
    pub move_progress: f32,
    dirty: bool,
}

impl Entity {
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Read-only projection of an entity, used to build replication commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub id: EntityId,
    pub visual: VisualKind,
    pub owner: ClientId,
    pub owner_uid: String,
    pub display_name: String,
    pub color_index: u8,
    pub cell: CellCoord,
}

impl From<&Entity> for EntityData {
    fn from(e: &Entity) -> Self {
        Self {
            id: e.id,
            visual: e.visual,
            owner: e.owner,
            owner_uid: e.owner_uid.clone(),
            display_name: e.display_name.clone(),
            color_index: e.color_index,
            cell: e.cell,
        }
    }
}

/// Parameters for a new entity
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub owner: ClientId,
    pub owner_uid: String,
    pub display_name: String,
    pub color_index: u8,
    pub visual: VisualKind,
    pub cell: CellCoord,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("client {owner} already owns entity {existing}")]
    OwnerHasEntity { owner: ClientId, existing: EntityId },
}

/// Entities of one instance plus dirty bookkeeping
#[derive(Debug)]
pub struct EntityWorld {
    next_id: EntityId,
    entities: HashMap<EntityId, Entity>,
    by_owner: HashMap<ClientId, EntityId>,
    /// Number of entities with the dirty flag set
    dirty_count: usize,
}

impl Default for EntityWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityWorld {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entities: HashMap::new(),
            by_owner: HashMap::new(),
            dirty_count: 0,
        }
    }

    /// Create an entity at the given cell. New entities start dirty.
    pub fn spawn(&mut self, request: SpawnRequest) -> Result<EntityId, SpawnError> {
        if let Some(&existing) = self.by_owner.get(&request.owner) {
            return Err(SpawnError::OwnerHasEntity {
                owner: request.owner,
                existing,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(
            id,
            Entity {
                id,
                owner: request.owner,
                owner_uid: request.owner_uid,
                display_name: request.display_name,
                color_index: request.color_index,
                visual: request.visual,
                cell: request.cell,
                direction: GridDirection::None,
                move_progress: 0.0,
                dirty: true,
            },
        );
        self.by_owner.insert(request.owner, id);
        self.dirty_count += 1;
        Ok(id)
    }

    /// Remove an entity and its owner mapping
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.by_owner.remove(&entity.owner);
        if entity.dirty {
            self.dirty_count -= 1;
        }
        Some(entity)
    }

    /// Sets the owner's movement intent. Unknown owners are ignored.
    pub fn set_input(&mut self, owner: ClientId, direction: GridDirection) -> bool {
        let Some(id) = self.by_owner.get(&owner) else {
            return false;
        };
        match self.entities.get_mut(id) {
            Some(entity) => {
                entity.direction = direction;
                true
            }
            None => false,
        }
    }

    /// Advance movement by `dt` seconds at `move_speed` cells per second.
    ///
    /// Every whole unit of accumulated progress attempts one cell in the
    /// entity's direction. An out-of-bounds or wall target stops the attempt
    /// for this step; the consumed unit is not refunded and whatever whole
    /// units remain are discarded.
    pub fn step<G: GridService + ?Sized>(&mut self, dt: f32, move_speed: f32, grid: &G) {
        let speed = move_speed.max(0.0);
        if dt <= 0.0 || speed <= 0.0 {
            return;
        }

        for entity in self.entities.values_mut() {
            if entity.direction.is_none() {
                continue;
            }
            entity.move_progress += speed * dt;

            let (dx, dy) = entity.direction.delta();
            while entity.move_progress >= 1.0 {
                entity.move_progress -= 1.0;
                let next = entity.cell.offset(dx, dy);
                if !grid.in_bounds(next) || grid.is_wall(next) || next == entity.cell {
                    // Blocked entities never bank whole cells for later
                    entity.move_progress %= 1.0;
                    break;
                }
                entity.cell = next;
                if !entity.dirty {
                    entity.dirty = true;
                    self.dirty_count += 1;
                }
            }
        }
    }

    /// True iff at least one entity is dirty
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty_count > 0
    }

    /// Replace `out` with the ids of dirty entities, ascending
    pub fn collect_dirty(&self, out: &mut Vec<EntityId>) {
        out.clear();
        out.extend(self.entities.values().filter(|e| e.dirty).map(|e| e.id));
        out.sort_unstable();
    }

    /// Replace `out` with every entity id, ascending
    pub fn collect_all(&self, out: &mut Vec<EntityId>) {
        out.clear();
        out.extend(self.entities.keys().copied());
        out.sort_unstable();
    }

    pub fn clear_dirty(&mut self) {
        for entity in self.entities.values_mut() {
            entity.dirty = false;
        }
        self.dirty_count = 0;
    }

    pub fn entity_data(&self, id: EntityId) -> Option<EntityData> {
        self.entities.get(&id).map(EntityData::from)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_for_owner(&self, owner: ClientId) -> Option<EntityId> {
        self.by_owner.get(&owner).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop all entities. Ids keep increasing.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.by_owner.clear();
        self.dirty_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::{CellType, GridMap};

    fn request(owner: ClientId, x: i32, y: i32) -> SpawnRequest {
        SpawnRequest {
            owner,
            owner_uid: format!("uid-{}", owner),
            display_name: format!("Player {}", owner),
            color_index: 0,
            visual: VisualKind::Square,
            cell: CellCoord::new(x, y),
        }
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut world = EntityWorld::new();
        let a = world.spawn(request(1, 0, 0)).unwrap();
        let b = world.spawn(request(2, 1, 0)).unwrap();
        world.remove(a);
        let c = world.spawn(request(3, 2, 0)).unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn test_one_entity_per_owner() {
        let mut world = EntityWorld::new();
        let id = world.spawn(request(7, 0, 0)).unwrap();
        assert_eq!(
            world.spawn(request(7, 1, 1)),
            Err(SpawnError::OwnerHasEntity { owner: 7, existing: id })
        );
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn test_spawn_marks_dirty() {
        let mut world = EntityWorld::new();
        let id = world.spawn(request(1, 0, 0)).unwrap();
        assert!(world.is_dirty());
        let mut dirty = Vec::new();
        world.collect_dirty(&mut dirty);
        assert_eq!(dirty, vec![id]);
        world.clear_dirty();
        assert!(!world.is_dirty());
    }

    #[test]
    fn test_step_moves_one_cell_per_whole_progress() {
        let grid = GridMap::empty("t", 10, 10, 1.0);
        let mut world = EntityWorld::new();
        let id = world.spawn(request(1, 2, 2)).unwrap();
        world.clear_dirty();
        world.set_input(1, GridDirection::Right);

        // 5 cells/s at 60 Hz: 12 steps per cell
        for _ in 0..11 {
            world.step(1.0 / 60.0, 5.0, &grid);
        }
        assert_eq!(world.get(id).unwrap().cell, CellCoord::new(2, 2));
        assert!(!world.is_dirty());

        world.step(1.0 / 60.0, 5.0, &grid);
        world.step(1.0 / 60.0, 5.0, &grid);
        assert_eq!(world.get(id).unwrap().cell, CellCoord::new(3, 2));
        assert!(world.is_dirty());
    }

    #[test]
    fn test_step_large_dt_moves_several_cells() {
        let grid = GridMap::empty("t", 10, 10, 1.0);
        let mut world = EntityWorld::new();
        let id = world.spawn(request(1, 0, 0)).unwrap();
        world.set_input(1, GridDirection::Up);
        world.step(0.5, 6.0, &grid);
        assert_eq!(world.get(id).unwrap().cell, CellCoord::new(0, 3));
    }

    #[test]
    fn test_step_blocked_by_bounds() {
        let grid = GridMap::empty("t", 3, 3, 1.0);
        let mut world = EntityWorld::new();
        let id = world.spawn(request(1, 0, 0)).unwrap();
        world.clear_dirty();
        world.set_input(1, GridDirection::Left);
        world.step(1.0, 5.0, &grid);
        assert_eq!(world.get(id).unwrap().cell, CellCoord::new(0, 0));
        assert!(!world.is_dirty());
    }

    #[test]
    fn test_step_blocked_by_wall() {
        let mut grid = GridMap::empty("t", 5, 5, 1.0);
        grid.set_cell(CellCoord::new(2, 1), CellType::Wall);
        let mut world = EntityWorld::new();
        let id = world.spawn(request(1, 0, 1)).unwrap();
        world.set_input(1, GridDirection::Right);
        world.step(1.0, 5.0, &grid);
        assert_eq!(world.get(id).unwrap().cell, CellCoord::new(1, 1));
    }

    #[test]
    fn test_blocked_entity_does_not_bank_progress() {
        let grid = GridMap::empty("t", 10, 10, 1.0);
        let mut world = EntityWorld::new();
        let id = world.spawn(request(1, 0, 5)).unwrap();
        world.set_input(1, GridDirection::Left);
        // 2.5 cells per step against the boundary
        for _ in 0..8 {
            world.step(0.5, 5.0, &grid);
            assert!(world.get(id).unwrap().move_progress < 1.0);
        }

        world.set_input(1, GridDirection::Right);
        world.step(0.5, 5.0, &grid);
        let entity = world.get(id).unwrap();
        assert!(entity.cell.x <= 3, "jumped to {:?}", entity.cell);
    }

    #[test]
    fn test_negative_speed_is_clamped() {
        let grid = GridMap::empty("t", 5, 5, 1.0);
        let mut world = EntityWorld::new();
        let id = world.spawn(request(1, 2, 2)).unwrap();
        world.set_input(1, GridDirection::Down);
        world.step(1.0, -5.0, &grid);
        assert_eq!(world.get(id).unwrap().cell, CellCoord::new(2, 2));
        assert_eq!(world.get(id).unwrap().move_progress, 0.0);
    }

    #[test]
    fn test_set_input_unknown_owner_is_noop() {
        let mut world = EntityWorld::new();
        assert!(!world.set_input(99, GridDirection::Up));
    }

    #[test]
    fn test_remove_dirty_entity_keeps_flag_consistent() {
        let mut world = EntityWorld::new();
        let a = world.spawn(request(1, 0, 0)).unwrap();
        assert!(world.is_dirty());
        world.remove(a);
        assert!(!world.is_dirty());
        assert!(world.entity_for_owner(1).is_none());
        assert!(world.entity_data(a).is_none());
    }

    #[test]
    fn test_collect_all_sorted() {
        let mut world = EntityWorld::new();
        for owner in 1..=5 {
            world.spawn(request(owner, owner as i32, 0)).unwrap();
        }
        let mut ids = Vec::new();
        world.collect_all(&mut ids);
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }
}
