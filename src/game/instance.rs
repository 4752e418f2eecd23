//! One running game: map, grid, entity world, roster and state version

use std::sync::Arc;

use crate::game::grid::{CellCoord, GridMap, GridService};
use crate::game::map::MapConfig;
use crate::game::modes::GameMode;
use crate::game::world::{ClientId, EntityId, EntityWorld, SpawnError, SpawnRequest};
use crate::net::protocol::GameCommand;

/// A player's seat in an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSeat {
    pub client_id: ClientId,
    pub client_uid: String,
    pub display_name: String,
}

pub struct GameInstance {
    session_name: String,
    session_uid: String,
    mode: Arc<dyn GameMode>,
    map_config: MapConfig,
    grid: GridMap,
    world: EntityWorld,
    /// Roster in join order
    players: Vec<ClientId>,
    version: u32,
}

impl GameInstance {
    /// New instance at version 1 with no players
    pub fn new(
        session_name: impl Into<String>,
        session_uid: impl Into<String>,
        mode: Arc<dyn GameMode>,
        map_config: MapConfig,
        grid: GridMap,
    ) -> Self {
        Self {
            session_name: session_name.into(),
            session_uid: session_uid.into(),
            mode,
            map_config,
            grid,
            world: EntityWorld::new(),
            players: Vec::new(),
            version: 1,
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn session_uid(&self) -> &str {
        &self.session_uid
    }

    pub fn mode(&self) -> &Arc<dyn GameMode> {
        &self.mode
    }

    pub fn map_config(&self) -> &MapConfig {
        &self.map_config
    }

    pub fn grid(&self) -> &GridMap {
        &self.grid
    }

    pub fn world(&self) -> &EntityWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut EntityWorld {
        &mut self.world
    }

    pub fn players(&self) -> &[ClientId] {
        &self.players
    }

    pub fn has_player(&self, client_id: ClientId) -> bool {
        self.players.contains(&client_id)
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Increment and return the new version
    pub fn bump_version(&mut self) -> u32 {
        self.version = self.version.wrapping_add(1).max(1);
        self.version
    }

    /// One fixed simulation step
    pub fn step(&mut self, dt: f32) {
        self.world.step(dt, self.mode.move_speed(), &self.grid);
    }

    /// Validated spawn cell for the `player_index`-th of `total_players`
    pub fn spawn_cell(&self, player_index: usize, total_players: usize) -> CellCoord {
        let proposed = self.mode.spawn_position(player_index, total_players, &self.map_config);
        resolve_spawn_cell(&self.grid, self.map_config.world_to_cell(proposed))
    }

    /// Add `seat` to the roster and spawn its entity.
    ///
    /// The colour index is the join index. Nothing changes on error.
    pub fn add_player(
        &mut self,
        seat: &PlayerSeat,
        player_index: usize,
        total_players: usize,
    ) -> Result<EntityId, SpawnError> {
        let cell = self.spawn_cell(player_index, total_players);
        let display_name = if seat.display_name.trim().is_empty() {
            format!("Player {}", seat.client_id)
        } else {
            seat.display_name.clone()
        };
        let id = self.world.spawn(SpawnRequest {
            owner: seat.client_id,
            owner_uid: seat.client_uid.clone(),
            display_name,
            color_index: (player_index % u8::MAX as usize) as u8,
            visual: self.mode.visual_kind(),
            cell,
        })?;
        if !self.players.contains(&seat.client_id) {
            self.players.push(seat.client_id);
        }
        Ok(id)
    }

    /// Drop `client_id` from the roster and remove its entity, if any.
    /// Returns the removed entity id.
    pub fn remove_player(&mut self, client_id: ClientId) -> Option<EntityId> {
        self.players.retain(|c| *c != client_id);
        let id = self.world.entity_for_owner(client_id)?;
        self.world.remove(id);
        Some(id)
    }

    pub fn spawn_command(&self, id: EntityId, version: u32) -> Option<GameCommand> {
        self.world
            .entity_data(id)
            .map(|data| GameCommand::spawn(version, &self.session_uid, data))
    }

    pub fn update_command(&self, id: EntityId, version: u32) -> Option<GameCommand> {
        self.world
            .get(id)
            .map(|e| GameCommand::update(version, &self.session_uid, id, e.cell))
    }

    pub fn remove_command(&self, id: EntityId, version: u32) -> GameCommand {
        GameCommand::remove(version, &self.session_uid, id)
    }

    pub fn map_config_command(&self, version: u32) -> GameCommand {
        GameCommand::map_config(version, &self.session_uid, self.map_config.clone())
    }

    /// Full state at the current version: optional map config, then one
    /// spawn per live entity in ascending id order
    pub fn snapshot_commands(&self, include_map_config: bool) -> Vec<GameCommand> {
        let version = self.version;
        let mut ids = Vec::with_capacity(self.world.len());
        self.world.collect_all(&mut ids);

        let mut commands = Vec::with_capacity(ids.len() + 1);
        if include_map_config {
            commands.push(self.map_config_command(version));
        }
        commands.extend(ids.iter().filter_map(|id| self.spawn_command(*id, version)));
        commands
    }
}

/// Out-of-bounds proposals fall back to the grid centre; a wall at the
/// resulting cell falls back to the first empty cell.
pub fn resolve_spawn_cell<G: GridService + ?Sized>(grid: &G, proposed: CellCoord) -> CellCoord {
    let mut cell = proposed;
    if !grid.in_bounds(cell) {
        cell = grid.center();
    }
    if grid.is_wall(cell) {
        cell = grid.first_empty_cell();
    }
    cell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::CellType;
    use crate::game::modes::SquareMode;
    use crate::net::protocol::CommandKind;
    use crate::util::Vec2;

    fn instance() -> GameInstance {
        let mode: Arc<dyn GameMode> = Arc::new(SquareMode::default());
        let config = mode.build_map_config(Vec2::ZERO, 1);
        let grid = GridMap::empty("square-game", config.grid_width, config.grid_height, config.cell_size);
        GameInstance::new("lobby", "uid-1", mode, config, grid)
    }

    fn seat(client_id: ClientId) -> PlayerSeat {
        PlayerSeat {
            client_id,
            client_uid: format!("client-{}", client_id),
            display_name: String::new(),
        }
    }

    #[test]
    fn test_version_starts_at_one() {
        let mut inst = instance();
        assert_eq!(inst.version(), 1);
        assert_eq!(inst.bump_version(), 2);
    }

    #[test]
    fn test_add_player_uses_join_index_for_colour_and_corner() {
        let mut inst = instance();
        inst.add_player(&seat(10), 0, 2).unwrap();
        let id = inst.add_player(&seat(11), 1, 2).unwrap();
        let entity = inst.world().get(id).unwrap();
        assert_eq!(entity.color_index, 1);
        assert_eq!(entity.cell, CellCoord::new(19, 0));
        assert_eq!(entity.display_name, "Player 11");
        assert_eq!(inst.players(), &[10, 11]);
    }

    #[test]
    fn test_resolve_spawn_out_of_bounds_uses_centre() {
        let grid = GridMap::empty("t", 10, 10, 1.0);
        assert_eq!(resolve_spawn_cell(&grid, CellCoord::new(-3, 40)), CellCoord::new(5, 5));
    }

    #[test]
    fn test_resolve_spawn_wall_uses_first_empty() {
        let mut grid = GridMap::empty("t", 3, 3, 1.0);
        grid.set_cell(CellCoord::new(1, 1), CellType::Wall);
        grid.set_cell(CellCoord::new(0, 0), CellType::Wall);
        assert_eq!(resolve_spawn_cell(&grid, CellCoord::new(1, 1)), CellCoord::new(1, 0));
        // centre is a wall too
        assert_eq!(resolve_spawn_cell(&grid, CellCoord::new(9, 9)), CellCoord::new(1, 0));
    }

    #[test]
    fn test_snapshot_commands() {
        let mut inst = instance();
        inst.add_player(&seat(1), 0, 2).unwrap();
        inst.add_player(&seat(2), 1, 2).unwrap();
        inst.bump_version();

        let snapshot = inst.snapshot_commands(true);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].kind(), CommandKind::MapConfig);
        assert!(snapshot.iter().all(|c| c.version() == 2));
        assert!(snapshot.iter().all(|c| c.session_uid() == "uid-1"));

        let without_map = inst.snapshot_commands(false);
        assert!(without_map.iter().all(|c| c.kind() == CommandKind::Spawn));
    }

    #[test]
    fn test_remove_player_without_entity() {
        let mut inst = instance();
        inst.add_player(&seat(1), 0, 1).unwrap();
        inst.world_mut().clear();
        assert_eq!(inst.remove_player(1), None);
        assert!(!inst.has_player(1));
    }
}
