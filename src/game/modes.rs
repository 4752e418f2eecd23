//! Game mode plug-ins and the registry that resolves them by id

use std::sync::Arc;

use hashbrown::HashMap;

use crate::game::constants::{circle, square};
use crate::game::grid::CellCoord;
use crate::game::map::{MapConfig, MapShape};
use crate::game::world::VisualKind;
use crate::util::Vec2;

/// Rules and map layout for one kind of game
pub trait GameMode: Send + Sync {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn min_players(&self) -> usize;
    fn max_players(&self) -> usize;
    /// Cells per second
    fn move_speed(&self) -> f32;
    fn visual_kind(&self) -> VisualKind;

    /// Fraction of cells turned into walls when no stored layout exists
    fn wall_density(&self) -> f32 {
        0.0
    }

    /// Map for an instance centred on `world_offset`
    fn build_map_config(&self, world_offset: Vec2, seed: u32) -> MapConfig;

    /// Proposed world position for the `player_index`-th of `total_players`.
    /// Callers validate it against the grid.
    fn spawn_position(&self, player_index: usize, total_players: usize, config: &MapConfig) -> Vec2;

    /// Called when an instance using this mode is destroyed
    fn cleanup(&self, _session_name: &str) {}
}

/// Rectangular arena with corner spawns
#[derive(Debug, Clone)]
pub struct SquareMode {
    pub grid_width: i32,
    pub grid_height: i32,
    pub cell_size: f32,
    pub move_speed: f32,
    pub wall_density: f32,
}

impl Default for SquareMode {
    fn default() -> Self {
        Self {
            grid_width: square::GRID_WIDTH,
            grid_height: square::GRID_HEIGHT,
            cell_size: square::CELL_SIZE,
            move_speed: square::MOVE_SPEED,
            wall_density: 0.0,
        }
    }
}

impl GameMode for SquareMode {
    fn id(&self) -> &str {
        square::ID
    }

    fn display_name(&self) -> &str {
        square::DISPLAY_NAME
    }

    fn min_players(&self) -> usize {
        square::MIN_PLAYERS
    }

    fn max_players(&self) -> usize {
        square::MAX_PLAYERS
    }

    fn move_speed(&self) -> f32 {
        self.move_speed
    }

    fn visual_kind(&self) -> VisualKind {
        VisualKind::Square
    }

    fn wall_density(&self) -> f32 {
        self.wall_density
    }

    fn build_map_config(&self, world_offset: Vec2, seed: u32) -> MapConfig {
        let width = self.grid_width.max(1);
        let height = self.grid_height.max(1);
        MapConfig {
            map_name: square::ID.to_string(),
            shape: MapShape::Rect,
            map_size: Vec2::new(width as f32 * self.cell_size, height as f32 * self.cell_size),
            circle_radius: 0.0,
            grid_width: width,
            grid_height: height,
            cell_size: self.cell_size,
            world_offset,
            seed,
        }
    }

    /// Corners for up to four players, otherwise an ellipse around the centre
    fn spawn_position(&self, player_index: usize, total_players: usize, config: &MapConfig) -> Vec2 {
        let max_x = (config.grid_width - 1).max(0);
        let max_y = (config.grid_height - 1).max(0);

        let cell = if total_players <= 4 {
            match player_index % 4 {
                0 => CellCoord::new(0, 0),
                1 => CellCoord::new(max_x, 0),
                2 => CellCoord::new(0, max_y),
                _ => CellCoord::new(max_x, max_y),
            }
        } else {
            let angle = player_index as f32 / total_players as f32 * std::f32::consts::TAU;
            let rx = max_x as f32 * square::SPAWN_RING_FRACTION;
            let ry = max_y as f32 * square::SPAWN_RING_FRACTION;
            let cx = max_x as f32 * 0.5;
            let cy = max_y as f32 * 0.5;
            CellCoord::new(
                ((cx + angle.cos() * rx).round() as i32).clamp(0, max_x),
                ((cy + angle.sin() * ry).round() as i32).clamp(0, max_y),
            )
        };
        config.cell_to_world(cell)
    }
}

/// Round arena; cells outside the radius are walls
#[derive(Debug, Clone)]
pub struct CircleMode {
    pub radius: f32,
    pub cell_size: f32,
    pub move_speed: f32,
}

impl Default for CircleMode {
    fn default() -> Self {
        Self {
            radius: circle::RADIUS,
            cell_size: circle::CELL_SIZE,
            move_speed: circle::MOVE_SPEED,
        }
    }
}

impl GameMode for CircleMode {
    fn id(&self) -> &str {
        circle::ID
    }

    fn display_name(&self) -> &str {
        circle::DISPLAY_NAME
    }

    fn min_players(&self) -> usize {
        circle::MIN_PLAYERS
    }

    fn max_players(&self) -> usize {
        circle::MAX_PLAYERS
    }

    fn move_speed(&self) -> f32 {
        self.move_speed
    }

    fn visual_kind(&self) -> VisualKind {
        VisualKind::Circle
    }

    fn build_map_config(&self, world_offset: Vec2, seed: u32) -> MapConfig {
        let diameter = self.radius.max(0.0) * 2.0;
        let cells = (diameter / self.cell_size).ceil().max(1.0) as i32;
        MapConfig {
            map_name: circle::ID.to_string(),
            shape: MapShape::Circle,
            map_size: Vec2::new(diameter, diameter),
            circle_radius: self.radius,
            grid_width: cells,
            grid_height: cells,
            cell_size: self.cell_size,
            world_offset,
            seed,
        }
    }

    /// Evenly spaced on a ring inside the arena
    fn spawn_position(&self, player_index: usize, total_players: usize, config: &MapConfig) -> Vec2 {
        let total = total_players.max(1);
        let angle = player_index as f32 / total as f32 * std::f32::consts::TAU;
        let ring = config.circle_radius * circle::SPAWN_RING_FRACTION;
        let raw = config.world_offset + Vec2::from_angle(angle) * ring;
        // Half a cell of margin keeps the snapped cell inside the mask
        let inside = config.clamp_to_map(raw, config.cell_size * 0.5);
        config.cell_to_world(config.world_to_cell(inside))
    }
}

/// Modes registered by id
#[derive(Default)]
pub struct ModeRegistry {
    modes: HashMap<String, Arc<dyn GameMode>>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the square and circle arenas
    pub fn with_builtin_modes() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SquareMode::default()));
        registry.register(Arc::new(CircleMode::default()));
        registry
    }

    /// Returns false if a mode with the same id is already registered
    pub fn register(&mut self, mode: Arc<dyn GameMode>) -> bool {
        let id = mode.id().to_string();
        if self.modes.contains_key(&id) {
            return false;
        }
        self.modes.insert(id, mode);
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn GameMode>> {
        self.modes.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modes.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modes.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_registry_builtin_modes() {
        let registry = ModeRegistry::with_builtin_modes();
        assert_eq!(registry.ids(), vec!["circle-game".to_string(), "square-game".to_string()]);
        assert!(registry.get("square-game").is_some());
        assert!(registry.get("hexagon").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_id() {
        let mut registry = ModeRegistry::with_builtin_modes();
        assert!(!registry.register(Arc::new(SquareMode::default())));
    }

    #[test]
    fn test_square_map_config() {
        let mode = SquareMode::default();
        let config = mode.build_map_config(Vec2::new(50.0, 0.0), 9);
        assert_eq!((config.grid_width, config.grid_height), (20, 15));
        assert_eq!(config.shape, MapShape::Rect);
        assert_eq!(config.world_offset, Vec2::new(50.0, 0.0));
        assert_eq!(config.seed, 9);
    }

    #[test]
    fn test_square_corner_spawns() {
        let mode = SquareMode::default();
        let config = mode.build_map_config(Vec2::ZERO, 0);
        let cells: Vec<_> = (0..4)
            .map(|i| config.world_to_cell(mode.spawn_position(i, 4, &config)))
            .collect();
        assert_eq!(
            cells,
            vec![
                CellCoord::new(0, 0),
                CellCoord::new(19, 0),
                CellCoord::new(0, 14),
                CellCoord::new(19, 14)
            ]
        );
    }

    #[test]
    fn test_square_ellipse_spawns_stay_in_bounds() {
        let mode = SquareMode::default();
        let config = mode.build_map_config(Vec2::ZERO, 0);
        for i in 0..8 {
            let cell = config.world_to_cell(mode.spawn_position(i, 8, &config));
            assert!(config.in_bounds(cell), "spawn {} out of bounds: {:?}", i, cell);
        }
    }

    #[test]
    fn test_circle_map_config() {
        let mode = CircleMode::default();
        let config = mode.build_map_config(Vec2::ZERO, 0);
        assert_eq!((config.grid_width, config.grid_height), (24, 24));
        assert_eq!(config.shape, MapShape::Circle);
        assert!((config.circle_radius - 12.0).abs() < EPSILON);
    }

    #[test]
    fn test_circle_spawn_on_ring() {
        let mode = CircleMode::default();
        let offset = Vec2::new(100.0, 0.0);
        let config = mode.build_map_config(offset, 0);
        for i in 0..4 {
            let pos = mode.spawn_position(i, 4, &config);
            let distance = pos.distance_to(offset);
            assert!(distance < config.circle_radius, "spawn {} outside arena", i);
            assert!(config.in_bounds(config.world_to_cell(pos)));
        }
    }
}
