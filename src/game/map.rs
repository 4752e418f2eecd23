//! Map configuration and cell/world coordinate conversion

use serde::{Deserialize, Serialize};

use crate::game::constants::grid::{FNV_OFFSET_BASIS, FNV_PRIME, MIN_CELL_SIZE, SEED_OFFSET_SCALE};
use crate::game::grid::CellCoord;
use crate::util::Vec2;

/// Arena outline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MapShape {
    #[default]
    Rect = 0,
    Circle = 1,
}

/// Everything a client needs to lay out an instance's grid in world space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub map_name: String,
    pub shape: MapShape,
    /// World extent (x = width, y = depth)
    pub map_size: Vec2,
    pub circle_radius: f32,
    pub grid_width: i32,
    pub grid_height: i32,
    pub cell_size: f32,
    pub world_offset: Vec2,
    pub seed: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            map_name: String::new(),
            shape: MapShape::Rect,
            map_size: Vec2::ZERO,
            circle_radius: 0.0,
            grid_width: 0,
            grid_height: 0,
            cell_size: 1.0,
            world_offset: Vec2::ZERO,
            seed: 0,
        }
    }
}

impl MapConfig {
    #[inline]
    fn effective_cell_size(&self) -> f32 {
        self.cell_size.max(MIN_CELL_SIZE)
    }

    /// World position of the grid's minimum corner
    pub fn origin(&self) -> Vec2 {
        let cs = self.effective_cell_size();
        self.world_offset
            - Vec2::new(
                self.grid_width as f32 * cs * 0.5,
                self.grid_height as f32 * cs * 0.5,
            )
    }

    /// Centre of `cell` in world space
    pub fn cell_to_world(&self, cell: CellCoord) -> Vec2 {
        let cs = self.effective_cell_size();
        self.origin() + Vec2::new((cell.x as f32 + 0.5) * cs, (cell.y as f32 + 0.5) * cs)
    }

    /// Cell containing `world`. May be out of bounds.
    pub fn world_to_cell(&self, world: Vec2) -> CellCoord {
        let cs = self.effective_cell_size();
        let local = world - self.origin();
        CellCoord::new((local.x / cs).floor() as i32, (local.y / cs).floor() as i32)
    }

    pub fn in_bounds(&self, cell: CellCoord) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.grid_width && cell.y < self.grid_height
    }

    /// Clamp a world position into the map shrunk by `margin`.
    /// Circle maps clamp to the radius, rect maps to the grid rectangle.
    pub fn clamp_to_map(&self, position: Vec2, margin: f32) -> Vec2 {
        if self.shape == MapShape::Circle && self.circle_radius > 0.0 {
            let limit = (self.circle_radius - margin).max(0.0);
            let delta = position - self.world_offset;
            let distance = delta.length();
            if distance <= limit || distance <= f32::EPSILON {
                return position;
            }
            return self.world_offset + delta * (limit / distance);
        }

        let cs = self.effective_cell_size();
        let min = self.origin() + Vec2::new(margin, margin);
        let max = self.origin()
            + Vec2::new(
                self.grid_width as f32 * cs - margin,
                self.grid_height as f32 * cs - margin,
            );
        if min.x > max.x || min.y > max.y {
            return self.world_offset;
        }
        position.clamp(min, max)
    }

    /// Fill in grid dimensions or map size when one side of the pair is missing.
    ///
    /// Grid dimensions are derived from map size when non-positive; map size
    /// is derived from the grid when it is near zero.
    pub fn normalize_dimensions(&mut self) {
        let cs = self.effective_cell_size();
        self.cell_size = cs;
        if self.grid_width <= 0 && self.map_size.x > 0.0 {
            self.grid_width = (self.map_size.x / cs).ceil().max(1.0) as i32;
        }
        if self.grid_height <= 0 && self.map_size.y > 0.0 {
            self.grid_height = (self.map_size.y / cs).ceil().max(1.0) as i32;
        }
        if self.map_size.x.abs() < f32::EPSILON && self.grid_width > 0 {
            self.map_size.x = self.grid_width as f32 * cs;
        }
        if self.map_size.y.abs() < f32::EPSILON && self.grid_height > 0 {
            self.map_size.y = self.grid_height as f32 * cs;
        }
    }
}

/// Deterministic map seed from a session UID and its world offset.
///
/// FNV-1a over the UID bytes, then both offset components (scaled and
/// rounded) are mixed in the same way.
pub fn compute_seed(session_uid: &str, world_offset: Vec2) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in session_uid.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for component in [world_offset.x, world_offset.y] {
        hash ^= (component * SEED_OFFSET_SCALE).round() as i32 as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
