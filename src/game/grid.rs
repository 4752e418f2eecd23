//! Occupancy grid and the read-only view the simulation consumes

use serde::{Deserialize, Serialize};

use crate::game::constants::grid::{MAX_GRID_EDGE, MIN_CELL_SIZE};
use crate::util::Vec2;

/// Occupancy of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CellType {
    #[default]
    Empty = 0,
    Wall = 1,
    Spawn = 2,
    Goal = 3,
}

/// Integer grid coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Movement intent, one cell at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum GridDirection {
    #[default]
    None = 0,
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
}

impl GridDirection {
    /// Cell delta for this direction. Up is +Y.
    #[inline]
    pub fn delta(self) -> (i32, i32) {
        match self {
            GridDirection::None => (0, 0),
            GridDirection::Up => (0, 1),
            GridDirection::Down => (0, -1),
            GridDirection::Left => (-1, 0),
            GridDirection::Right => (1, 0),
        }
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == GridDirection::None
    }
}

/// Read-only occupancy queries used by movement and spawn resolution
pub trait GridService {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn is_wall(&self, cell: CellCoord) -> bool;

    fn in_bounds(&self, cell: CellCoord) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width() && cell.y < self.height()
    }

    fn center(&self) -> CellCoord {
        CellCoord::new(self.width() / 2, self.height() / 2)
    }

    /// First in-bounds non-wall cell in row-major order, `(0, 0)` when none exists
    fn first_empty_cell(&self) -> CellCoord {
        for y in 0..self.height() {
            for x in 0..self.width() {
                let cell = CellCoord::new(x, y);
                if !self.is_wall(cell) {
                    return cell;
                }
            }
        }
        CellCoord::default()
    }
}

/// Cells in a `width` x `height` grid, or `None` when either edge is
/// outside `1..=MAX_GRID_EDGE`
pub fn cell_count(width: i32, height: i32) -> Option<usize> {
    let edge = 1..=MAX_GRID_EDGE;
    if !edge.contains(&width) || !edge.contains(&height) {
        return None;
    }
    (width as usize).checked_mul(height as usize)
}

/// Rectangular grid of cells, stored row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMap {
    pub map_id: String,
    pub width: i32,
    pub height: i32,
    pub cell_size: f32,
    #[serde(default)]
    pub world_offset: Vec2,
    #[serde(default)]
    pub cells: Vec<CellType>,
}

impl GridMap {
    /// All-empty grid. Each edge is clamped to `1..=MAX_GRID_EDGE`.
    pub fn empty(map_id: impl Into<String>, width: i32, height: i32, cell_size: f32) -> Self {
        let width = width.clamp(1, MAX_GRID_EDGE);
        let height = height.clamp(1, MAX_GRID_EDGE);
        Self {
            map_id: map_id.into(),
            width,
            height,
            cell_size: cell_size.max(MIN_CELL_SIZE),
            world_offset: Vec2::ZERO,
            cells: vec![CellType::Empty; width as usize * height as usize],
        }
    }

    #[inline]
    fn index(&self, cell: CellCoord) -> Option<usize> {
        if self.in_bounds(cell) {
            Some((cell.y * self.width + cell.x) as usize)
        } else {
            None
        }
    }

    /// Cell contents; out-of-bounds reads are `Empty`
    pub fn cell(&self, cell: CellCoord) -> CellType {
        self.index(cell)
            .and_then(|i| self.cells.get(i).copied())
            .unwrap_or_default()
    }

    /// Returns false when the cell is out of bounds
    pub fn set_cell(&mut self, cell: CellCoord, value: CellType) -> bool {
        match self.index(cell) {
            Some(i) if i < self.cells.len() => {
                self.cells[i] = value;
                true
            }
            _ => false,
        }
    }

    /// Resize in place, keeping cells that still fit. Edges are clamped
    /// like [`GridMap::empty`].
    pub fn resize(&mut self, width: i32, height: i32, cell_size: f32) {
        let width = width.clamp(1, MAX_GRID_EDGE);
        let height = height.clamp(1, MAX_GRID_EDGE);
        let count = width as usize * height as usize;
        self.cell_size = cell_size.max(MIN_CELL_SIZE);
        if width == self.width && height == self.height && self.cells.len() == count {
            return;
        }

        let mut cells = vec![CellType::Empty; count];
        for y in 0..height.min(self.height) {
            for x in 0..width.min(self.width) {
                cells[(y * width + x) as usize] = self.cell(CellCoord::new(x, y));
            }
        }
        self.width = width;
        self.height = height;
        self.cells = cells;
    }

    /// Marks every cell whose centre lies farther than `radius` from the grid centre as a wall
    pub fn apply_circle_mask(&mut self, radius: f32) {
        if radius <= 0.0 {
            return;
        }
        let half_w = self.width as f32 * self.cell_size * 0.5;
        let half_h = self.height as f32 * self.cell_size * 0.5;
        for y in 0..self.height {
            for x in 0..self.width {
                let dx = (x as f32 + 0.5) * self.cell_size - half_w;
                let dy = (y as f32 + 0.5) * self.cell_size - half_h;
                if (dx * dx + dy * dy).sqrt() > radius {
                    self.set_cell(CellCoord::new(x, y), CellType::Wall);
                }
            }
        }
    }

    pub fn wall_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == CellType::Wall).count()
    }

    /// True when the stored cell array matches the declared dimensions
    pub fn is_consistent(&self) -> bool {
        cell_count(self.width, self.height) == Some(self.cells.len())
    }
}

impl GridService for GridMap {
    #[inline]
    fn width(&self) -> i32 {
        self.width
    }

    #[inline]
    fn height(&self) -> i32 {
        self.height
    }

    #[inline]
    fn is_wall(&self, cell: CellCoord) -> bool {
        self.cell(cell) == CellType::Wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_deltas() {
        assert_eq!(GridDirection::Up.delta(), (0, 1));
        assert_eq!(GridDirection::Down.delta(), (0, -1));
        assert_eq!(GridDirection::Left.delta(), (-1, 0));
        assert_eq!(GridDirection::Right.delta(), (1, 0));
        assert_eq!(GridDirection::None.delta(), (0, 0));
    }

    #[test]
    fn test_bounds() {
        let grid = GridMap::empty("t", 4, 3, 1.0);
        assert!(grid.in_bounds(CellCoord::new(0, 0)));
        assert!(grid.in_bounds(CellCoord::new(3, 2)));
        assert!(!grid.in_bounds(CellCoord::new(4, 0)));
        assert!(!grid.in_bounds(CellCoord::new(0, -1)));
    }

    #[test]
    fn test_out_of_bounds_reads_empty() {
        let grid = GridMap::empty("t", 2, 2, 1.0);
        assert_eq!(grid.cell(CellCoord::new(9, 9)), CellType::Empty);
        assert!(!grid.is_wall(CellCoord::new(-1, 0)));
    }

    #[test]
    fn test_first_empty_cell_row_major() {
        let mut grid = GridMap::empty("t", 3, 2, 1.0);
        grid.set_cell(CellCoord::new(0, 0), CellType::Wall);
        grid.set_cell(CellCoord::new(1, 0), CellType::Wall);
        assert_eq!(grid.first_empty_cell(), CellCoord::new(2, 0));
    }

    #[test]
    fn test_first_empty_cell_all_walls() {
        let mut grid = GridMap::empty("t", 2, 2, 1.0);
        for y in 0..2 {
            for x in 0..2 {
                grid.set_cell(CellCoord::new(x, y), CellType::Wall);
            }
        }
        assert_eq!(grid.first_empty_cell(), CellCoord::new(0, 0));
    }

    #[test]
    fn test_circle_mask_walls_corners_only() {
        let mut grid = GridMap::empty("t", 24, 24, 1.0);
        grid.apply_circle_mask(12.0);
        assert!(grid.is_wall(CellCoord::new(0, 0)));
        assert!(grid.is_wall(CellCoord::new(23, 23)));
        assert!(!grid.is_wall(grid.center()));
        assert!(!grid.is_wall(CellCoord::new(12, 1)));
    }

    #[test]
    fn test_resize_keeps_overlap() {
        let mut grid = GridMap::empty("t", 3, 3, 1.0);
        grid.set_cell(CellCoord::new(1, 1), CellType::Wall);
        grid.set_cell(CellCoord::new(2, 2), CellType::Wall);
        grid.resize(2, 4, 0.5);
        assert!(grid.is_consistent());
        assert!(grid.is_wall(CellCoord::new(1, 1)));
        assert_eq!(grid.wall_count(), 1);
        assert_eq!(grid.cell_size, 0.5);
    }
}
