//! Named grid layouts loaded from JSON, with seeded procedural fallback

use std::fs;
use std::path::Path;

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::game::constants::grid::MAX_WALL_DENSITY;
use crate::game::constants::grid::MAX_GRID_EDGE;
use crate::game::grid::{cell_count, CellCoord, CellType, GridMap};
use crate::util::Vec2;

/// Failures while loading grid layouts
#[derive(Debug, thiserror::Error)]
pub enum GridLoadError {
    #[error("failed to read grid layout: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed grid layout: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid grid layout '{map_id}': {reason}")]
    Invalid { map_id: String, reason: String },
}

/// Layouts keyed by map id
#[derive(Debug, Default)]
pub struct GridRepository {
    layouts: HashMap<String, GridMap>,
}

impl GridRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, grid: GridMap) {
        self.layouts.insert(grid.map_id.clone(), grid);
    }

    pub fn get(&self, map_id: &str) -> Option<&GridMap> {
        self.layouts.get(map_id)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Parse one layout and store it. Returns the map id.
    ///
    /// A layout with no cells is treated as all-empty.
    pub fn load_json_str(&mut self, json: &str) -> Result<String, GridLoadError> {
        let mut grid: GridMap = serde_json::from_str(json)?;
        if grid.map_id.trim().is_empty() {
            return Err(GridLoadError::Invalid {
                map_id: grid.map_id,
                reason: "empty map id".into(),
            });
        }
        let Some(expected) = cell_count(grid.width, grid.height) else {
            return Err(GridLoadError::Invalid {
                reason: format!(
                    "dimensions {}x{} outside 1..={}",
                    grid.width, grid.height, MAX_GRID_EDGE
                ),
                map_id: grid.map_id,
            });
        };
        if grid.cells.is_empty() {
            grid.cells = vec![CellType::Empty; expected];
        }
        if grid.cells.len() != expected {
            return Err(GridLoadError::Invalid {
                reason: format!("expected {} cells, found {}", expected, grid.cells.len()),
                map_id: grid.map_id,
            });
        }

        let map_id = grid.map_id.clone();
        debug!("Loaded grid '{}' ({}x{})", map_id, grid.width, grid.height);
        self.insert(grid);
        Ok(map_id)
    }

    /// Load every `*.json` file in `dir`. Files that fail to parse are skipped.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, GridLoadError> {
        let mut loaded = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            match self.load_json_str(&text) {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Skipping grid layout {}: {}", path.display(), e),
            }
        }
        info!("Loaded {} grid layouts from {}", loaded, dir.display());
        Ok(loaded)
    }

    /// Stored layout resized to the requested dimensions, or a seeded procedural grid.
    ///
    /// Procedural wall density is clamped to `[0, MAX_WALL_DENSITY]`, so the
    /// same seed always yields the same layout.
    pub fn load_or_generate(
        &self,
        map_id: &str,
        width: i32,
        height: i32,
        cell_size: f32,
        world_offset: Vec2,
        seed: u32,
        wall_density: f32,
    ) -> GridMap {
        if let Some(stored) = self.layouts.get(map_id) {
            let mut grid = stored.clone();
            grid.resize(width, height, cell_size);
            grid.world_offset = world_offset;
            return grid;
        }

        let mut grid = GridMap::empty(map_id, width, height, cell_size);
        grid.world_offset = world_offset;
        let density = wall_density.clamp(0.0, MAX_WALL_DENSITY);
        if density > 0.0 {
            let mut rng = StdRng::seed_from_u64(seed as u64);
            for y in 0..grid.height {
                for x in 0..grid.width {
                    if rng.gen::<f32>() < density {
                        grid.set_cell(CellCoord::new(x, y), CellType::Wall);
                    }
                }
            }
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::GridService;

    #[test]
    fn test_load_json_layout() {
        let mut repo = GridRepository::new();
        let json = r#"{
            "map_id": "tiny",
            "width": 2,
            "height": 2,
            "cell_size": 1.0,
            "cells": ["Empty", "Wall", "Empty", "Goal"]
        }"#;
        let id = repo.load_json_str(json).unwrap();
        assert_eq!(id, "tiny");
        let grid = repo.get("tiny").unwrap();
        assert!(grid.is_wall(CellCoord::new(1, 0)));
        assert_eq!(grid.cell(CellCoord::new(1, 1)), CellType::Goal);
    }

    #[test]
    fn test_load_json_without_cells_is_empty() {
        let mut repo = GridRepository::new();
        repo.load_json_str(r#"{"map_id":"open","width":3,"height":2,"cell_size":1.0}"#)
            .unwrap();
        assert_eq!(repo.get("open").unwrap().cells.len(), 6);
    }

    #[test]
    fn test_load_json_rejects_cell_count_mismatch() {
        let mut repo = GridRepository::new();
        let err = repo
            .load_json_str(r#"{"map_id":"bad","width":2,"height":2,"cell_size":1.0,"cells":["Wall"]}"#)
            .unwrap_err();
        assert!(matches!(err, GridLoadError::Invalid { .. }));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_load_json_rejects_oversized_or_negative_dimensions() {
        let mut repo = GridRepository::new();
        for (width, height) in [(100_000, 100_000), (MAX_GRID_EDGE + 1, 1), (-3, 4), (4, 0)] {
            let json = format!(
                r#"{{"map_id":"huge","width":{},"height":{},"cell_size":1.0}}"#,
                width, height
            );
            let err = repo.load_json_str(&json).unwrap_err();
            assert!(matches!(err, GridLoadError::Invalid { .. }), "{}x{}", width, height);
        }
        assert!(repo.is_empty());
    }

    #[test]
    fn test_oversized_request_is_clamped() {
        let repo = GridRepository::new();
        let grid = repo.load_or_generate("gen", i32::MAX, i32::MAX, 1.0, Vec2::ZERO, 1, 0.0);
        assert_eq!((grid.width, grid.height), (MAX_GRID_EDGE, MAX_GRID_EDGE));
        assert!(grid.is_consistent());
    }

    #[test]
    fn test_load_json_rejects_garbage() {
        let mut repo = GridRepository::new();
        assert!(matches!(
            repo.load_json_str("not json"),
            Err(GridLoadError::Parse(_))
        ));
    }

    #[test]
    fn test_generate_is_seed_deterministic() {
        let repo = GridRepository::new();
        let a = repo.load_or_generate("gen", 20, 15, 1.0, Vec2::ZERO, 42, 0.2);
        let b = repo.load_or_generate("gen", 20, 15, 1.0, Vec2::ZERO, 42, 0.2);
        assert_eq!(a.cells, b.cells);
        assert!(a.wall_count() > 0);
    }

    #[test]
    fn test_generate_without_density_is_open() {
        let repo = GridRepository::new();
        let grid = repo.load_or_generate("open", 10, 10, 1.0, Vec2::ZERO, 7, 0.0);
        assert_eq!(grid.wall_count(), 0);
    }

    #[test]
    fn test_wall_density_is_capped() {
        let repo = GridRepository::new();
        let grid = repo.load_or_generate("dense", 30, 30, 1.0, Vec2::ZERO, 9, 5.0);
        assert!(grid.wall_count() < 900);
    }

    #[test]
    fn test_stored_layout_is_resized() {
        let mut repo = GridRepository::new();
        let mut stored = GridMap::empty("arena", 2, 2, 1.0);
        stored.set_cell(CellCoord::new(0, 0), CellType::Wall);
        repo.insert(stored);
        let grid = repo.load_or_generate("arena", 4, 4, 1.0, Vec2::new(50.0, 0.0), 0, 0.0);
        assert_eq!((grid.width, grid.height), (4, 4));
        assert_eq!(grid.world_offset, Vec2::new(50.0, 0.0));
        assert!(grid.is_wall(CellCoord::new(0, 0)));
    }
}
