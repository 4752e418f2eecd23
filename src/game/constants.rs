/// Tick scheduling defaults
pub mod tick {
    /// Simulation steps per second
    pub const SIM_TICK_RATE: f32 = 60.0;
    /// Replication passes per second
    pub const REPLICATION_TICK_RATE: f32 = 20.0;
    /// Step duration used when the configured simulation rate is unusable
    pub const FALLBACK_SIM_STEP: f32 = 1.0 / 60.0;
    /// Interval used when the configured replication rate is unusable
    pub const FALLBACK_REPLICATION_STEP: f32 = 1.0 / 20.0;
    /// Rates at or below this are treated as unset
    pub const MIN_TICK_RATE: f32 = 0.01;
    /// Upper bound on simulation steps executed per outer update
    pub const MAX_CATCH_UP_STEPS: u32 = 5;
}

/// Session registry limits
pub mod session {
    /// Maximum concurrently open sessions
    pub const MAX_SESSIONS: usize = 100;
    /// Distance between consecutive session world offsets along X
    pub const OFFSET_SPACING: f32 = 50.0;
    /// Maximum members per session
    pub const MAX_PLAYERS: usize = 4;
    /// Display names are truncated to this many characters
    pub const MAX_NAME_LEN: usize = 20;
    /// Mode assigned to newly created sessions
    pub const DEFAULT_MODE: &str = "square-game";
}

/// Grid generation constants
pub mod grid {
    /// Smallest accepted cell edge length in world units
    pub const MIN_CELL_SIZE: f32 = 0.01;
    /// Largest grid edge in cells; keeps `width * height` allocations bounded
    pub const MAX_GRID_EDGE: i32 = 1024;
    /// Procedural wall density is capped so maps stay traversable
    pub const MAX_WALL_DENSITY: f32 = 0.4;
    /// Offsets are scaled before rounding when mixed into map seeds
    pub const SEED_OFFSET_SCALE: f32 = 10.0;
    /// FNV-1a 32-bit offset basis
    pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
    /// FNV-1a 32-bit prime
    pub const FNV_PRIME: u32 = 16_777_619;
}

/// Square arena defaults
pub mod square {
    pub const ID: &str = "square-game";
    pub const DISPLAY_NAME: &str = "Square Arena";
    pub const GRID_WIDTH: i32 = 20;
    pub const GRID_HEIGHT: i32 = 15;
    pub const CELL_SIZE: f32 = 1.0;
    /// Cells per second
    pub const MOVE_SPEED: f32 = 5.0;
    pub const MIN_PLAYERS: usize = 1;
    pub const MAX_PLAYERS: usize = 10;
    /// Spawn ellipse radius as a fraction of the grid extent
    pub const SPAWN_RING_FRACTION: f32 = 0.4;
}

/// Circle arena defaults
pub mod circle {
    pub const ID: &str = "circle-game";
    pub const DISPLAY_NAME: &str = "Circle Arena";
    pub const RADIUS: f32 = 12.0;
    pub const CELL_SIZE: f32 = 1.0;
    /// Cells per second
    pub const MOVE_SPEED: f32 = 5.0;
    pub const MIN_PLAYERS: usize = 1;
    pub const MAX_PLAYERS: usize = 10;
    /// Spawn ring radius as a fraction of the arena radius
    pub const SPAWN_RING_FRACTION: f32 = 0.6;
}

/// Network defaults
pub mod net {
    /// Pending move inputs held before new submissions are rejected
    pub const INPUT_BUFFER_CAPACITY: usize = 1024;
    /// Lifecycle events held for a listener; later events are dropped
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}
