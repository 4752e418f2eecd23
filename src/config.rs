use std::path::PathBuf;
use std::str::FromStr;

use crate::game::constants::{net, session, tick};

/// Which side of the simulation this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerRole {
    /// Owns simulation and replication
    #[default]
    Server,
    /// Observer only; scheduler mutations are ignored
    Client,
}

impl FromStr for ServerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" | "host" => Ok(ServerRole::Server),
            "client" => Ok(ServerRole::Client),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub role: ServerRole,
    /// Simulation steps per second
    pub sim_tick_rate: f32,
    /// Replication passes per second
    pub replication_tick_rate: f32,
    /// Simulation steps allowed per outer update
    pub max_catch_up_steps: u32,
    pub max_sessions: usize,
    /// Distance between neighbouring session offsets
    pub session_offset_spacing: f32,
    pub max_players_per_session: usize,
    pub input_buffer_capacity: usize,
    pub metrics_port: u16,
    /// Directory of JSON grid layouts
    pub maps_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            role: ServerRole::Server,
            sim_tick_rate: tick::SIM_TICK_RATE,
            replication_tick_rate: tick::REPLICATION_TICK_RATE,
            max_catch_up_steps: tick::MAX_CATCH_UP_STEPS,
            max_sessions: session::MAX_SESSIONS,
            session_offset_spacing: session::OFFSET_SPACING,
            max_players_per_session: session::MAX_PLAYERS,
            input_buffer_capacity: net::INPUT_BUFFER_CAPACITY,
            metrics_port: 9090,
            maps_dir: None,
        }
    }
}

/// Parse `key` from the environment, keeping `current` when unset or invalid
fn env_parse<T: FromStr>(key: &str, current: T, accept: impl Fn(&T) -> bool) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(parsed) if accept(&parsed) => parsed,
            Ok(_) => {
                tracing::warn!("{} out of range ('{}'), using default", key, raw);
                current
            }
            Err(_) => {
                tracing::warn!("Invalid {} '{}', using default", key, raw);
                current
            }
        },
        Err(_) => current,
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let defaults = Self::default();

        let role = match std::env::var("SERVER_ROLE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("Invalid SERVER_ROLE: {}, using default", e);
                defaults.role
            }),
            Err(_) => defaults.role,
        };

        Self {
            role,
            sim_tick_rate: env_parse("SIM_TICK_RATE", defaults.sim_tick_rate, |v| v.is_finite() && *v > 0.0),
            replication_tick_rate: env_parse("REPLICATION_TICK_RATE", defaults.replication_tick_rate, |v| {
                v.is_finite() && *v > 0.0
            }),
            max_catch_up_steps: env_parse("MAX_CATCH_UP_STEPS", defaults.max_catch_up_steps, |v| {
                (1..=120).contains(v)
            }),
            max_sessions: env_parse("MAX_SESSIONS", defaults.max_sessions, |v| (1..=10_000).contains(v)),
            session_offset_spacing: env_parse("SESSION_OFFSET_SPACING", defaults.session_offset_spacing, |v| {
                v.is_finite() && *v > 0.0
            }),
            max_players_per_session: env_parse("MAX_PLAYERS_PER_SESSION", defaults.max_players_per_session, |v| {
                (1..=64).contains(v)
            }),
            input_buffer_capacity: env_parse("INPUT_BUFFER_CAPACITY", defaults.input_buffer_capacity, |v| *v > 0),
            metrics_port: env_parse("METRICS_PORT", defaults.metrics_port, |v| *v > 0),
            maps_dir: std::env::var("MAPS_DIR").ok().map(PathBuf::from),
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.max_catch_up_steps == 0 {
            return Err("max_catch_up_steps must be at least 1".to_string());
        }
        if self.max_sessions == 0 {
            return Err("max_sessions must be at least 1".to_string());
        }
        if self.max_players_per_session == 0 {
            return Err("max_players_per_session must be at least 1".to_string());
        }
        if !(self.session_offset_spacing.is_finite() && self.session_offset_spacing > 0.0) {
            return Err("session_offset_spacing must be positive".to_string());
        }
        if self.input_buffer_capacity == 0 {
            return Err("input_buffer_capacity must be at least 1".to_string());
        }
        if self.metrics_port == 0 {
            return Err("metrics_port cannot be 0".to_string());
        }
        Ok(())
    }

    /// Simulation step in seconds; unusable rates fall back to 1/60
    pub fn sim_step(&self) -> f32 {
        if self.sim_tick_rate.is_finite() && self.sim_tick_rate > tick::MIN_TICK_RATE {
            1.0 / self.sim_tick_rate
        } else {
            tick::FALLBACK_SIM_STEP
        }
    }

    /// Replication interval in seconds; unusable rates fall back to 1/20
    pub fn replication_step(&self) -> f32 {
        if self.replication_tick_rate.is_finite() && self.replication_tick_rate > tick::MIN_TICK_RATE {
            1.0 / self.replication_tick_rate
        } else {
            tick::FALLBACK_REPLICATION_STEP
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.role == ServerRole::Server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.role, ServerRole::Server);
        assert_eq!(config.max_sessions, 100);
        assert_eq!(config.max_catch_up_steps, 5);
        assert_eq!(config.max_players_per_session, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_step_sizes() {
        let config = ServerConfig::default();
        assert!((config.sim_step() - 1.0 / 60.0).abs() < EPSILON);
        assert!((config.replication_step() - 1.0 / 20.0).abs() < EPSILON);
    }

    #[test]
    fn test_unusable_rates_fall_back() {
        let config = ServerConfig {
            sim_tick_rate: 0.0,
            replication_tick_rate: 0.005,
            ..Default::default()
        };
        assert!((config.sim_step() - 1.0 / 60.0).abs() < EPSILON);
        assert!((config.replication_step() - 1.0 / 20.0).abs() < EPSILON);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = ServerConfig {
            max_sessions: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            max_catch_up_steps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Server".parse::<ServerRole>(), Ok(ServerRole::Server));
        assert_eq!(" client ".parse::<ServerRole>(), Ok(ServerRole::Client));
        assert!("spectator".parse::<ServerRole>().is_err());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.max_sessions > 0);
    }
}
