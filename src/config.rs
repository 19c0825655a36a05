//! Configuration.
//!
//! Engine tunables default to the values the games are balanced for. The
//! server-facing settings come from the environment:
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `PORT` | `3001` | listening port for the transport |
//! | `ALLOWED_ORIGINS` | `*` | comma separated origin list |
//! | `RUST_LOG` | `info` | tracing filter |
//! | `LOBBY_GRACE_SECS` | `30` | seat reservation after a disconnect |
//! | `ENGINE_SEED` | unset | fixed RNG seed (reproducible deals) |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::DEFAULT_FILTER;
use crate::state::lobby::{MAX_LOBBY_PLAYERS, MIN_ROUND_PLAYERS};

/// Region-queens tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueensConfig {
    /// Grid side (and region count)
    pub size: usize,

    /// Solving phase budget
    pub time_limit: Duration,

    /// Whole-pipeline retries before giving up
    pub max_attempts: usize,

    /// Boundary refinement steps per attempt
    pub refine_steps: usize,
}

impl Default for QueensConfig {
    fn default() -> Self {
        Self {
            size: 6,
            time_limit: Duration::from_secs(180),
            max_attempts: 400,
            refine_steps: 200,
        }
    }
}

/// Poker showdown tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokerConfig {
    /// Time to look at hole cards before the reveal starts
    pub hole_time: Duration,

    /// Delay between community card reveals
    pub reveal_pacing: Duration,
}

impl Default for PokerConfig {
    fn default() -> Self {
        Self {
            hole_time: Duration::from_secs(20),
            reveal_pacing: Duration::from_secs(2),
        }
    }
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seat reservation after a disconnect
    pub grace_period: Duration,

    pub max_players: usize,

    pub min_players: usize,

    /// Fixed RNG seed; entropy when `None`
    pub seed: Option<u64>,

    pub queens: QueensConfig,

    pub poker: PokerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            max_players: MAX_LOBBY_PLAYERS,
            min_players: MIN_ROUND_PLAYERS,
            seed: None,
            queens: QueensConfig::default(),
            poker: PokerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Check tunables for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_period.is_zero() {
            return Err(ConfigError::Invalid("grace period must be > 0".into()));
        }
        if self.min_players < MIN_ROUND_PLAYERS {
            return Err(ConfigError::Invalid(format!(
                "min_players must be >= {}",
                MIN_ROUND_PLAYERS
            )));
        }
        if self.max_players < self.min_players || self.max_players > MAX_LOBBY_PLAYERS {
            return Err(ConfigError::Invalid(format!(
                "max_players must be between {} and {}",
                self.min_players, MAX_LOBBY_PLAYERS
            )));
        }
        if !(4..=9).contains(&self.queens.size) {
            return Err(ConfigError::Invalid("queens size must be 4..=9".into()));
        }
        if self.queens.max_attempts == 0 {
            return Err(ConfigError::Invalid("queens max_attempts must be > 0".into()));
        }
        Ok(())
    }
}

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,

    /// Origins the transport accepts; `["*"]` allows any
    pub allowed_origins: Vec<String>,

    /// Tracing filter directive
    pub log_filter: String,

    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            allowed_origins: vec!["*".to_string()],
            log_filter: DEFAULT_FILTER.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(port) = var("PORT") {
            cfg.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("Invalid PORT: {}", port)))?;
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            cfg.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(filter) = var("RUST_LOG") {
            cfg.log_filter = filter;
        }
        if let Some(secs) = var("LOBBY_GRACE_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("Invalid LOBBY_GRACE_SECS: {}", secs))
            })?;
            cfg.engine.grace_period = Duration::from_secs(secs);
        }
        if let Some(seed) = var("ENGINE_SEED") {
            cfg.engine.seed = Some(
                seed.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("Invalid ENGINE_SEED: {}", seed)))?,
            );
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("PORT must be > 0".into()));
        }
        if self.allowed_origins.is_empty() {
            return Err(ConfigError::Invalid("ALLOWED_ORIGINS is empty".into()));
        }
        self.engine.validate()
    }

    /// Whether a transport should accept `origin`.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == "*" || o == origin)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
