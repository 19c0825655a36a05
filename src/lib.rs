//! Partyline State Library
//!
//! This crate provides the session and round orchestration core for
//! Partyline party games.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Lobby Management** - Short shareable codes, capacity, host seat with
//!   automatic migration, destruction on last leave.
//!
//! - **Connection Lifecycle** - A dropped connection keeps its seat for a
//!   grace period; reconnecting restores it together with a snapshot of the
//!   running round.
//!
//! - **Round Contract** - Every game is a [`games::Round`] driven by named,
//!   cancellable phase timers, with a phase-guarded `finish` that produces
//!   exactly one result.
//!
//! - **Games** - Region-queens (generated unique-solution puzzles) and a
//!   poker showdown (best five of seven).
//!
//! # Design Principles
//!
//! 1. **One owner, one event at a time** - The [`Engine`] is a plain value;
//!    every handler takes `&mut self` and the current time.
//!
//! 2. **Timers are data** - Deferred work lives in one ordered queue and is
//!    checked against live state when it fires, so stale timers are harmless.
//!
//! 3. **No networking** - Handlers fill an outbox; the [`runtime`] task hands
//!    it to whatever [`runtime::Transport`] the server provides.
//!
//! 4. **Serialization-ready** - Every state type converts to JSON for clients.
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//!
//! use partyline_state::{ClientEvent, Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig {
//!     seed: Some(42),
//!     ..EngineConfig::default()
//! });
//! let now = Instant::now();
//!
//! // Host creates a lobby
//! let ack = engine.handle(
//!     "conn-1",
//!     ClientEvent::CreateLobby { display_name: "Alice".into() },
//!     now,
//! );
//! let code = ack["lobbyCode"].as_str().unwrap().to_string();
//!
//! // A friend joins with the code
//! engine.handle(
//!     "conn-2",
//!     ClientEvent::JoinLobby { display_name: "Bob".into(), lobby_code: code.clone() },
//!     now,
//! );
//!
//! // The host drops; after the grace period the seat is released
//! engine.disconnect("conn-1", now);
//! engine.advance(now + Duration::from_secs(30));
//!
//! let lobby = engine.directory().lobby(&code).unwrap();
//! assert_eq!(lobby.player_count(), 1);
//! assert!(lobby.players()[0].is_host);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod games;
pub mod logging;
pub mod protocol;
pub mod runtime;
pub mod state;

pub use config::{ConfigError, EngineConfig, ServerConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use games::{Game, GameRegistry, Round, RoundContext};
pub use protocol::{ClientEvent, Outbound, Outbox};
pub use runtime::{health_status, spawn, ServerHandle, Transport};
