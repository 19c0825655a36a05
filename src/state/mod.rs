//! State management module for Partyline.
//!
//! This module provides the core state types:
//!
//! - `code` - Lobby code generation
//! - `player` - Lobby participants and their presence
//! - `lobby` - Lobby membership, host seat and round gating
//! - `timer` - Deferred task queue
//! - `directory` - Routing from connections to lobbies
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SessionDirectory                        │
//! │                                                              │
//! │  connection_id → player_id → lobby code → Lobby              │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ Lobby                                                  │  │
//! │  │   players (join order)   host_id   active_game_id      │  │
//! │  │   round: Box<dyn Round>  round_id                      │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Scheduler   (deadline, timer id) → TimerTask                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use partyline_state::state::{Player, SessionDirectory};
//! use rand::SeedableRng;
//!
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
//! let mut directory = SessionDirectory::new();
//!
//! let host = Player::new("p1".into(), "conn-1".into(), "Alice".into());
//! let code = directory.create_lobby(host, &mut rng).unwrap().code.clone();
//!
//! let guest = Player::new("p2".into(), "conn-2".into(), "Bob".into());
//! directory.join(&code.to_lowercase(), guest).unwrap();
//!
//! assert_eq!(directory.resolve("conn-2"), Some((code, "p2".to_string())));
//! ```

pub mod code;
pub mod directory;
pub mod lobby;
pub mod player;
pub mod timer;

// Re-export commonly used types
pub use directory::{Departure, SessionDirectory};
pub use lobby::{Lobby, LobbyError, Removal, MAX_LOBBY_PLAYERS, MIN_ROUND_PLAYERS};
pub use player::{validate_display_name, ConnectionId, NameProblem, Player, PlayerId, Presence};
pub use timer::{Scheduler, TimerId, TimerTask};
