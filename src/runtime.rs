//! Async driver.
//!
//! One tokio task owns the [`Engine`] and serves commands from a channel.
//! Between commands it sleeps until the next timer deadline, so timers and
//! client events are handled one at a time in arrival order. After every
//! command or timer batch the outbox is flushed into the [`Transport`].
//!
//! ```text
//!  ServerHandle ──Command──▶ ┌──────────────┐ ──Outbound──▶ Transport
//!                            │  actor task  │
//!  sleep_until(deadline) ──▶ │  (Engine)    │
//!                            └──────────────┘
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::protocol::{ClientEvent, Outbound};
use crate::state::ConnectionId;

/// Where outbound messages go.
pub trait Transport: Send + 'static {
    fn deliver(&mut self, message: Outbound) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,
}

impl Transport for mpsc::UnboundedSender<Outbound> {
    fn deliver(&mut self, message: Outbound) -> Result<(), TransportError> {
        self.send(message).map_err(|_| TransportError::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Engine task has stopped")]
    Stopped,
}

enum Command {
    Event {
        connection: ConnectionId,
        event: ClientEvent,
        ack: oneshot::Sender<Value>,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Shutdown,
}

/// Cloneable handle to a running engine task.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ServerHandle {
    /// Submit a client event and wait for its acknowledgement.
    pub async fn send(
        &self,
        connection: &str,
        event: ClientEvent,
    ) -> Result<Value, RuntimeError> {
        let (ack, reply) = oneshot::channel();
        self.commands
            .send(Command::Event {
                connection: connection.to_string(),
                event,
                ack,
            })
            .map_err(|_| RuntimeError::Stopped)?;
        reply.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Report a closed connection.
    pub fn disconnect(&self, connection: &str) -> Result<(), RuntimeError> {
        self.commands
            .send(Command::Disconnect {
                connection: connection.to_string(),
            })
            .map_err(|_| RuntimeError::Stopped)
    }

    /// Stop the task after the commands already queued.
    pub fn shutdown(&self) {
        // Already stopped is fine.
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event { connection, event, .. } => {
                write!(f, "Event({}, {})", connection, event.name())
            }
            Self::Disconnect { connection } => write!(f, "Disconnect({})", connection),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Start the engine task. The join handle yields the engine back on shutdown.
pub fn spawn<T: Transport>(engine: Engine, transport: T) -> (ServerHandle, JoinHandle<Engine>) {
    let (commands, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(engine, transport, rx));
    (ServerHandle { commands }, task)
}

/// `{status, timestamp}` for liveness probes.
pub fn health_status() -> Value {
    json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

fn internal_error() -> Value {
    json!({ "error": "Internal server error", "code": "internal" })
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

async fn run<T: Transport>(
    mut engine: Engine,
    mut transport: T,
    mut rx: mpsc::UnboundedReceiver<Command>,
) -> Engine {
    tracing::info!("Engine task started");

    loop {
        let deadline = engine.next_deadline();

        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Event { connection, event, ack }) => {
                        let name = event.name();
                        let reply = guarded(name, || engine.handle(&connection, event, now()))
                            .unwrap_or_else(internal_error);
                        flush(&mut engine, &mut transport);
                        if ack.send(reply).is_err() {
                            tracing::debug!(connection = %connection, event = name, "Acknowledgement receiver dropped");
                        }
                    }
                    Some(Command::Disconnect { connection }) => {
                        guarded("disconnect", || engine.disconnect(&connection, now()));
                        flush(&mut engine, &mut transport);
                    }
                    Some(Command::Shutdown) | None => break,
                }
            }

            _ = sleep_until(deadline) => {
                guarded("timers", || engine.advance(now()));
                flush(&mut engine, &mut transport);
            }
        }
    }

    tracing::info!(lobbies = engine.directory().lobby_count(), "Engine task stopped");
    engine
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

/// Run a handler, turning a panic into `None`.
fn guarded<R>(what: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(out) => Some(out),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            tracing::error!(handler = what, "Handler panicked: {}", message);
            None
        }
    }
}

fn flush<T: Transport>(engine: &mut Engine, transport: &mut T) {
    for message in engine.drain_outbox() {
        if let Err(e) = transport.deliver(message) {
            tracing::debug!("Dropping outbound message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::games::{Game, GameInitError, GameRegistry, Participant, Round, RoundContext};
    use pretty_assertions::assert_eq;
    use rand::RngCore;
    use std::time::Instant;

    fn seeded() -> Engine {
        Engine::new(EngineConfig {
            seed: Some(11),
            ..EngineConfig::default()
        })
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Outbound>, event: &str) -> Outbound {
        loop {
            let message = rx.recv().await.unwrap();
            if message.event() == Some(event) {
                return message;
            }
        }
    }

    fn create(name: &str) -> ClientEvent {
        ClientEvent::CreateLobby {
            display_name: name.to_string(),
        }
    }

    #[test]
    fn test_health_status() {
        let health = health_status();
        assert_eq!(health["status"], "ok");
        let stamp = health["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_and_outbound_delivery() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, task) = spawn(seeded(), tx);

        let ack = handle.send("c1", create("Alice")).await.unwrap();
        let code = ack["lobbyCode"].as_str().unwrap().to_string();
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::JoinRoom {
                connection: "c1".to_string(),
                room: code.clone(),
            }
        );

        handle.shutdown();
        let engine = task.await.unwrap();
        assert!(engine.directory().contains_code(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_timer_fires_on_paused_clock() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, task) = spawn(seeded(), tx);

        let ack = handle.send("c1", create("Alice")).await.unwrap();
        let code = ack["lobbyCode"].as_str().unwrap().to_string();
        handle
            .send(
                "c2",
                ClientEvent::JoinLobby {
                    display_name: "Bob".to_string(),
                    lobby_code: code.clone(),
                },
            )
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        handle.disconnect("c1").unwrap();
        next_event(&mut rx, "lobby:player-disconnected").await;

        // The clock auto-advances to the grace deadline while idle.
        let left = next_event(&mut rx, "lobby:player-left").await;
        assert!(started.elapsed() >= std::time::Duration::from_secs(30));
        assert_eq!(left.payload().unwrap()["lobby"]["players"].as_array().unwrap().len(), 1);
        next_event(&mut rx, "lobby:host-changed").await;

        handle.shutdown();
        let engine = task.await.unwrap();
        assert_eq!(engine.directory().lobby(&code).unwrap().player_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_shutdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, task) = spawn(seeded(), tx);

        handle.shutdown();
        task.await.unwrap();

        assert_eq!(
            handle.send("c1", ClientEvent::ListGames).await,
            Err(RuntimeError::Stopped)
        );
        assert_eq!(handle.disconnect("c1"), Err(RuntimeError::Stopped));
    }

    /// Game whose round panics on start.
    struct Faulty;

    struct FaultyRound;

    impl Game for Faulty {
        fn id(&self) -> &'static str {
            "faulty"
        }

        fn name(&self) -> &'static str {
            "Faulty"
        }

        fn description(&self) -> &'static str {
            "Panics on start"
        }

        fn min_players(&self) -> usize {
            2
        }

        fn init(
            &self,
            _participants: &[Participant],
            _rng: &mut dyn RngCore,
        ) -> Result<Box<dyn Round>, GameInitError> {
            Ok(Box::new(FaultyRound))
        }
    }

    impl Round for FaultyRound {
        fn game_id(&self) -> &'static str {
            "faulty"
        }

        fn phase(&self) -> &'static str {
            "broken"
        }

        fn start(&mut self, _ctx: &mut RoundContext<'_>) {
            panic!("start exploded");
        }

        fn handle_action(
            &mut self,
            _ctx: &mut RoundContext<'_>,
            _player_id: &str,
            _action: &str,
            _data: &Value,
        ) -> Result<Value, crate::games::ActionError> {
            Ok(Value::Null)
        }

        fn on_timer(&mut self, _ctx: &mut RoundContext<'_>, _key: &'static str) {}

        fn on_player_left(&mut self, _ctx: &mut RoundContext<'_>, _player_id: &str) {}

        fn finish(&mut self, _ctx: &mut RoundContext<'_>) -> bool {
            false
        }

        fn reconnect_state(&self, _now: Instant, _player_id: &str) -> Value {
            Value::Null
        }

        fn end(&mut self, _ctx: &mut RoundContext<'_>) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_handler_is_contained() {
        let config = EngineConfig {
            seed: Some(3),
            ..EngineConfig::default()
        };
        let mut registry = GameRegistry::new();
        registry.register(Box::new(Faulty));
        let engine = Engine::with_registry(config, registry);

        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, task) = spawn(engine, tx);

        let ack = handle.send("c1", create("Alice")).await.unwrap();
        let code = ack["lobbyCode"].as_str().unwrap().to_string();
        handle
            .send(
                "c2",
                ClientEvent::JoinLobby {
                    display_name: "Bob".to_string(),
                    lobby_code: code,
                },
            )
            .await
            .unwrap();

        let ack = handle
            .send(
                "c1",
                ClientEvent::StartRound {
                    game_id: "faulty".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(ack, internal_error());

        // Still serving.
        let games = handle.send("c1", ClientEvent::ListGames).await.unwrap();
        assert_eq!(games["games"][0]["id"], "faulty");

        handle.shutdown();
        task.await.unwrap();
    }
}
