//! Game simulation modules
//!
//! Each game (pong, snake, flappy) runs as one spawned task that owns its
//! session store, tick scheduler, and outbound client registry, and consumes
//! commands from the WebSocket layer over a bounded channel. All state
//! mutation for one game happens on that single task, so intent handling and
//! tick physics are strictly serialized without locks.

pub mod flappy;
pub mod outbox;
pub mod pong;
pub mod scheduler;
pub mod snake;
pub mod store;

pub use flappy::FlappyGame;
pub use pong::PongGame;
pub use snake::SnakeGame;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Stable per-connection identifier for the lifetime of a socket
pub type ConnId = Uuid;

/// Virtual canvas shared by all games, in semantic units
pub const CANVAS_WIDTH: f64 = 800.0;
pub const CANVAS_HEIGHT: f64 = 600.0;

/// Command buffer between the socket layer and a game task
pub const CMD_CHANNEL_CAPACITY: usize = 256;

/// Outbound frame buffer per connection; a full buffer drops frames rather
/// than stalling the game task
pub const OUT_CHANNEL_CAPACITY: usize = 64;

/// Commands delivered to a game task from the transport layer
#[derive(Debug)]
pub enum GatewayCmd<C, S> {
    /// A socket joined the namespace; `sender` carries its outbound frames
    Connect {
        conn: ConnId,
        sender: mpsc::Sender<S>,
    },

    /// A parsed intent message from the client
    Intent { conn: ConnId, msg: C },

    /// The socket closed or errored
    Disconnect { conn: ConnId },
}

/// The game task has exited and no longer accepts commands
#[derive(Debug, Error)]
#[error("game task is not running")]
pub struct GameUnavailable;

/// Handle to a running game task
pub struct GameHandle<C, S> {
    cmd_tx: mpsc::Sender<GatewayCmd<C, S>>,
    connected: Arc<AtomicUsize>,
}

impl<C, S> GameHandle<C, S> {
    pub fn new(cmd_tx: mpsc::Sender<GatewayCmd<C, S>>, connected: Arc<AtomicUsize>) -> Self {
        Self { cmd_tx, connected }
    }

    /// Deliver a command to the game task; fails only if the task is gone
    pub async fn send(&self, cmd: GatewayCmd<C, S>) -> Result<(), GameUnavailable> {
        self.cmd_tx.send(cmd).await.map_err(|_| GameUnavailable)
    }

    /// Number of sockets currently connected to this namespace
    pub fn connected(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }
}

// Manual impl: `#[derive(Clone)]` would demand `C: Clone + S: Clone` even
// though only the sender and counter are cloned.
impl<C, S> Clone for GameHandle<C, S> {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            connected: self.connected.clone(),
        }
    }
}
