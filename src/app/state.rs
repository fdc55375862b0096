//! Application state shared across routes

use crate::game::flappy::FlappyHandle;
use crate::game::pong::PongHandle;
use crate::game::snake::SnakeHandle;
use crate::game::{FlappyGame, PongGame, SnakeGame};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pong: PongHandle,
    pub snake: SnakeHandle,
    pub flappy: FlappyHandle,
}

impl AppState {
    /// Build the state and spawn the three game tasks. Each task owns its
    /// simulation outright; routes only ever talk to it through the handle.
    pub fn new() -> Self {
        let (pong_game, pong) = PongGame::new(rand::random());
        tokio::spawn(pong_game.run());

        let (snake_game, snake) = SnakeGame::new(rand::random());
        tokio::spawn(snake_game.run());

        let (flappy_game, flappy) = FlappyGame::new(rand::random());
        tokio::spawn(flappy_game.run());

        Self {
            pong,
            snake,
            flappy,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
