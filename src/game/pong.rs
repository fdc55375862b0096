//! Pong match state and authoritative ball physics
//!
//! Unlike snake and flappy, the whole namespace shares a single match. The
//! first two connections claim the paddle slots, everyone after them
//! spectates, and the simulation only runs while both slots are occupied.
//! Ball and scores survive slot changes, so a new player inherits the
//! match in progress.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::info;

use crate::ws::protocol::{
    Ball, Paddles, PlayerSlots, PongClientMsg, PongRole, PongServerMsg, Scores,
};

use super::outbox::{FanOut, Outbox};
use super::scheduler::TickScheduler;
use super::{
    ConnId, GameHandle, GatewayCmd, CANVAS_HEIGHT, CANVAS_WIDTH, CMD_CHANNEL_CAPACITY,
};

/// Simulation rate, ticks per second
pub const TICKS_PER_SECOND: u64 = 60;

pub const PADDLE_WIDTH: f64 = 10.0;
pub const PADDLE_HEIGHT: f64 = 100.0;
/// Ball is an axis-aligned square anchored at its top-left corner
pub const BALL_SIZE: f64 = 10.0;
/// Spin picked up per unit of offset from the paddle center on contact
pub const ENGLISH_FACTOR: f64 = 0.1;
/// Horizontal speed multiplier applied on every paddle contact, uncapped
pub const SPEEDUP_FACTOR: f64 = 1.05;
/// Horizontal ball speed right after a serve
pub const SERVE_SPEED: f64 = 5.0;
/// A serve's vertical velocity is drawn uniformly from ±this bound
pub const SERVE_MAX_SPIN: f64 = 3.0;
/// Paddles start vertically centered
pub const PADDLE_START_Y: f64 = (CANVAS_HEIGHT - PADDLE_HEIGHT) / 2.0;

pub type PongHandle = GameHandle<PongClientMsg, PongServerMsg>;

/// Shared match state. Created once at startup and never destroyed; slot
/// churn pauses the simulation but keeps ball and scores.
#[derive(Debug, Clone)]
pub struct PongState {
    pub paddles: Paddles,
    pub ball: Ball,
    pub score: Scores,
}

impl PongState {
    pub fn new() -> Self {
        Self {
            paddles: Paddles {
                player1: PADDLE_START_Y,
                player2: PADDLE_START_Y,
            },
            ball: Ball {
                x: CANVAS_WIDTH / 2.0,
                y: CANVAS_HEIGHT / 2.0,
                dx: SERVE_SPEED,
                dy: 5.0,
            },
            score: Scores::default(),
        }
    }

    /// Position a paddle from a normalized [0,1] travel ratio. The ratio is
    /// clamped here rather than trusted from the wire.
    pub fn move_paddle(&mut self, role: PongRole, ratio: f64) {
        let y = ratio.clamp(0.0, 1.0) * (CANVAS_HEIGHT - PADDLE_HEIGHT);
        match role {
            PongRole::Player1 => self.paddles.player1 = y,
            PongRole::Player2 => self.paddles.player2 = y,
            PongRole::Spectator => {}
        }
    }

    /// Advance the ball one tick: integrate, reflect off walls and paddles,
    /// then settle any point scored.
    pub fn step(&mut self, rng: &mut impl Rng) {
        self.ball.x += self.ball.dx;
        self.ball.y += self.ball.dy;

        // Top and bottom walls reflect without positional correction
        if self.ball.y <= 0.0 || self.ball.y + BALL_SIZE >= CANVAS_HEIGHT {
            self.ball.dy = -self.ball.dy;
        }

        let p1 = self.paddles.player1;
        if self.ball.x <= PADDLE_WIDTH
            && self.ball.y + BALL_SIZE >= p1
            && self.ball.y <= p1 + PADDLE_HEIGHT
        {
            self.bounce_off_paddle(p1);
        }

        let p2 = self.paddles.player2;
        if self.ball.x + BALL_SIZE >= CANVAS_WIDTH - PADDLE_WIDTH
            && self.ball.y + BALL_SIZE >= p2
            && self.ball.y <= p2 + PADDLE_HEIGHT
        {
            self.bounce_off_paddle(p2);
        }

        if self.ball.x < 0.0 {
            self.score.player2 += 1;
            self.serve(rng);
        } else if self.ball.x > CANVAS_WIDTH {
            self.score.player1 += 1;
            self.serve(rng);
        }
    }

    /// Reflect horizontally, add spin from the contact offset, speed up
    fn bounce_off_paddle(&mut self, paddle_y: f64) {
        self.ball.dx = -self.ball.dx;
        self.ball.dy = (self.ball.y - (paddle_y + PADDLE_HEIGHT / 2.0)) * ENGLISH_FACTOR;
        self.ball.dx *= SPEEDUP_FACTOR;
    }

    /// Re-center the ball with a fresh random serve direction. Runs in the
    /// same tick as the score, so the ball never lingers out of frame.
    fn serve(&mut self, rng: &mut impl Rng) {
        self.ball = Ball {
            x: CANVAS_WIDTH / 2.0,
            y: CANVAS_HEIGHT / 2.0,
            dx: if rng.gen_bool(0.5) {
                SERVE_SPEED
            } else {
                -SERVE_SPEED
            },
            dy: rng.gen_range(-SERVE_MAX_SPIN..SERVE_MAX_SPIN),
        };
    }
}

impl Default for PongState {
    fn default() -> Self {
        Self::new()
    }
}

/// Pong game task: owns the shared match and the socket roster
pub struct PongGame {
    cmd_rx: mpsc::Receiver<GatewayCmd<PongClientMsg, PongServerMsg>>,
    slots: PlayerSlots,
    state: PongState,
    outbox: Outbox<PongServerMsg>,
    scheduler: TickScheduler,
    rng: ChaCha8Rng,
    connected: Arc<AtomicUsize>,
}

impl PongGame {
    pub fn new(seed: u64) -> (Self, PongHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicUsize::new(0));
        let handle = GameHandle::new(cmd_tx, connected.clone());

        let game = Self {
            cmd_rx,
            slots: PlayerSlots::default(),
            state: PongState::new(),
            outbox: Outbox::new(FanOut::AllSockets),
            scheduler: TickScheduler::new(Duration::from_micros(1_000_000 / TICKS_PER_SECOND)),
            rng: ChaCha8Rng::seed_from_u64(seed),
            connected,
        };

        (game, handle)
    }

    /// Run the game task until every handle is dropped
    pub async fn run(mut self) {
        info!(game = "pong", "Game task started");

        loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                _ = self.scheduler.tick() => self.run_tick(),
            }
        }

        info!(game = "pong", "Game task stopped");
    }

    fn handle_command(&mut self, cmd: GatewayCmd<PongClientMsg, PongServerMsg>) {
        match cmd {
            GatewayCmd::Connect { conn, sender } => self.handle_connect(conn, sender),
            GatewayCmd::Intent { conn, msg } => match msg {
                PongClientMsg::PaddleMove { ratio } => self.handle_paddle_move(conn, ratio),
            },
            GatewayCmd::Disconnect { conn } => self.handle_disconnect(conn),
        }
    }

    fn handle_connect(&mut self, conn: ConnId, sender: mpsc::Sender<PongServerMsg>) {
        self.outbox.attach(conn, sender);
        self.connected.store(self.outbox.len(), Ordering::Relaxed);

        let role = self.claim_slot(conn);
        self.outbox.unicast(&conn, PongServerMsg::Init { role });

        // The match only simulates with two seated players. Each start gets
        // a fresh serve; a spectator joining a running match does not.
        if self.slots.both_filled() && !self.scheduler.is_running() {
            self.state.serve(&mut self.rng);
            self.scheduler.start();
            info!(game = "pong", "Match started");
        }

        info!(
            game = "pong",
            conn = %conn,
            role = ?role,
            sockets = self.outbox.len(),
            "Player connected"
        );
    }

    /// First vacant slot wins; everyone else watches. A connection's role
    /// never changes for its lifetime.
    fn claim_slot(&mut self, conn: ConnId) -> PongRole {
        if self.slots.player1.is_none() {
            self.slots.player1 = Some(conn);
            PongRole::Player1
        } else if self.slots.player2.is_none() {
            self.slots.player2 = Some(conn);
            PongRole::Player2
        } else {
            PongRole::Spectator
        }
    }

    fn handle_paddle_move(&mut self, conn: ConnId, ratio: f64) {
        // Spectators and unknown connections hold no paddle; their intents
        // fall through as no-ops
        let role = self.slots.role_of(conn);
        self.state.move_paddle(role, ratio);
    }

    fn handle_disconnect(&mut self, conn: ConnId) {
        self.outbox.detach(&conn);
        let was_player = self.slots.role_of(conn) != PongRole::Spectator;
        self.slots.vacate(conn);
        if was_player && self.scheduler.is_running() {
            // Pause, keeping ball and scores for the next pairing
            self.scheduler.stop();
            info!(game = "pong", "Match paused, waiting for players");
        }
        self.connected.store(self.outbox.len(), Ordering::Relaxed);

        info!(game = "pong", conn = %conn, sockets = self.outbox.len(), "Player disconnected");
    }

    /// Advance the shared match one tick and broadcast the new state to
    /// every socket, spectators included.
    fn run_tick(&mut self) {
        if !self.slots.both_filled() {
            self.scheduler.stop();
            return;
        }

        self.state.step(&mut self.rng);
        self.outbox.publish(
            None,
            PongServerMsg::GameState {
                players: self.slots.clone(),
                paddles: self.state.paddles.clone(),
                ball: self.state.ball.clone(),
                score: self.state.score.clone(),
            },
        );
    }
}
