//! Flappy Bird sessions and authoritative physics
//!
//! Every connection owns an independent session. A session starts idle and
//! begins simulating on the first jump; after a crash it stays frozen until
//! the next jump, which restarts it in one action.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::info;

use crate::ws::protocol::{Bird, FlappyClientMsg, FlappyServerMsg, Pipe};

use super::outbox::{FanOut, Outbox};
use super::scheduler::TickScheduler;
use super::store::SessionStore;
use super::{
    ConnId, GameHandle, GatewayCmd, CANVAS_HEIGHT, CANVAS_WIDTH, CMD_CHANNEL_CAPACITY,
};

/// Simulation rate, ticks per second
pub const TICKS_PER_SECOND: u64 = 30;

/// Downward acceleration applied every tick
pub const GRAVITY: f64 = 0.6;
/// Vertical velocity set (not added) by a jump
pub const JUMP_VELOCITY: f64 = -10.0;
/// Horizontal pipe movement per tick
pub const SCROLL_SPEED: f64 = 5.0;
pub const PIPE_WIDTH: f64 = 60.0;
/// Vertical opening between the top and bottom pipe of a pair
pub const PIPE_GAP: f64 = 150.0;
/// Horizontal distance between consecutive pipe spawns
pub const PIPE_SPACING: f64 = 300.0;
pub const BIRD_RADIUS: f64 = 15.0;
/// Fixed bird x position, announced to the client in `init`
pub const BIRD_X: f64 = CANVAS_WIDTH / 3.0;

// Gap top offset range, keeping 50 units clear of both canvas edges
const GAP_TOP_MIN: i32 = 50;
const GAP_TOP_MAX: i32 = 400;

pub type FlappyHandle = GameHandle<FlappyClientMsg, FlappyServerMsg>;

/// One connection's simulation state
#[derive(Debug, Clone)]
pub struct FlappySession {
    pub bird: Bird,
    pub pipes: Vec<Pipe>,
    pub score: u32,
    /// False until the first jump; an idle session is not simulated
    pub started: bool,
    pub game_over: bool,
}

impl FlappySession {
    pub fn new() -> Self {
        Self {
            bird: Bird {
                y: CANVAS_HEIGHT / 2.0,
                velocity: 0.0,
                radius: BIRD_RADIUS,
            },
            pipes: Vec::new(),
            score: 0,
            started: false,
            game_over: false,
        }
    }

    /// Apply a jump intent. On a crashed session this swaps in a fresh one
    /// first, so a single tap restarts and jumps at once.
    pub fn jump(&mut self) {
        if self.game_over {
            *self = FlappySession::new();
        }
        self.started = true;
        self.bird.velocity = JUMP_VELOCITY;
    }

    /// Advance one tick. Returns the frame to deliver to the owner, or
    /// `None` while the session is idle or already crashed.
    pub fn step(&mut self, rng: &mut impl Rng) -> Option<FlappyServerMsg> {
        if self.game_over || !self.started {
            return None;
        }

        self.bird.velocity += GRAVITY;
        self.bird.y += self.bird.velocity;

        let needs_pipe = match self.pipes.last() {
            None => true,
            Some(last) => last.x <= CANVAS_WIDTH - PIPE_SPACING,
        };
        if needs_pipe {
            self.pipes.push(Pipe {
                x: CANVAS_WIDTH,
                top_height: f64::from(rng.gen_range(GAP_TOP_MIN..=GAP_TOP_MAX)),
                passed: false,
            });
        }

        for pipe in &mut self.pipes {
            pipe.x -= SCROLL_SPEED;
            if !pipe.passed && pipe.x + PIPE_WIDTH < BIRD_X - self.bird.radius {
                pipe.passed = true;
                self.score += 1;
            }
        }

        let bird = &self.bird;
        let hit_pipe = self.pipes.iter().any(|pipe| {
            let in_range =
                BIRD_X + bird.radius > pipe.x && BIRD_X - bird.radius < pipe.x + PIPE_WIDTH;
            in_range
                && (bird.y - bird.radius < pipe.top_height
                    || bird.y + bird.radius > pipe.top_height + PIPE_GAP)
        });
        let hit_bounds =
            bird.y + bird.radius >= CANVAS_HEIGHT || bird.y - bird.radius <= 0.0;

        // Scoring and collision are resolved above, so dropping off-screen
        // pipes last cannot eat a pending score
        self.pipes.retain(|pipe| pipe.x + PIPE_WIDTH >= 0.0);

        if hit_pipe || hit_bounds {
            self.game_over = true;
            return Some(FlappyServerMsg::GameOver { score: self.score });
        }

        Some(FlappyServerMsg::GameState {
            bird: self.bird.clone(),
            pipes: self.pipes.clone(),
            score: self.score,
        })
    }
}

impl Default for FlappySession {
    fn default() -> Self {
        Self::new()
    }
}

/// Flappy game task: owns all sessions in the namespace
pub struct FlappyGame {
    cmd_rx: mpsc::Receiver<GatewayCmd<FlappyClientMsg, FlappyServerMsg>>,
    store: SessionStore<FlappySession>,
    outbox: Outbox<FlappyServerMsg>,
    scheduler: TickScheduler,
    rng: ChaCha8Rng,
    connected: Arc<AtomicUsize>,
}

impl FlappyGame {
    pub fn new(seed: u64) -> (Self, FlappyHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicUsize::new(0));
        let handle = GameHandle::new(cmd_tx, connected.clone());

        let game = Self {
            cmd_rx,
            store: SessionStore::new(),
            outbox: Outbox::new(FanOut::PerSession),
            scheduler: TickScheduler::new(Duration::from_micros(1_000_000 / TICKS_PER_SECOND)),
            rng: ChaCha8Rng::seed_from_u64(seed),
            connected,
        };

        (game, handle)
    }

    /// Run the game task until every handle is dropped
    pub async fn run(mut self) {
        info!(game = "flappy", "Game task started");

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

        info!(game = "flappy", "Game task stopped");
    }

    fn handle_command(&mut self, cmd: GatewayCmd<FlappyClientMsg, FlappyServerMsg>) {
        match cmd {
            GatewayCmd::Connect { conn, sender } => self.handle_connect(conn, sender),
            GatewayCmd::Intent { conn, msg } => match msg {
                FlappyClientMsg::Jump => self.handle_jump(conn),
            },
            GatewayCmd::Disconnect { conn } => self.handle_disconnect(conn),
        }
    }

    fn handle_connect(&mut self, conn: ConnId, sender: mpsc::Sender<FlappyServerMsg>) {
        self.outbox.attach(conn, sender);
        self.store.create(conn, FlappySession::new());
        self.connected.store(self.store.len(), Ordering::Relaxed);

        self.outbox.unicast(&conn, FlappyServerMsg::Init { x: BIRD_X });
        if !self.scheduler.is_running() {
            self.scheduler.start();
            info!(game = "flappy", "Loop started");
        }

        info!(game = "flappy", conn = %conn, sessions = self.store.len(), "Player connected");
    }

    fn handle_jump(&mut self, conn: ConnId) {
        // Intents for unknown connections are dropped silently
        if let Some(session) = self.store.get_mut(&conn) {
            session.jump();
        }
    }

    fn handle_disconnect(&mut self, conn: ConnId) {
        self.store.remove(&conn);
        self.outbox.detach(&conn);
        self.connected.store(self.store.len(), Ordering::Relaxed);

        info!(game = "flappy", conn = %conn, sessions = self.store.len(), "Player disconnected");
    }

    /// Advance every live session by one tick and push out the new frames.
    /// Stops the scheduler when the namespace has emptied, which makes the
    /// tick after the last disconnect an observable no-op.
    fn run_tick(&mut self) {
        if self.store.is_empty() {
            self.scheduler.stop();
            info!(game = "flappy", "Loop idle");
            return;
        }

        for (conn, session) in self.store.iter_mut() {
            if let Some(msg) = session.step(&mut self.rng) {
                self.outbox.publish(Some(conn), msg);
            }
        }
    }
}
