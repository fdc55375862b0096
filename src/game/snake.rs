//! Snake sessions and authoritative grid movement
//!
//! Every connection owns an independent board. Direction intents are
//! buffered and applied at the next tick boundary, so a burst of inputs
//! between ticks can never fold the snake back onto its own neck.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::info;

use crate::ws::protocol::{GridVec, SnakeClientMsg, SnakeServerMsg};

use super::outbox::{FanOut, Outbox};
use super::scheduler::TickScheduler;
use super::store::SessionStore;
use super::{
    ConnId, GameHandle, GatewayCmd, CANVAS_HEIGHT, CANVAS_WIDTH, CMD_CHANNEL_CAPACITY,
};

/// Simulation rate, ticks per second
pub const TICKS_PER_SECOND: u64 = 15;

/// Pixel size of one grid cell, announced to the client in `init`
pub const GRID_SIZE: i32 = 20;
/// Board dimensions in cells
pub const TILE_COUNT_X: i32 = CANVAS_WIDTH as i32 / GRID_SIZE;
pub const TILE_COUNT_Y: i32 = CANVAS_HEIGHT as i32 / GRID_SIZE;

/// Every run starts moving upward
const INITIAL_DIRECTION: GridVec = GridVec::new(0, -1);

pub type SnakeHandle = GameHandle<SnakeClientMsg, SnakeServerMsg>;

/// Uniform random board cell. Food placement does not avoid the snake body;
/// an overlapping spawn just gets eaten on contact like any other.
fn random_cell(rng: &mut impl Rng) -> GridVec {
    GridVec::new(
        rng.gen_range(0..TILE_COUNT_X),
        rng.gen_range(0..TILE_COUNT_Y),
    )
}

/// One connection's board state
#[derive(Debug, Clone)]
pub struct SnakeSession {
    /// Body segments, head at index 0
    pub snake: Vec<GridVec>,
    /// Direction applied during the last tick
    pub velocity: GridVec,
    /// Direction buffered for the next tick
    pub next_velocity: GridVec,
    pub food: GridVec,
    pub score: u32,
    pub game_over: bool,
}

impl SnakeSession {
    pub fn new(rng: &mut impl Rng) -> Self {
        Self {
            snake: vec![
                GridVec::new(10, 10),
                GridVec::new(10, 11),
                GridVec::new(10, 12),
            ],
            velocity: INITIAL_DIRECTION,
            next_velocity: INITIAL_DIRECTION,
            food: random_cell(rng),
            score: 0,
            game_over: false,
        }
    }

    /// Buffer a direction change for the next tick. Non-unit vectors are
    /// rejected, as is any turn onto the axis the snake is already moving
    /// along, which rules out instant 180° reversals.
    pub fn change_direction(&mut self, dir: GridVec) {
        if !dir.is_unit_direction() {
            return;
        }
        let perpendicular =
            (dir.x == 0 && self.velocity.x != 0) || (dir.y == 0 && self.velocity.y != 0);
        if perpendicular {
            self.next_velocity = dir;
        }
    }

    /// Advance one tick. Returns the frame to deliver to the owner, or
    /// `None` once the session is dead.
    pub fn step(&mut self, rng: &mut impl Rng) -> Option<SnakeServerMsg> {
        if self.game_over {
            return None;
        }

        self.velocity = self.next_velocity;
        let head = self.snake[0] + self.velocity;

        let hit_wall =
            head.x < 0 || head.x >= TILE_COUNT_X || head.y < 0 || head.y >= TILE_COUNT_Y;
        // The tail has not moved yet this tick, so entering its current
        // cell still counts as a hit
        let hit_self = self.snake.iter().any(|segment| *segment == head);
        if hit_wall || hit_self {
            self.game_over = true;
            return Some(SnakeServerMsg::GameOver { score: self.score });
        }

        self.snake.insert(0, head);
        if head == self.food {
            self.score += 1;
            self.food = random_cell(rng);
        } else {
            self.snake.pop();
        }

        Some(SnakeServerMsg::GameState {
            snake: self.snake.clone(),
            velocity: self.velocity,
            next_velocity: self.next_velocity,
            food: self.food,
            score: self.score,
            game_over: self.game_over,
        })
    }
}

/// Snake game task: owns all sessions in the namespace
pub struct SnakeGame {
    cmd_rx: mpsc::Receiver<GatewayCmd<SnakeClientMsg, SnakeServerMsg>>,
    store: SessionStore<SnakeSession>,
    outbox: Outbox<SnakeServerMsg>,
    scheduler: TickScheduler,
    rng: ChaCha8Rng,
    connected: Arc<AtomicUsize>,
}

impl SnakeGame {
    pub fn new(seed: u64) -> (Self, SnakeHandle) {
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
        info!(game = "snake", "Game task started");

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

        info!(game = "snake", "Game task stopped");
    }

    fn handle_command(&mut self, cmd: GatewayCmd<SnakeClientMsg, SnakeServerMsg>) {
        match cmd {
            GatewayCmd::Connect { conn, sender } => self.handle_connect(conn, sender),
            GatewayCmd::Intent { conn, msg } => match msg {
                SnakeClientMsg::ChangeDirection { x, y } => {
                    self.handle_change_direction(conn, GridVec::new(x, y));
                }
            },
            GatewayCmd::Disconnect { conn } => self.handle_disconnect(conn),
        }
    }

    fn handle_connect(&mut self, conn: ConnId, sender: mpsc::Sender<SnakeServerMsg>) {
        self.outbox.attach(conn, sender);
        let session = SnakeSession::new(&mut self.rng);
        self.store.create(conn, session);
        self.connected.store(self.store.len(), Ordering::Relaxed);

        // Every session owner is player1 on their own board; the client
        // derives the tile grid from the pixel dimensions and cell size
        self.outbox.unicast(
            &conn,
            SnakeServerMsg::Init {
                role: "player1".to_string(),
                grid_size: GRID_SIZE,
                width: CANVAS_WIDTH as i32,
                height: CANVAS_HEIGHT as i32,
            },
        );
        if !self.scheduler.is_running() {
            self.scheduler.start();
            info!(game = "snake", "Loop started");
        }

        info!(game = "snake", conn = %conn, sessions = self.store.len(), "Player connected");
    }

    fn handle_change_direction(&mut self, conn: ConnId, dir: GridVec) {
        if let Some(session) = self.store.get_mut(&conn) {
            if session.game_over {
                // Any direction intent on a dead session restarts it; the
                // requested direction is consumed, not applied, and the new
                // run begins moving upward as usual
                *session = SnakeSession::new(&mut self.rng);
            } else {
                session.change_direction(dir);
            }
        }
    }

    fn handle_disconnect(&mut self, conn: ConnId) {
        self.store.remove(&conn);
        self.outbox.detach(&conn);
        self.connected.store(self.store.len(), Ordering::Relaxed);

        info!(game = "snake", conn = %conn, sessions = self.store.len(), "Player disconnected");
    }

    /// Advance every live session by one tick and push out the new frames.
    /// Stops the scheduler when the namespace has emptied.
    fn run_tick(&mut self) {
        if self.store.is_empty() {
            self.scheduler.stop();
            info!(game = "snake", "Loop idle");
            return;
        }

        for (conn, session) in self.store.iter_mut() {
            if let Some(msg) = session.step(&mut self.rng) {
                self.outbox.publish(Some(conn), msg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    /// Session with the food parked out of the way for deterministic moves
    fn session_with_food_at(food: GridVec) -> SnakeSession {
        let mut session = SnakeSession::new(&mut test_rng());
        session.food = food;
        session
    }

    #[test]
    fn test_new_session_layout() {
        let session = SnakeSession::new(&mut test_rng());
        assert_eq!(
            session.snake,
            vec![
                GridVec::new(10, 10),
                GridVec::new(10, 11),
                GridVec::new(10, 12)
            ]
        );
        assert_eq!(session.velocity, GridVec::new(0, -1));
        assert_eq!(session.next_velocity, GridVec::new(0, -1));
        assert_eq!(session.score, 0);
        assert!(!session.game_over);
        assert!(session.food.x >= 0 && session.food.x < TILE_COUNT_X);
        assert!(session.food.y >= 0 && session.food.y < TILE_COUNT_Y);
    }

    #[test]
    fn test_step_moves_head_and_keeps_length() {
        let mut session = session_with_food_at(GridVec::new(0, 0));
        let msg = session.step(&mut test_rng());

        assert!(matches!(msg, Some(SnakeServerMsg::GameState { .. })));
        assert_eq!(
            session.snake,
            vec![
                GridVec::new(10, 9),
                GridVec::new(10, 10),
                GridVec::new(10, 11)
            ]
        );
    }

    #[test]
    fn test_eating_food_grows_and_scores() {
        let mut session = session_with_food_at(GridVec::new(10, 9));
        session.step(&mut test_rng());

        assert_eq!(session.score, 1);
        assert_eq!(
            session.snake,
            vec![
                GridVec::new(10, 9),
                GridVec::new(10, 10),
                GridVec::new(10, 11),
                GridVec::new(10, 12)
            ]
        );
        // Fresh food lands somewhere on the board
        assert!(session.food.x >= 0 && session.food.x < TILE_COUNT_X);
        assert!(session.food.y >= 0 && session.food.y < TILE_COUNT_Y);
    }

    #[test]
    fn test_reversal_is_rejected() {
        let mut session = session_with_food_at(GridVec::new(0, 0));
        session.change_direction(GridVec::new(0, 1));
        assert_eq!(session.next_velocity, GridVec::new(0, -1));
    }

    #[test]
    fn test_perpendicular_turn_is_buffered_until_tick() {
        let mut session = session_with_food_at(GridVec::new(0, 0));
        session.change_direction(GridVec::new(1, 0));
        assert_eq!(session.next_velocity, GridVec::new(1, 0));
        assert_eq!(session.velocity, GridVec::new(0, -1), "not applied yet");

        session.step(&mut test_rng());
        assert_eq!(session.velocity, GridVec::new(1, 0));
        assert_eq!(session.snake[0], GridVec::new(11, 10));
    }

    #[test]
    fn test_non_unit_vectors_are_rejected() {
        let mut session = session_with_food_at(GridVec::new(0, 0));
        for dir in [
            GridVec::new(0, 0),
            GridVec::new(1, 1),
            GridVec::new(0, 2),
            GridVec::new(-2, 0),
        ] {
            session.change_direction(dir);
            assert_eq!(session.next_velocity, GridVec::new(0, -1), "{dir:?}");
        }
    }

    #[test]
    fn test_turns_validate_against_applied_velocity() {
        // Moving up, buffer a left turn, then overwrite it with a right
        // turn before the tick: both are perpendicular to the applied
        // direction, so the last one wins
        let mut session = session_with_food_at(GridVec::new(0, 0));
        session.change_direction(GridVec::new(1, 0));
        session.change_direction(GridVec::new(-1, 0));
        assert_eq!(session.next_velocity, GridVec::new(-1, 0));

        session.step(&mut test_rng());
        assert_eq!(session.snake[0], GridVec::new(9, 10));
    }

    #[test]
    fn test_wall_hit_ends_run_without_moving_body() {
        let mut session = session_with_food_at(GridVec::new(0, 0));
        session.snake = vec![
            GridVec::new(39, 10),
            GridVec::new(38, 10),
            GridVec::new(37, 10),
        ];
        session.velocity = GridVec::new(1, 0);
        session.next_velocity = GridVec::new(1, 0);
        session.score = 3;

        let msg = session.step(&mut test_rng());
        assert!(matches!(msg, Some(SnakeServerMsg::GameOver { score: 3 })));
        assert!(session.game_over);
        assert_eq!(session.snake[0], GridVec::new(39, 10), "body unchanged");
        assert_eq!(session.snake.len(), 3);
    }

    #[test]
    fn test_self_collision_ends_run() {
        let mut session = session_with_food_at(GridVec::new(0, 0));
        session.snake = vec![
            GridVec::new(5, 5),
            GridVec::new(5, 6),
            GridVec::new(6, 6),
            GridVec::new(6, 5),
        ];
        session.velocity = GridVec::new(0, -1);
        session.next_velocity = GridVec::new(1, 0);

        let msg = session.step(&mut test_rng());
        assert!(matches!(msg, Some(SnakeServerMsg::GameOver { .. })));
        assert!(session.game_over);
    }

    #[test]
    fn test_current_tail_cell_is_lethal() {
        // The tail would vacate (5,6) this tick, but the hit check runs
        // against the unmoved body
        let mut session = session_with_food_at(GridVec::new(0, 0));
        session.snake = vec![
            GridVec::new(5, 5),
            GridVec::new(6, 5),
            GridVec::new(6, 6),
            GridVec::new(5, 6),
        ];
        session.velocity = GridVec::new(-1, 0);
        session.next_velocity = GridVec::new(0, 1);

        let msg = session.step(&mut test_rng());
        assert!(matches!(msg, Some(SnakeServerMsg::GameOver { .. })));
    }

    #[test]
    fn test_dead_session_is_frozen() {
        let mut session = session_with_food_at(GridVec::new(0, 0));
        session.game_over = true;
        session.score = 4;
        let before = session.clone();

        for _ in 0..3 {
            assert!(session.step(&mut test_rng()).is_none());
        }
        assert_eq!(session.snake, before.snake);
        assert_eq!(session.score, before.score);
    }

    #[tokio::test]
    async fn test_connect_sends_board_geometry() {
        let (mut game, _handle) = SnakeGame::new(11);
        let (tx, mut rx) = mpsc::channel(8);
        let conn = ConnId::new_v4();

        game.handle_connect(conn, tx);
        assert!(game.scheduler.is_running());

        match rx.try_recv() {
            Ok(SnakeServerMsg::Init {
                role,
                grid_size,
                width,
                height,
            }) => {
                assert_eq!(role, "player1");
                assert_eq!(grid_size, 20);
                assert_eq!(width, 800);
                assert_eq!(height, 600);
            }
            other => panic!("expected init frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_direction_intent_on_dead_session_restarts_it() {
        let (mut game, _handle) = SnakeGame::new(11);
        let (tx, _rx) = mpsc::channel(8);
        let conn = ConnId::new_v4();
        game.handle_connect(conn, tx);

        {
            let session = game.store.get_mut(&conn).unwrap();
            session.game_over = true;
            session.score = 5;
        }

        game.handle_change_direction(conn, GridVec::new(1, 0));
        let session = game.store.get_mut(&conn).unwrap();
        assert!(!session.game_over);
        assert_eq!(session.score, 0);
        assert_eq!(session.snake[0], GridVec::new(10, 10));
        // The restart consumed the intent rather than applying it
        assert_eq!(session.next_velocity, GridVec::new(0, -1));
    }

    #[tokio::test]
    async fn test_tick_keeps_sessions_isolated() {
        let (mut game, _handle) = SnakeGame::new(11);
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let conn_a = ConnId::new_v4();
        let conn_b = ConnId::new_v4();
        game.handle_connect(conn_a, tx_a);
        game.handle_connect(conn_b, tx_b);
        rx_a.try_recv().expect("init for a");
        rx_b.try_recv().expect("init for b");

        game.handle_change_direction(conn_a, GridVec::new(1, 0));
        game.run_tick();

        match rx_a.try_recv() {
            Ok(SnakeServerMsg::GameState { snake, .. }) => {
                assert_eq!(snake[0], GridVec::new(11, 10));
            }
            other => panic!("expected state frame, got {other:?}"),
        }
        match rx_b.try_recv() {
            Ok(SnakeServerMsg::GameState { snake, .. }) => {
                assert_eq!(snake[0], GridVec::new(10, 9), "b kept its own heading");
            }
            other => panic!("expected state frame, got {other:?}"),
        }
        assert!(rx_a.try_recv().is_err(), "one frame per session per tick");
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_first_empty_tick() {
        let (mut game, _handle) = SnakeGame::new(11);
        let (tx, _rx) = mpsc::channel(8);
        let conn = ConnId::new_v4();

        game.handle_connect(conn, tx);
        game.handle_disconnect(conn);
        assert!(game.scheduler.is_running());

        game.run_tick();
        assert!(!game.scheduler.is_running());
    }
}
