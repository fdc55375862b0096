//! WebSocket protocol message definitions
//! These are the wire types for client-server communication, one enum pair
//! per game namespace. Frames are JSON objects tagged with an `event` field.

use serde::{Deserialize, Serialize};

use crate::game::ConnId;

// ============================================================================
// Pong
// ============================================================================

/// Role handed to a pong connection at join time, fixed for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PongRole {
    Player1,
    Player2,
    Spectator,
}

/// Which connection currently holds each paddle slot (None = vacant)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSlots {
    pub player1: Option<ConnId>,
    pub player2: Option<ConnId>,
}

impl PlayerSlots {
    pub fn both_filled(&self) -> bool {
        self.player1.is_some() && self.player2.is_some()
    }

    /// Role of the given connection, derived from slot ownership
    pub fn role_of(&self, conn: ConnId) -> PongRole {
        if self.player1 == Some(conn) {
            PongRole::Player1
        } else if self.player2 == Some(conn) {
            PongRole::Player2
        } else {
            PongRole::Spectator
        }
    }

    /// Clear whichever slot the connection holds, if any
    pub fn vacate(&mut self, conn: ConnId) {
        if self.player1 == Some(conn) {
            self.player1 = None;
        } else if self.player2 == Some(conn) {
            self.player2 = None;
        }
    }
}

/// Paddle Y positions (top edge), in canvas units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paddles {
    pub player1: f64,
    pub player2: f64,
}

/// Ball position and velocity; `x`/`y` anchor the top-left of its square
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

/// Match score per slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub player1: u32,
    pub player2: u32,
}

/// Messages sent from pong clients to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PongClientMsg {
    /// Desired paddle position as a ratio of its travel range, 0.0 = top
    PaddleMove { ratio: f64 },
}

/// Messages sent from the server to pong clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PongServerMsg {
    /// Sent once on connect with the assigned role
    Init { role: PongRole },

    /// Full shared match state, broadcast to every socket in the namespace
    GameState {
        players: PlayerSlots,
        paddles: Paddles,
        ball: Ball,
        score: Scores,
    },
}

// ============================================================================
// Snake
// ============================================================================

/// Integer grid vector, used for cells, food, and velocities alike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridVec {
    pub x: i32,
    pub y: i32,
}

impl GridVec {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True for the four axis unit vectors the game accepts as directions
    pub fn is_unit_direction(self) -> bool {
        (self.x.abs() == 1 && self.y == 0) || (self.x == 0 && self.y.abs() == 1)
    }
}

impl std::ops::Add for GridVec {
    type Output = GridVec;

    fn add(self, rhs: GridVec) -> GridVec {
        GridVec::new(self.x + rhs.x, self.y + rhs.y)
    }
}

/// Messages sent from snake clients to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SnakeClientMsg {
    /// Requested direction as a unit vector with one axis zero
    ChangeDirection { x: i32, y: i32 },
}

/// Messages sent from the server to snake clients (all unicast to the owner)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SnakeServerMsg {
    /// Sent once on connect with the board geometry
    #[serde(rename_all = "camelCase")]
    Init {
        role: String,
        grid_size: i32,
        width: i32,
        height: i32,
    },

    /// Full session state, sent every live tick
    #[serde(rename_all = "camelCase")]
    GameState {
        /// Body segments, head first
        snake: Vec<GridVec>,
        velocity: GridVec,
        next_velocity: GridVec,
        food: GridVec,
        score: u32,
        game_over: bool,
    },

    /// Sent once on the transition to the terminal state
    GameOver { score: u32 },
}

// ============================================================================
// Flappy Bird
// ============================================================================

/// Bird state; horizontal position is fixed and announced via `init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bird {
    pub y: f64,
    pub velocity: f64,
    pub radius: f64,
}

/// One pipe pair: top pipe spans [0, top_height], the gap sits below it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipe {
    /// Left edge, in canvas units
    pub x: f64,
    /// Bottom of the top pipe (top of the gap)
    pub top_height: f64,
    /// Latched once the pipe has scored, so it scores at most once
    pub passed: bool,
}

/// Messages sent from flappy clients to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FlappyClientMsg {
    Jump,
}

/// Messages sent from the server to flappy clients (all unicast to the owner)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FlappyServerMsg {
    /// Sent once on connect with the fixed bird x position
    Init { x: f64 },

    /// Full session state, sent every live tick
    GameState {
        bird: Bird,
        pipes: Vec<Pipe>,
        score: u32,
    },

    /// Sent once on the transition to the terminal state
    GameOver { score: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_pong_client_msg_parses_tagged_payload() {
        let msg: PongClientMsg = serde_json::from_str(r#"{"event":"paddleMove","ratio":0.25}"#)
            .expect("paddleMove should parse");
        let PongClientMsg::PaddleMove { ratio } = msg;
        assert_eq!(ratio, 0.25);
    }

    #[test]
    fn test_flappy_jump_parses_without_payload() {
        let msg: FlappyClientMsg =
            serde_json::from_str(r#"{"event":"jump"}"#).expect("jump should parse");
        assert!(matches!(msg, FlappyClientMsg::Jump));
    }

    #[test]
    fn test_snake_change_direction_parses() {
        let msg: SnakeClientMsg =
            serde_json::from_str(r#"{"event":"changeDirection","x":0,"y":-1}"#)
                .expect("changeDirection should parse");
        let SnakeClientMsg::ChangeDirection { x, y } = msg;
        assert_eq!((x, y), (0, -1));
    }

    #[test]
    fn test_snake_game_state_uses_camel_case_fields() {
        let msg = SnakeServerMsg::GameState {
            snake: vec![GridVec::new(10, 10)],
            velocity: GridVec::new(0, -1),
            next_velocity: GridVec::new(1, 0),
            food: GridVec::new(5, 5),
            score: 2,
            game_over: false,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "gameState");
        assert_eq!(json["nextVelocity"]["x"], 1);
        assert_eq!(json["gameOver"], false);
        assert_eq!(json["snake"][0]["y"], 10);
    }

    #[test]
    fn test_flappy_pipe_serializes_top_height_camel_case() {
        let msg = FlappyServerMsg::GameState {
            bird: Bird {
                y: 300.0,
                velocity: -10.0,
                radius: 15.0,
            },
            pipes: vec![Pipe {
                x: 800.0,
                top_height: 120.0,
                passed: false,
            }],
            score: 0,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["pipes"][0]["topHeight"], 120.0);
        assert_eq!(json["bird"]["radius"], 15.0);
    }

    #[test]
    fn test_pong_roles_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(PongRole::Spectator).unwrap(),
            serde_json::json!("spectator")
        );
        let init = PongServerMsg::Init {
            role: PongRole::Player1,
        };
        let json = serde_json::to_value(&init).unwrap();
        assert_eq!(json["event"], "init");
        assert_eq!(json["role"], "player1");
    }

    #[test]
    fn test_pong_game_state_includes_slot_ids() {
        let id = Uuid::new_v4();
        let msg = PongServerMsg::GameState {
            players: PlayerSlots {
                player1: Some(id),
                player2: None,
            },
            paddles: Paddles {
                player1: 250.0,
                player2: 250.0,
            },
            ball: Ball {
                x: 400.0,
                y: 300.0,
                dx: 5.0,
                dy: 5.0,
            },
            score: Scores::default(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["players"]["player1"], serde_json::json!(id));
        assert!(json["players"]["player2"].is_null());
        assert_eq!(json["ball"]["dx"], 5.0);
    }

    #[test]
    fn test_grid_vec_unit_direction_check() {
        assert!(GridVec::new(0, 1).is_unit_direction());
        assert!(GridVec::new(-1, 0).is_unit_direction());
        assert!(!GridVec::new(1, 1).is_unit_direction());
        assert!(!GridVec::new(0, 0).is_unit_direction());
        assert!(!GridVec::new(2, 0).is_unit_direction());
    }

    #[test]
    fn test_player_slots_roles_and_vacate() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut slots = PlayerSlots {
            player1: Some(a),
            player2: Some(b),
        };
        assert_eq!(slots.role_of(a), PongRole::Player1);
        assert_eq!(slots.role_of(b), PongRole::Player2);
        assert_eq!(slots.role_of(Uuid::new_v4()), PongRole::Spectator);

        slots.vacate(a);
        assert!(slots.player1.is_none());
        assert!(!slots.both_filled());
        // Vacating an unknown connection leaves the remaining slot alone
        slots.vacate(Uuid::new_v4());
        assert_eq!(slots.player2, Some(b));
    }
}
