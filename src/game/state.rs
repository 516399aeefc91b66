//! Court State
//!
//! Ball, paddles and scores for one match. Field names and JSON shape match
//! what clients render, so these types are serialized directly into
//! `gameState` snapshots.

use serde::{Deserialize, Serialize};

// =============================================================================
// COURT GEOMETRY
// =============================================================================

/// Court width in px.
pub const COURT_WIDTH: f64 = 800.0;
/// Court height in px.
pub const COURT_HEIGHT: f64 = 600.0;
/// Paddle height in px.
pub const PADDLE_HEIGHT: f64 = 100.0;
/// Paddle width in px.
pub const PADDLE_WIDTH: f64 = 10.0;
/// Lowest paddle top (court height minus paddle height).
pub const PADDLE_MAX_Y: f64 = COURT_HEIGHT - PADDLE_HEIGHT;
/// Left paddle's drawn x.
pub const LEFT_PADDLE_X: f64 = 50.0;
/// Right paddle's drawn x.
pub const RIGHT_PADDLE_X: f64 = 750.0;
/// Paddle top at kick-off.
pub const PADDLE_START_Y: f64 = 250.0;
/// Ball serve position.
pub const CENTER: (f64, f64) = (COURT_WIDTH / 2.0, COURT_HEIGHT / 2.0);

/// Which end of the court.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Player 1, paddle at x = 50.
    Left,
    /// Player 2, paddle at x = 750.
    Right,
}

impl Side {
    /// X of the face the ball bounces off.
    pub fn collision_plane(self) -> f64 {
        match self {
            Side::Left => LEFT_PADDLE_X + PADDLE_WIDTH,
            Side::Right => RIGHT_PADDLE_X,
        }
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// The ball.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    /// X position.
    pub x: f64,
    /// Y position.
    pub y: f64,
    /// X velocity (px/tick).
    pub dx: f64,
    /// Y velocity (px/tick).
    pub dy: f64,
}

impl Ball {
    /// Ball at `(x, y)` moving `(dx, dy)`.
    pub fn new(x: f64, y: f64, dx: f64, dy: f64) -> Self {
        Self { x, y, dx, dy }
    }

    /// Speed magnitude.
    #[inline]
    pub fn speed(&self) -> f64 {
        self.dx.hypot(self.dy)
    }
}

/// A paddle. `y` is its top edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    /// Drawn x (fixed per side).
    pub x: f64,
    /// Top edge, always within `[0, PADDLE_MAX_Y]`.
    pub y: f64,
}

impl Paddle {
    /// Paddle in its kick-off position for `side`.
    pub fn for_side(side: Side) -> Self {
        let x = match side {
            Side::Left => LEFT_PADDLE_X,
            Side::Right => RIGHT_PADDLE_X,
        };
        Self { x, y: PADDLE_START_Y }
    }

    /// Vertical centre.
    #[inline]
    pub fn center(&self) -> f64 {
        self.y + PADDLE_HEIGHT / 2.0
    }

    /// Set `y`, clamped to the court. Returns whether it changed.
    pub fn set_y(&mut self, y: f64) -> bool {
        let clamped = y.clamp(0.0, PADDLE_MAX_Y);
        if clamped == self.y {
            return false;
        }
        self.y = clamped;
        true
    }
}

/// Both paddles, keyed the way clients expect.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paddles {
    /// Left paddle.
    pub player1: Paddle,
    /// Right paddle.
    pub player2: Paddle,
}

impl Default for Paddles {
    fn default() -> Self {
        Self {
            player1: Paddle::for_side(Side::Left),
            player2: Paddle::for_side(Side::Right),
        }
    }
}

impl Paddles {
    /// Paddle for `side`.
    pub fn get(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.player1,
            Side::Right => &self.player2,
        }
    }

    /// Mutable paddle for `side`.
    pub fn get_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.player1,
            Side::Right => &mut self.player2,
        }
    }
}

/// Points per side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    /// Left side.
    pub player1: u32,
    /// Right side.
    pub player2: u32,
}

impl Scores {
    /// Award a point to `side`.
    pub fn award(&mut self, side: Side) {
        match side {
            Side::Left => self.player1 += 1,
            Side::Right => self.player2 += 1,
        }
    }

    /// Score for `side`.
    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.player1,
            Side::Right => self.player2,
        }
    }

    /// Either side has reached `threshold`.
    pub fn reached(&self, threshold: u32) -> bool {
        self.player1 >= threshold || self.player2 >= threshold
    }

    /// Winning side at termination. Ties go to the right side.
    pub fn leader(&self) -> Side {
        if self.player1 > self.player2 {
            Side::Left
        } else {
            Side::Right
        }
    }
}

// =============================================================================
// COURT
// =============================================================================

/// Full simulation state of one match.
#[derive(Clone, Debug, PartialEq)]
pub struct Court {
    /// The ball.
    pub ball: Ball,
    /// Both paddles.
    pub paddles: Paddles,
    /// Current score.
    pub scores: Scores,
    /// Ticks the ball stays parked at centre before the next serve moves.
    pub serve_freeze: u32,
}

impl Court {
    /// Fresh court with the ball at centre, moving `(dx, dy)`.
    pub fn new(dx: f64, dy: f64) -> Self {
        Self {
            ball: Ball::new(CENTER.0, CENTER.1, dx, dy),
            paddles: Paddles::default(),
            scores: Scores::default(),
            serve_freeze: 0,
        }
    }
}
