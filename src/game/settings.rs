//! Match Settings
//!
//! Wire-level settings as sent by clients, and the numeric values they
//! resolve to when a session is created.

use serde::{Deserialize, Serialize};

// =============================================================================
// TIERS
// =============================================================================

/// Speed tier for the ball or the paddles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    /// Slow.
    Slow,
    /// Medium.
    #[default]
    Medium,
    /// Fast.
    Fast,
}

impl SpeedTier {
    /// Ball speed in px per tick.
    pub fn ball_speed(self) -> f64 {
        match self {
            SpeedTier::Slow => 3.0,
            SpeedTier::Medium => 5.0,
            SpeedTier::Fast => 7.0,
        }
    }

    /// Paddle step in px per movement message.
    pub fn paddle_speed(self) -> f64 {
        match self {
            SpeedTier::Slow => 8.0,
            SpeedTier::Medium => 12.0,
            SpeedTier::Fast => 16.0,
        }
    }
}

/// Bot difficulty tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Slow and distracted.
    Easy,
    /// Default opponent.
    #[default]
    Medium,
    /// Nearly perfect tracking.
    Hard,
}

// =============================================================================
// WIRE SETTINGS
// =============================================================================

/// Settings block carried by `joinGame` / `joinBotGame`.
///
/// Every field is optional on the wire; missing fields take the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettings {
    /// Free-form mode label, echoed back to clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_mode: Option<String>,
    /// Bot difficulty.
    pub ai_difficulty: Difficulty,
    /// Ball speed tier.
    pub ball_speed: SpeedTier,
    /// Paddle speed tier.
    pub paddle_speed: SpeedTier,
    /// Accepted for compatibility; no powerups exist.
    pub powerups_enabled: bool,
    /// Speed the ball up on every paddle hit.
    pub accelerate_on_hit: bool,
    /// Points needed to win.
    pub score_to_win: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            game_mode: None,
            ai_difficulty: Difficulty::Medium,
            ball_speed: SpeedTier::Medium,
            paddle_speed: SpeedTier::Medium,
            powerups_enabled: false,
            accelerate_on_hit: false,
            score_to_win: DEFAULT_SCORE_TO_WIN,
        }
    }
}

/// Score threshold used when none is given.
pub const DEFAULT_SCORE_TO_WIN: u32 = 5;

/// Ball speed multiplier applied per paddle hit when acceleration is on.
pub const HIT_ACCELERATION: f64 = 1.10;

/// Accelerated speed never exceeds this multiple of the base ball speed.
pub const MAX_SPEED_FACTOR: f64 = 2.0;

impl GameSettings {
    /// Resolve tiers to the numbers the simulation runs on.
    pub fn resolve(&self) -> ResolvedSettings {
        ResolvedSettings {
            ball_speed: self.ball_speed.ball_speed(),
            paddle_speed: self.paddle_speed.paddle_speed(),
            difficulty: self.ai_difficulty,
            score_to_win: self.score_to_win.max(1),
            accelerate_on_hit: self.accelerate_on_hit,
        }
    }
}

/// Numeric settings fixed at session creation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedSettings {
    /// Base ball speed (px/tick).
    pub ball_speed: f64,
    /// Paddle step (px/message).
    pub paddle_speed: f64,
    /// Bot difficulty.
    pub difficulty: Difficulty,
    /// Points needed to win (>= 1).
    pub score_to_win: u32,
    /// Multiply velocity by [`HIT_ACCELERATION`] on paddle hits.
    pub accelerate_on_hit: bool,
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        GameSettings::default().resolve()
    }
}

impl ResolvedSettings {
    /// Upper bound on ball speed once acceleration kicks in.
    pub fn max_ball_speed(&self) -> f64 {
        self.ball_speed * MAX_SPEED_FACTOR
    }
}
