//! Game Logic Module
//!
//! The court simulation. Nothing here knows about sockets, sessions or
//! persistence; it is driven one tick at a time by the network layer.
//!
//! ## Module Structure
//!
//! - `settings`: Per-match options and their numeric resolution
//! - `state`: Court geometry, ball, paddles, scores
//! - `physics`: Movement, wall bounce, paddle collision, serve
//! - `ai`: Bot paddle controller
//! - `tick`: One authoritative simulation step

pub mod ai;
pub mod physics;
pub mod settings;
pub mod state;
pub mod tick;

// Re-export key types
pub use ai::{AiController, AiProfile};
pub use physics::Direction;
pub use settings::{Difficulty, GameSettings, ResolvedSettings, SpeedTier};
pub use state::{Ball, Court, Paddle, Paddles, Scores, Side};
pub use tick::{tick, BotSide, TickResult};
