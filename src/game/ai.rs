//! Bot Paddle Controller
//!
//! Drives the synthetic opponent's paddle. Each tick the bot rolls whether
//! it reacts at all; if it does, it nudges its paddle centre towards the
//! ball unless the ball is already inside its dead zone.

use crate::core::rng::SessionRng;
use crate::game::settings::Difficulty;
use crate::game::state::{Ball, Paddle};

/// Tuning for one difficulty tier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AiProfile {
    /// Paddle movement per reacting tick (px).
    pub move_speed: f64,
    /// Probability of reacting on a given tick.
    pub react_chance: f64,
    /// Offsets at or below this are ignored (px).
    pub dead_zone: f64,
}

impl AiProfile {
    /// Profile for `difficulty`.
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => Self { move_speed: 2.0, react_chance: 0.60, dead_zone: 50.0 },
            Difficulty::Medium => Self { move_speed: 3.0, react_chance: 0.80, dead_zone: 30.0 },
            Difficulty::Hard => Self { move_speed: 5.0, react_chance: 0.95, dead_zone: 10.0 },
        }
    }
}

/// AI state attached to a bot peer.
#[derive(Clone, Debug, PartialEq)]
pub struct AiController {
    profile: AiProfile,
}

impl AiController {
    /// Controller tuned for `difficulty`.
    pub fn new(difficulty: Difficulty) -> Self {
        Self { profile: AiProfile::for_difficulty(difficulty) }
    }

    /// Roll whether the bot reacts this tick.
    #[inline]
    pub fn reacts(&self, rng: &mut SessionRng) -> bool {
        rng.chance(self.profile.react_chance)
    }

    /// Move `paddle` towards `ball` if the bot reacts this tick.
    ///
    /// Returns whether the paddle moved.
    pub fn drive(&self, paddle: &mut Paddle, ball: &Ball, rng: &mut SessionRng) -> bool {
        if !self.reacts(rng) {
            return false;
        }
        self.track(paddle, ball)
    }

    /// The movement half of [`drive`](Self::drive), without the reaction roll.
    pub fn track(&self, paddle: &mut Paddle, ball: &Ball) -> bool {
        let offset = ball.y - paddle.center();
        if offset.abs() <= self.profile.dead_zone {
            return false;
        }
        let step = self.profile.move_speed.copysign(offset);
        paddle.set_y(paddle.y + step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Side, PADDLE_MAX_Y};

    fn reaction_rate(difficulty: Difficulty, seed: u64, samples: usize) -> f64 {
        let ai = AiController::new(difficulty);
        let mut rng = SessionRng::new(seed);
        let reacted = (0..samples).filter(|_| ai.reacts(&mut rng)).count();
        reacted as f64 / samples as f64
    }

    #[test]
    fn test_reaction_rates_match_tiers() {
        // 5000 samples keeps the 3-sigma band under 2.1 percentage points
        let easy = reaction_rate(Difficulty::Easy, 42, 5000);
        let medium = reaction_rate(Difficulty::Medium, 42, 5000);
        let hard = reaction_rate(Difficulty::Hard, 42, 5000);

        assert!((easy - 0.60).abs() < 0.03, "easy = {}", easy);
        assert!((medium - 0.80).abs() < 0.03, "medium = {}", medium);
        assert!((hard - 0.95).abs() < 0.02, "hard = {}", hard);
    }

    #[test]
    fn test_tracks_towards_ball() {
        let ai = AiController::new(Difficulty::Hard);
        let mut paddle = Paddle::for_side(Side::Right);
        let ball = Ball::new(400.0, 500.0, 5.0, 0.0);

        assert!(ai.track(&mut paddle, &ball));
        assert_eq!(paddle.y, 255.0);

        let ball = Ball::new(400.0, 100.0, 5.0, 0.0);
        assert!(ai.track(&mut paddle, &ball));
        assert_eq!(paddle.y, 250.0);
    }

    #[test]
    fn test_dead_zone_holds_still() {
        let ai = AiController::new(Difficulty::Easy);
        let mut paddle = Paddle::for_side(Side::Right);
        // centre is 300; offset 40 < 50
        let ball = Ball::new(400.0, 340.0, 5.0, 0.0);

        assert!(!ai.track(&mut paddle, &ball));
        assert_eq!(paddle.y, 250.0);
    }

    #[test]
    fn test_bot_paddle_stays_on_court() {
        let ai = AiController::new(Difficulty::Hard);
        let mut paddle = Paddle { x: 750.0, y: PADDLE_MAX_Y - 1.0 };
        let ball = Ball::new(400.0, 599.0, 5.0, 0.0);

        for _ in 0..10 {
            ai.track(&mut paddle, &ball);
        }
        assert_eq!(paddle.y, PADDLE_MAX_Y);
    }

    #[test]
    fn test_drive_is_reproducible() {
        let ai = AiController::new(Difficulty::Medium);
        let ball = Ball::new(400.0, 550.0, 5.0, 0.0);

        let run = |seed| {
            let mut rng = SessionRng::new(seed);
            let mut paddle = Paddle::for_side(Side::Right);
            for _ in 0..50 {
                ai.drive(&mut paddle, &ball, &mut rng);
            }
            paddle.y
        };

        assert_eq!(run(9), run(9));
    }
}
