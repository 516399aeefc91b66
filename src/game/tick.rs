//! Simulation Tick
//!
//! One fixed-rate logic step: bot paddle, ball integration, walls, paddles,
//! scoring. The session only calls this while the match is not paused.

use crate::core::rng::SessionRng;
use crate::game::ai::AiController;
use crate::game::physics::{bounce_walls, collide_paddle, integrate, scoring_side, serve};
use crate::game::settings::ResolvedSettings;
use crate::game::state::{Court, Side};

/// What happened during a tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickResult {
    /// Paddle the ball bounced off, if any.
    pub paddle_hit: Option<Side>,
    /// Side that won a point, if any.
    pub scored: Option<Side>,
    /// A side reached the score threshold this tick.
    pub match_over: bool,
}

/// The bot paddle, if one side is AI-driven.
#[derive(Clone, Copy, Debug)]
pub struct BotSide<'a> {
    /// Which paddle the bot owns.
    pub side: Side,
    /// Its controller.
    pub ai: &'a AiController,
}

/// Run one logic step.
///
/// After a point the ball is re-served at centre and held for
/// `serve_delay_ticks` ticks; the bot keeps moving meanwhile.
pub fn tick(
    court: &mut Court,
    settings: &ResolvedSettings,
    bot: Option<BotSide<'_>>,
    rng: &mut SessionRng,
    serve_delay_ticks: u32,
) -> TickResult {
    let mut result = TickResult::default();

    // 0. Bot paddle
    if let Some(bot) = bot {
        bot.ai.drive(court.paddles.get_mut(bot.side), &court.ball, rng);
    }

    if court.serve_freeze > 0 {
        court.serve_freeze -= 1;
        return result;
    }

    // 1. Integrate
    let prev = (court.ball.x, court.ball.y);
    integrate(&mut court.ball);

    // 2. Walls
    bounce_walls(&mut court.ball);

    // 3. Paddles
    for side in [Side::Left, Side::Right] {
        let paddle = *court.paddles.get(side);
        if collide_paddle(&mut court.ball, prev, &paddle, side, settings) {
            result.paddle_hit = Some(side);
            return result;
        }
    }

    // 4. Scoring
    if let Some(side) = scoring_side(&court.ball) {
        court.scores.award(side);
        serve(&mut court.ball, settings.ball_speed, rng);
        court.serve_freeze = serve_delay_ticks;
        result.scored = Some(side);

        // 5. Win condition
        result.match_over = court.scores.reached(settings.score_to_win);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::settings::{Difficulty, GameSettings};
    use crate::game::state::{Ball, CENTER};

    fn settings(score_to_win: u32) -> ResolvedSettings {
        GameSettings {
            score_to_win,
            ..Default::default()
        }
        .resolve()
    }

    #[test]
    fn test_ball_moves_by_velocity() {
        let mut court = Court::new(5.0, 1.0);
        let mut rng = SessionRng::new(1);

        let result = tick(&mut court, &settings(5), None, &mut rng, 0);

        assert_eq!(result, TickResult::default());
        assert_eq!(court.ball.x, CENTER.0 + 5.0);
        assert_eq!(court.ball.y, CENTER.1 + 1.0);
    }

    #[test]
    fn test_score_fires_once_and_resets() {
        let mut court = Court::new(-5.0, 0.0);
        court.ball = Ball::new(2.0, 100.0, -5.0, 0.0); // well above the left paddle
        let mut rng = SessionRng::new(1);

        let result = tick(&mut court, &settings(5), None, &mut rng, 0);

        assert_eq!(result.scored, Some(Side::Right));
        assert!(!result.match_over);
        assert_eq!(court.scores.player2, 1);
        assert_eq!((court.ball.x, court.ball.y), CENTER);

        // The next tick starts from centre, no second score
        let result = tick(&mut court, &settings(5), None, &mut rng, 0);
        assert_eq!(result.scored, None);
        assert_eq!(court.scores.player2, 1);
    }

    #[test]
    fn test_match_over_exactly_at_threshold() {
        let mut court = Court::new(5.0, 0.0);
        let mut rng = SessionRng::new(1);
        let settings = settings(2);

        court.ball = Ball::new(798.0, 50.0, 5.0, 0.0);
        let first = tick(&mut court, &settings, None, &mut rng, 0);
        assert_eq!(first.scored, Some(Side::Left));
        assert!(!first.match_over);

        court.ball = Ball::new(798.0, 50.0, 5.0, 0.0);
        let second = tick(&mut court, &settings, None, &mut rng, 0);
        assert!(second.match_over);
        assert_eq!(court.scores.player1, 2);
    }

    #[test]
    fn test_serve_delay_freezes_ball() {
        let mut court = Court::new(-5.0, 0.0);
        court.ball = Ball::new(2.0, 100.0, -5.0, 0.0);
        let mut rng = SessionRng::new(1);

        tick(&mut court, &settings(5), None, &mut rng, 3);
        assert_eq!(court.serve_freeze, 3);

        for _ in 0..3 {
            tick(&mut court, &settings(5), None, &mut rng, 3);
            assert_eq!((court.ball.x, court.ball.y), CENTER);
        }

        tick(&mut court, &settings(5), None, &mut rng, 3);
        assert_ne!(court.ball.x, CENTER.0);
    }

    #[test]
    fn test_paddle_return_prevents_score() {
        let mut court = Court::new(-5.0, 0.0);
        court.paddles.player1.y = 250.0;
        court.ball = Ball::new(63.0, 300.0, -5.0, 0.0);
        let mut rng = SessionRng::new(1);

        let result = tick(&mut court, &settings(5), None, &mut rng, 0);

        assert_eq!(result.paddle_hit, Some(Side::Left));
        assert_eq!(result.scored, None);
        assert!(court.ball.dx > 0.0);
    }

    #[test]
    fn test_bot_moves_its_paddle() {
        let mut court = Court::new(5.0, 0.0);
        court.ball.y = 550.0;
        let ai = AiController::new(Difficulty::Hard);
        let bot = BotSide { side: Side::Right, ai: &ai };
        let mut rng = SessionRng::new(5);

        for _ in 0..20 {
            tick(&mut court, &settings(5), Some(bot), &mut rng, 0);
        }

        assert!(court.paddles.player2.y > 250.0);
        assert_eq!(court.paddles.player1.y, 250.0);
    }
}
