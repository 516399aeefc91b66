//! Ball and Paddle Physics
//!
//! Pure functions over [`Ball`] and [`Paddle`]. No clocks, no I/O; the
//! caller supplies the RNG for serves.

use serde::{Deserialize, Serialize};

use crate::core::rng::SessionRng;
use crate::game::settings::{ResolvedSettings, HIT_ACCELERATION};
use crate::game::state::{
    Ball, Paddle, Side, CENTER, COURT_HEIGHT, COURT_WIDTH, PADDLE_HEIGHT,
};

/// Paddle movement requested by a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards y = 0.
    Up,
    /// Towards the bottom wall.
    Down,
}

/// Maximum deflection either side of straight across (45 degrees).
const MAX_DEFLECTION: f64 = std::f64::consts::FRAC_PI_4;

// =============================================================================
// BALL
// =============================================================================

/// Advance the ball by one tick of velocity.
#[inline]
pub fn integrate(ball: &mut Ball) {
    ball.x += ball.dx;
    ball.y += ball.dy;
}

/// Reflect off the top and bottom walls.
///
/// `dy` is pointed back into the court with its magnitude kept, so a ball
/// that is still outside on the next tick does not flip back out.
/// Returns whether a bounce happened.
pub fn bounce_walls(ball: &mut Ball) -> bool {
    if ball.y <= 0.0 && ball.dy < 0.0 {
        ball.dy = -ball.dy;
        true
    } else if ball.y >= COURT_HEIGHT && ball.dy > 0.0 {
        ball.dy = -ball.dy;
        true
    } else {
        false
    }
}

/// Re-derive the ball's velocity after it meets `paddle` on `side`.
///
/// `hitPos = (ball.y - paddle.y) / PADDLE_HEIGHT` maps the contact point to
/// an angle of up to 45 degrees off the outward horizontal. The speed is
/// kept, or multiplied by [`HIT_ACCELERATION`] (capped) when acceleration
/// is on.
pub fn deflect(ball: &mut Ball, paddle: &Paddle, side: Side, settings: &ResolvedSettings) {
    let hit_pos = ((ball.y - paddle.y) / PADDLE_HEIGHT).clamp(0.0, 1.0);
    let offset = (hit_pos - 0.5) * 2.0 * MAX_DEFLECTION;
    let angle = match side {
        Side::Left => offset,
        Side::Right => std::f64::consts::PI + offset,
    };

    let speed = ball.speed();
    let new_speed = if settings.accelerate_on_hit {
        (speed * HIT_ACCELERATION).min(settings.max_ball_speed().max(speed))
    } else {
        speed
    };

    ball.dx = new_speed * angle.cos();
    ball.dy = new_speed * angle.sin();
}

/// Swept collision against one paddle.
///
/// `prev` is the ball position before this tick's integration. The ball
/// only collides while travelling towards the paddle and when the point
/// where it crosses the paddle face lies within the paddle's span. On a hit
/// the ball is parked 1 px in front of the face and deflected.
pub fn collide_paddle(
    ball: &mut Ball,
    prev: (f64, f64),
    paddle: &Paddle,
    side: Side,
    settings: &ResolvedSettings,
) -> bool {
    let plane = side.collision_plane();
    let (prev_x, prev_y) = prev;

    let crossed = match side {
        Side::Left => ball.dx < 0.0 && prev_x >= plane && ball.x <= plane,
        Side::Right => ball.dx > 0.0 && prev_x <= plane && ball.x >= plane,
    };
    if !crossed {
        return false;
    }

    let travel = ball.x - prev_x;
    let t = if travel == 0.0 { 0.0 } else { (plane - prev_x) / travel };
    let cross_y = prev_y + t * (ball.y - prev_y);

    if cross_y < paddle.y || cross_y > paddle.y + PADDLE_HEIGHT {
        return false;
    }

    ball.x = match side {
        Side::Left => plane + 1.0,
        Side::Right => plane - 1.0,
    };
    ball.y = cross_y;
    deflect(ball, paddle, side, settings);
    true
}

/// Side that scored if the ball has left the court horizontally.
pub fn scoring_side(ball: &Ball) -> Option<Side> {
    if ball.x < 0.0 {
        Some(Side::Right)
    } else if ball.x > COURT_WIDTH {
        Some(Side::Left)
    } else {
        None
    }
}

/// Put the ball back at centre with a fresh serve.
///
/// Horizontal direction is a coin flip; the vertical component is drawn from
/// `[-speed/2, speed/2)`.
pub fn serve(ball: &mut Ball, speed: f64, rng: &mut SessionRng) {
    ball.x = CENTER.0;
    ball.y = CENTER.1;
    ball.dx = rng.next_sign() * speed;
    ball.dy = (rng.next_f64() - 0.5) * speed;
}

// =============================================================================
// PADDLES
// =============================================================================

/// One movement step for a player-controlled paddle.
///
/// Returns whether the paddle actually moved (false when pinned at a wall).
pub fn step_paddle(paddle: &mut Paddle, direction: Direction, speed: f64) -> bool {
    let target = match direction {
        Direction::Up => paddle.y - speed,
        Direction::Down => paddle.y + speed,
    };
    paddle.set_y(target)
}
