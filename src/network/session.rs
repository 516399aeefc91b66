//! Match Session Management
//!
//! One [`MatchSession`] per running match: the court, both peers, the
//! lifecycle state machine and the broadcast throttle. Sessions are owned
//! by the reactor through a [`SessionRegistry`]; nothing here locks.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::rng::SessionRng;
use crate::game::ai::AiController;
use crate::game::physics::{serve, step_paddle, Direction};
use crate::game::settings::{GameSettings, ResolvedSettings};
use crate::game::state::{Court, Side};
use crate::game::tick::{tick, BotSide, TickResult};
use crate::network::protocol::{
    GameEndInfo, GameId, GameStartInfo, GameStateUpdate, MatchPlayers, PauseNotice, PlayerInfo,
    ServerMessage, UserId, UserIdentity, BOT_USERNAME, BOT_USER_ID,
};
use crate::store::FinishedMatch;

/// Unique connection identifier.
pub type ConnectionId = Uuid;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Ticking.
    Playing,
    /// Frozen; broadcasts continue.
    Paused,
    /// Terminal.
    Finished,
}

/// Timing knobs shared by every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Logic ticks per second.
    pub tick_rate: u32,
    /// Minimum gap between periodic `gameState` broadcasts.
    pub broadcast_interval: Duration,
    /// Ticks the ball is held at centre after a point.
    pub serve_delay_ticks: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::TICK_RATE,
            broadcast_interval: Duration::from_millis(33),
            serve_delay_ticks: 60,
        }
    }
}

impl SessionConfig {
    /// Time between logic ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

// =============================================================================
// PEERS
// =============================================================================

/// Outbound half of a client connection.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Connection id.
    pub id: ConnectionId,
    sender: mpsc::Sender<ServerMessage>,
}

impl Connection {
    /// Wrap the writer channel of connection `id`.
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, sender }
    }

    /// Queue `message` without waiting. Drops it if the buffer is full or
    /// the writer is gone; returns whether it was queued.
    pub fn send(&self, message: ServerMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn = %self.id, "Outbound buffer full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn = %self.id, "Connection writer closed, dropping message");
                false
            }
        }
    }
}

/// One end of a match.
#[derive(Debug, Clone)]
pub enum Peer {
    /// A networked player.
    Human {
        /// Who they are.
        user: UserIdentity,
        /// Where to send.
        conn: Connection,
    },
    /// The synthetic opponent.
    Bot(AiController),
}

impl Peer {
    /// User id; [`BOT_USER_ID`] for the bot.
    pub fn user_id(&self) -> UserId {
        match self {
            Peer::Human { user, .. } => user.user_id,
            Peer::Bot(_) => BOT_USER_ID,
        }
    }

    /// Display name.
    pub fn username(&self) -> &str {
        match self {
            Peer::Human { user, .. } => &user.username,
            Peer::Bot(_) => BOT_USERNAME,
        }
    }

    /// Connection id, if networked.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            Peer::Human { conn, .. } => Some(conn.id),
            Peer::Bot(_) => None,
        }
    }

    /// Deliver `message`. A no-op for the bot.
    pub fn send(&self, message: &ServerMessage) {
        if let Peer::Human { conn, .. } = self {
            conn.send(message.clone());
        }
    }

    /// Controller, if this is the bot.
    pub fn ai(&self) -> Option<&AiController> {
        match self {
            Peer::Bot(ai) => Some(ai),
            Peer::Human { .. } => None,
        }
    }

    /// As shown in `gameStart`.
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            user_id: self.user_id(),
            username: self.username().to_string(),
        }
    }
}

// =============================================================================
// MATCH SESSION
// =============================================================================

/// A running match.
pub struct MatchSession {
    /// Session id (also the record id).
    pub id: GameId,
    state: SessionState,
    court: Court,
    settings: GameSettings,
    resolved: ResolvedSettings,
    player1: Peer,
    player2: Peer,
    rng: SessionRng,
    config: SessionConfig,
    last_broadcast: Instant,
    ticker: Option<AbortHandle>,
    ticks: u64,
}

impl MatchSession {
    /// Create a session in `Playing` with the ball served from centre.
    pub fn new(
        id: GameId,
        player1: Peer,
        player2: Peer,
        settings: GameSettings,
        config: SessionConfig,
        seed: u64,
    ) -> Self {
        let resolved = settings.resolve();
        let mut rng = SessionRng::new(seed);
        let mut court = Court::new(0.0, 0.0);
        serve(&mut court.ball, resolved.ball_speed, &mut rng);

        Self {
            id,
            state: SessionState::Playing,
            court,
            settings,
            resolved,
            player1,
            player2,
            rng,
            config,
            last_broadcast: Instant::now(),
            ticker: None,
            ticks: 0,
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Simulation state.
    pub fn court(&self) -> &Court {
        &self.court
    }

    /// Mutable simulation state.
    pub fn court_mut(&mut self) -> &mut Court {
        &mut self.court
    }

    /// Numeric settings.
    pub fn settings(&self) -> &ResolvedSettings {
        &self.resolved
    }

    /// Peer on `side`.
    pub fn peer(&self, side: Side) -> &Peer {
        match side {
            Side::Left => &self.player1,
            Side::Right => &self.player2,
        }
    }

    /// Logic ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Side owned by connection `conn`, if either.
    pub fn side_of(&self, conn: ConnectionId) -> Option<Side> {
        if self.player1.connection_id() == Some(conn) {
            Some(Side::Left)
        } else if self.player2.connection_id() == Some(conn) {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Whether `conn` plays in this session.
    pub fn has_connection(&self, conn: ConnectionId) -> bool {
        self.side_of(conn).is_some()
    }

    /// Take ownership of the tick task so finishing can stop it.
    pub fn set_ticker(&mut self, handle: AbortHandle) {
        if let Some(old) = self.ticker.replace(handle) {
            old.abort();
        }
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Body of `gameStart`.
    pub fn start_info(&self) -> GameStartInfo {
        GameStartInfo {
            game_id: self.id,
            players: MatchPlayers {
                player1: self.player1.info(),
                player2: self.player2.info(),
            },
            game_settings: self.settings.clone(),
        }
    }

    /// Current `gameState` snapshot.
    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::GameState(GameStateUpdate {
            ball: self.court.ball,
            paddles: self.court.paddles,
            scores: self.court.scores,
            game_state: self.state,
        })
    }

    fn send_both(&self, message: &ServerMessage) {
        self.player1.send(message);
        self.player2.send(message);
    }

    /// Tell both peers the match is on, followed by the opening snapshot.
    pub fn announce_start(&mut self, now: Instant) {
        self.send_both(&ServerMessage::GameStart(self.start_info()));
        self.broadcast(now);
    }

    /// Send a snapshot now and restart the throttle window.
    pub fn broadcast(&mut self, now: Instant) {
        self.send_both(&self.snapshot());
        self.last_broadcast = now;
    }

    /// Send a snapshot if the throttle window has elapsed.
    pub fn maybe_broadcast(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_broadcast) < self.config.broadcast_interval {
            return false;
        }
        self.broadcast(now);
        true
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// One scheduled tick: simulate unless paused, then maybe broadcast.
    ///
    /// Returns the final result if this tick ended the match.
    pub fn tick(&mut self, now: Instant) -> Option<FinishedMatch> {
        if self.state == SessionState::Finished {
            return None;
        }

        let mut result = TickResult::default();
        if self.state == SessionState::Playing {
            let bot = [Side::Left, Side::Right]
                .into_iter()
                .find_map(|side| self.peer(side).ai().map(|ai| (side, ai.clone())));
            let bot_side = bot.as_ref().map(|(side, ai)| BotSide { side: *side, ai });

            result = tick(
                &mut self.court,
                &self.resolved,
                bot_side,
                &mut self.rng,
                self.config.serve_delay_ticks,
            );
            self.ticks += 1;

            if let Some(side) = result.scored {
                debug!(
                    game_id = self.id,
                    scorer = self.peer(side).username(),
                    player1 = self.court.scores.player1,
                    player2 = self.court.scores.player2,
                    "Point scored"
                );
            }
        }

        self.maybe_broadcast(now);

        if result.match_over {
            return Some(self.finish());
        }
        None
    }

    /// Move the paddle owned by `conn` one step.
    ///
    /// If it actually moved, both peers get an immediate snapshot; the
    /// periodic throttle window is left alone. Returns whether it moved.
    pub fn move_paddle(&mut self, conn: ConnectionId, direction: Direction) -> bool {
        if self.state == SessionState::Finished {
            return false;
        }
        let Some(side) = self.side_of(conn) else {
            return false;
        };

        let speed = self.resolved.paddle_speed;
        if !step_paddle(self.court.paddles.get_mut(side), direction, speed) {
            return false;
        }

        debug!(game_id = self.id, ?side, ?direction, y = self.court.paddles.get(side).y, "Paddle moved");
        self.send_both(&self.snapshot());
        true
    }

    /// Enter or leave pause. Notifies both peers if the state changed.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        let next = match (self.state, paused) {
            (SessionState::Playing, true) => SessionState::Paused,
            (SessionState::Paused, false) => SessionState::Playing,
            _ => return false,
        };
        self.state = next;

        let notice = PauseNotice {
            is_paused: paused,
            game_id: self.id,
        };
        let message = if paused {
            ServerMessage::GamePaused(notice)
        } else {
            ServerMessage::GameResumed(notice)
        };
        info!(game_id = self.id, paused, "Pause state changed");
        self.send_both(&message);
        true
    }

    /// Flip pause.
    pub fn toggle_pause(&mut self) -> bool {
        let paused = self.state == SessionState::Playing;
        self.set_paused(paused)
    }

    /// End the match with the current scores.
    ///
    /// Stops the tick task, picks the winner (left only if strictly
    /// ahead), sends `gameEnd` to both peers and returns what to persist.
    pub fn finish(&mut self) -> FinishedMatch {
        self.state = SessionState::Finished;
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }

        let scores = self.court.scores;
        let winner = self.peer(scores.leader()).user_id();
        info!(
            game_id = self.id,
            winner,
            player1 = scores.player1,
            player2 = scores.player2,
            ticks = self.ticks,
            "Match finished"
        );

        self.send_both(&ServerMessage::GameEnd(GameEndInfo {
            winner,
            scores,
            game_id: self.id,
        }));

        FinishedMatch {
            id: self.id,
            player1_score: scores.player1,
            player2_score: scores.player2,
            winner_id: winner,
            finished_at: Utc::now(),
        }
    }
}

impl Drop for MatchSession {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// Active sessions by id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<GameId, MatchSession>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `session`, replacing any session with the same id.
    pub fn insert(&mut self, session: MatchSession) {
        self.sessions.insert(session.id, session);
    }

    /// Session by id.
    pub fn get(&self, id: GameId) -> Option<&MatchSession> {
        self.sessions.get(&id)
    }

    /// Mutable session by id.
    pub fn get_mut(&mut self, id: GameId) -> Option<&mut MatchSession> {
        self.sessions.get_mut(&id)
    }

    /// Remove and return a session.
    pub fn remove(&mut self, id: GameId) -> Option<MatchSession> {
        self.sessions.remove(&id)
    }

    /// Session in which `conn` plays. Linear scan.
    pub fn find_by_connection(&self, conn: ConnectionId) -> Option<GameId> {
        self.sessions
            .values()
            .find(|s| s.has_connection(conn))
            .map(|s| s.id)
    }

    /// Ids of every active session.
    pub fn ids(&self) -> Vec<GameId> {
        self.sessions.keys().copied().collect()
    }

    /// Active session count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// No active sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
