//! Protocol Dispatcher
//!
//! A single task owns presence, the wait queue, pending creations, the
//! session registry and the connection table. Everything that can change
//! them (socket traffic, session ticks, fallback timers, persistence
//! completions) arrives as a [`ReactorEvent`] on one channel and is handled
//! to completion before the next event is looked at, so none of that state
//! needs a lock.
//!
//! ```text
//!  reader tasks ──┐
//!  tick tasks ────┤                 ┌──> per-connection writer channels
//!  fallback timers┼──> [ Reactor ] ─┤
//!  store workers ─┤                 └──> spawn_blocking(ResultSink)
//!  ReactorHandle ─┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::rng::derive_session_seed;
use crate::game::ai::AiController;
use crate::game::settings::GameSettings;
use crate::game::state::Side;
use crate::network::presence::{OnlineUser, PresenceTracker};
use crate::network::protocol::{ClientMessage, GameId, JoinRequest, ServerMessage, UserIdentity};
use crate::network::queue::{Enqueued, Ticket, WaitQueue, WaitingPlayer};
use crate::network::session::{
    Connection, ConnectionId, MatchSession, Peer, SessionConfig, SessionRegistry,
};
use crate::store::{FinishedMatch, MatchRecord, NewMatch, ResultSink, StoreError};

/// Identifies a match whose creation write is still in flight.
pub type PendingId = u64;

/// Everything the reactor reacts to.
#[derive(Debug)]
pub enum ReactorEvent {
    /// A client connected.
    Connected {
        /// New connection id.
        conn: ConnectionId,
        /// Writer channel for that connection.
        sender: mpsc::Sender<ServerMessage>,
    },
    /// A text frame arrived.
    Inbound {
        /// Sending connection.
        conn: ConnectionId,
        /// Raw frame.
        text: String,
    },
    /// Transport closed.
    Closed {
        /// Closed connection.
        conn: ConnectionId,
    },
    /// A session's tick timer fired.
    Tick {
        /// Session to advance.
        game_id: GameId,
    },
    /// A queue entry waited too long.
    BotFallback {
        /// Entry the timer was armed for.
        ticket: Ticket,
    },
    /// Creation write finished.
    MatchCreated {
        /// Pending match it belongs to.
        pending: PendingId,
        /// Stored record or failure.
        result: Result<MatchRecord, StoreError>,
    },
    /// Finish write finished.
    MatchRecorded {
        /// Session the write was for.
        game_id: GameId,
        /// Outcome.
        result: Result<(), StoreError>,
    },
    /// Read the online list.
    OnlineUsers {
        /// Where to answer.
        reply: oneshot::Sender<Vec<OnlineUser>>,
    },
    /// Read counters.
    Stats {
        /// Where to answer.
        reply: oneshot::Sender<ReactorStats>,
    },
}

/// Counters exposed for status queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactorStats {
    /// Open connections.
    pub connections: usize,
    /// Real users online.
    pub online_users: usize,
    /// Active sessions.
    pub sessions: usize,
    /// Matches waiting on their creation write.
    pub pending_matches: usize,
    /// Players in the wait queue.
    pub queue_size: usize,
}

/// Reactor tuning.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Per-session timing.
    pub session: SessionConfig,
    /// How long a lone queued player waits before getting the bot.
    pub bot_fallback_delay: Duration,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            bot_fallback_delay: Duration::from_secs(5),
        }
    }
}

/// Cloneable sender side used by connection tasks and status queries.
#[derive(Debug, Clone)]
pub struct ReactorHandle {
    tx: mpsc::UnboundedSender<ReactorEvent>,
}

impl ReactorHandle {
    /// Register a connection. Returns false if the reactor is gone.
    pub fn connected(&self, conn: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> bool {
        self.tx.send(ReactorEvent::Connected { conn, sender }).is_ok()
    }

    /// Forward a text frame.
    pub fn inbound(&self, conn: ConnectionId, text: String) -> bool {
        self.tx.send(ReactorEvent::Inbound { conn, text }).is_ok()
    }

    /// Report transport close.
    pub fn closed(&self, conn: ConnectionId) -> bool {
        self.tx.send(ReactorEvent::Closed { conn }).is_ok()
    }

    /// Current online list, or `None` if the reactor stopped.
    pub async fn online_users(&self) -> Option<Vec<OnlineUser>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ReactorEvent::OnlineUsers { reply }).ok()?;
        rx.await.ok()
    }

    /// Current counters, or `None` if the reactor stopped.
    pub async fn stats(&self) -> Option<ReactorStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ReactorEvent::Stats { reply }).ok()?;
        rx.await.ok()
    }
}

/// A paired match waiting for its record id.
struct PendingMatch {
    player1: Peer,
    player2: Peer,
    settings: GameSettings,
    /// A human peer left before the write completed.
    abandoned: bool,
}

impl PendingMatch {
    fn has_connection(&self, conn: ConnectionId) -> bool {
        self.player1.connection_id() == Some(conn) || self.player2.connection_id() == Some(conn)
    }
}

/// The single owner of all matchmaking and match state.
pub struct Reactor {
    config: ReactorConfig,
    sink: Arc<dyn ResultSink>,
    events: mpsc::UnboundedSender<ReactorEvent>,
    connections: HashMap<ConnectionId, Connection>,
    presence: PresenceTracker,
    queue: WaitQueue,
    pending: BTreeMap<PendingId, PendingMatch>,
    next_pending: PendingId,
    sessions: SessionRegistry,
}

impl Reactor {
    /// Build a reactor and the event receiver it runs on.
    pub fn new(
        config: ReactorConfig,
        sink: Arc<dyn ResultSink>,
    ) -> (Self, mpsc::UnboundedReceiver<ReactorEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let reactor = Self {
            config,
            sink,
            events,
            connections: HashMap::new(),
            presence: PresenceTracker::new(),
            queue: WaitQueue::new(),
            pending: BTreeMap::new(),
            next_pending: 0,
            sessions: SessionRegistry::new(),
        };
        (reactor, rx)
    }

    /// A handle feeding this reactor.
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            tx: self.events.clone(),
        }
    }

    /// Process events until `shutdown` fires, then end every live session.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ReactorEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Reactor started");
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
                _ = shutdown.recv() => {
                    info!("Reactor shutting down");
                    break;
                }
            }
        }
        self.shutdown().await;
    }

    /// Finish every session and wait for the writes.
    async fn shutdown(&mut self) {
        let ids: Vec<GameId> = self.sessions.ids();
        let mut writes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(mut session) = self.sessions.remove(id) {
                let finished = session.finish();
                let sink = self.sink.clone();
                writes.push(tokio::task::spawn_blocking(move || sink.finish_match(&finished)));
            }
        }
        for write in writes {
            match write.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to record match at shutdown: {}", e),
                Err(e) => error!("Result writer panicked: {}", e),
            }
        }
    }

    /// Counters.
    pub fn stats(&self) -> ReactorStats {
        ReactorStats {
            connections: self.connections.len(),
            online_users: self.presence.online_count(),
            sessions: self.sessions.len(),
            pending_matches: self.pending.len(),
            queue_size: self.queue.len(),
        }
    }

    /// Active sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Handle one event to completion.
    pub fn handle_event(&mut self, event: ReactorEvent) {
        match event {
            ReactorEvent::Connected { conn, sender } => {
                debug!(%conn, "Connection registered");
                self.connections.insert(conn, Connection::new(conn, sender));
            }
            ReactorEvent::Inbound { conn, text } => self.on_inbound(conn, &text),
            ReactorEvent::Closed { conn } => {
                self.depart(conn);
                self.connections.remove(&conn);
                debug!(%conn, "Connection removed");
            }
            ReactorEvent::Tick { game_id } => self.on_tick(game_id),
            ReactorEvent::BotFallback { ticket } => self.on_bot_fallback(ticket),
            ReactorEvent::MatchCreated { pending, result } => self.on_match_created(pending, result),
            ReactorEvent::MatchRecorded { game_id, result } => match result {
                Ok(()) => debug!(game_id, "Match result recorded"),
                Err(e) => error!(game_id, "Failed to record match result: {}", e),
            },
            ReactorEvent::OnlineUsers { reply } => {
                let _ = reply.send(self.presence.snapshot());
            }
            ReactorEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    // =========================================================================
    // INBOUND MESSAGES
    // =========================================================================

    fn on_inbound(&mut self, conn: ConnectionId, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(%conn, "Ignoring message: {}", e);
                return;
            }
        };

        match message {
            ClientMessage::UserConnect(user) => {
                self.presence.add_connection(user.user_id, &user.username, conn);
                self.send_to(conn, ServerMessage::connection_ack());
            }
            ClientMessage::JoinGame(join) => self.on_join_game(conn, join),
            ClientMessage::JoinBotGame(join) => self.on_join_bot_game(conn, join),
            ClientMessage::MovePaddle { direction } => {
                match self.session_for(conn) {
                    Some(session) => {
                        session.move_paddle(conn, direction);
                    }
                    None => debug!(%conn, "movePaddle outside a session"),
                }
            }
            ClientMessage::Pause { paused } => match self.session_for(conn) {
                Some(session) => {
                    match paused {
                        Some(paused) => session.set_paused(paused),
                        None => session.toggle_pause(),
                    };
                }
                None => debug!(%conn, "pause outside a session"),
            },
            ClientMessage::Disconnect => {
                info!(%conn, "Client requested disconnect");
                self.depart(conn);
            }
        }
    }

    /// Active session `conn` plays in.
    fn session_for(&mut self, conn: ConnectionId) -> Option<&mut MatchSession> {
        let id = self.sessions.find_by_connection(conn)?;
        self.sessions.get_mut(id)
    }

    /// `conn` is already committed to a match, running or being created.
    fn in_match(&self, conn: ConnectionId) -> bool {
        self.sessions.find_by_connection(conn).is_some()
            || self.pending.values().any(|p| p.has_connection(conn))
    }

    fn on_join_game(&mut self, conn: ConnectionId, join: JoinRequest) {
        if self.in_match(conn) {
            self.send_to(conn, ServerMessage::error("Already in a match."));
            return;
        }
        let player = WaitingPlayer {
            conn,
            user: join.identity(),
            settings: join.settings(),
        };
        self.join_queue(player);
    }

    fn join_queue(&mut self, player: WaitingPlayer) {
        let conn = player.conn;
        match self.queue.enqueue(player) {
            Enqueued::Paired { first, second } => {
                // Settings follow whoever completed the pair
                let settings = second.settings.clone();
                match (self.human_peer(&first), self.human_peer(&second)) {
                    (Some(p1), Some(p2)) => self.create_match(p1, p2, settings),
                    (None, Some(_)) => {
                        warn!(conn = %first.conn, "Paired connection vanished");
                        self.join_queue(second);
                    }
                    (Some(_), None) => {
                        warn!(conn = %second.conn, "Paired connection vanished");
                        self.join_queue(first);
                    }
                    (None, None) => warn!("Both paired connections vanished"),
                }
            }
            Enqueued::Waiting(ticket) => {
                self.send_to(conn, ServerMessage::waiting());
                let delay = self.config.bot_fallback_delay;
                let events = self.events.clone();
                let timer = tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = events.send(ReactorEvent::BotFallback { ticket });
                });
                self.queue.arm(ticket, timer.abort_handle());
            }
            Enqueued::AlreadyQueued => {
                self.send_to(conn, ServerMessage::error("Already waiting for a match."));
            }
        }
    }

    fn on_join_bot_game(&mut self, conn: ConnectionId, join: JoinRequest) {
        if self.in_match(conn) {
            self.send_to(conn, ServerMessage::error("Already in a match."));
            return;
        }
        // A direct bot request supersedes a queue entry
        self.queue.remove_connection(conn);

        let user = join.identity();
        let settings = join.settings();
        let Some(human) = self.peer_for(conn, user) else {
            return;
        };
        let bot = Peer::Bot(AiController::new(settings.ai_difficulty));
        info!(%conn, difficulty = ?settings.ai_difficulty, "Starting bot match");
        self.create_match(human, bot, settings);
    }

    /// Leave queue, pending creations, the running session and presence.
    fn depart(&mut self, conn: ConnectionId) {
        self.presence.remove_connection(conn);
        self.queue.remove_connection(conn);

        for pending in self.pending.values_mut() {
            if pending.has_connection(conn) {
                pending.abandoned = true;
            }
        }

        if let Some(game_id) = self.sessions.find_by_connection(conn) {
            info!(game_id, %conn, "Peer left, ending match");
            self.end_session(game_id);
        }
    }

    // =========================================================================
    // MATCH LIFECYCLE
    // =========================================================================

    fn on_bot_fallback(&mut self, ticket: Ticket) {
        let Some(player) = self.queue.fire_fallback(ticket) else {
            return;
        };
        info!(
            user_id = player.user.user_id,
            username = %player.user.username,
            "No opponent arrived, pairing with bot"
        );
        let Some(human) = self.human_peer(&player) else {
            return;
        };
        let bot = Peer::Bot(AiController::new(player.settings.ai_difficulty));
        self.create_match(human, bot, player.settings);
    }

    /// Record the match, then start it when the write lands.
    fn create_match(&mut self, player1: Peer, player2: Peer, settings: GameSettings) {
        self.next_pending += 1;
        let pending = self.next_pending;
        let new = NewMatch {
            player1_id: player1.user_id(),
            player2_id: player2.user_id(),
            started_at: Utc::now(),
        };
        self.pending.insert(
            pending,
            PendingMatch {
                player1,
                player2,
                settings,
                abandoned: false,
            },
        );

        let sink = self.sink.clone();
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let result = sink.create_match(new);
            let _ = events.send(ReactorEvent::MatchCreated { pending, result });
        });
    }

    fn on_match_created(&mut self, pending: PendingId, result: Result<MatchRecord, StoreError>) {
        let Some(entry) = self.pending.remove(&pending) else {
            return;
        };
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                error!(
                    player1 = entry.player1.user_id(),
                    player2 = entry.player2.user_id(),
                    "Failed to create match: {}",
                    e
                );
                return;
            }
        };

        let game_id = record.id;
        let seed = derive_session_seed(
            game_id,
            [entry.player1.user_id(), entry.player2.user_id()],
            Uuid::new_v4().as_u128(),
        );
        let mut session = MatchSession::new(
            game_id,
            entry.player1,
            entry.player2,
            entry.settings,
            self.config.session.clone(),
            seed,
        );

        let period = self.config.session.tick_interval();
        let events = self.events.clone();
        let ticker = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                if events.send(ReactorEvent::Tick { game_id }).is_err() {
                    break;
                }
            }
        });
        session.set_ticker(ticker.abort_handle());

        info!(
            game_id,
            player1 = session.peer(Side::Left).username(),
            player2 = session.peer(Side::Right).username(),
            "Match started"
        );
        session.announce_start(Instant::now());
        self.sessions.insert(session);

        if entry.abandoned {
            info!(game_id, "Peer left during creation, ending match");
            self.end_session(game_id);
        }
    }

    fn on_tick(&mut self, game_id: GameId) {
        let Some(session) = self.sessions.get_mut(game_id) else {
            return;
        };
        if let Some(finished) = session.tick(Instant::now()) {
            self.sessions.remove(game_id);
            self.record_finish(finished);
        }
    }

    /// Force a session to `Finished` with its current score and drop it.
    fn end_session(&mut self, game_id: GameId) {
        if let Some(mut session) = self.sessions.remove(game_id) {
            let finished = session.finish();
            self.record_finish(finished);
        }
    }

    fn record_finish(&self, finished: FinishedMatch) {
        info!(game_id = finished.id, active = self.sessions.len(), "Match removed");
        let sink = self.sink.clone();
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let result = sink.finish_match(&finished);
            let _ = events.send(ReactorEvent::MatchRecorded {
                game_id: finished.id,
                result,
            });
        });
    }

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    fn peer_for(&self, conn: ConnectionId, user: UserIdentity) -> Option<Peer> {
        let connection = self.connections.get(&conn)?.clone();
        Some(Peer::Human {
            user,
            conn: connection,
        })
    }

    fn human_peer(&self, player: &WaitingPlayer) -> Option<Peer> {
        self.peer_for(player.conn, player.user.clone())
    }

    fn send_to(&self, conn: ConnectionId, message: ServerMessage) {
        match self.connections.get(&conn) {
            Some(connection) => {
                connection.send(message);
            }
            None => debug!(%conn, "Send to unknown connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::settings::Difficulty;
    use crate::network::session::SessionState;
    use crate::store::{MatchStatus, MemoryResultSink};
    use tokio::time::timeout;

    struct TestClient {
        conn: ConnectionId,
        rx: mpsc::Receiver<ServerMessage>,
    }

    impl TestClient {
        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    struct Harness {
        reactor: Reactor,
        events: mpsc::UnboundedReceiver<ReactorEvent>,
        /// Set when the reactor writes to a memory sink the test can read.
        sink: Option<Arc<MemoryResultSink>>,
    }

    impl Harness {
        fn new() -> Self {
            let sink = Arc::new(MemoryResultSink::new());
            let config = ReactorConfig {
                session: SessionConfig::default(),
                bot_fallback_delay: Duration::from_millis(50),
            };
            let (reactor, events) = Reactor::new(config, sink.clone());
            Self {
                reactor,
                events,
                sink: Some(sink),
            }
        }

        fn with_sink(sink: Arc<dyn ResultSink>) -> Self {
            let (reactor, events) = Reactor::new(ReactorConfig::default(), sink);
            Self {
                reactor,
                events,
                sink: None,
            }
        }

        fn connect(&mut self) -> TestClient {
            let conn = Uuid::new_v4();
            let (sender, rx) = mpsc::channel(1024);
            self.reactor.handle_event(ReactorEvent::Connected { conn, sender });
            TestClient { conn, rx }
        }

        fn send(&mut self, client: &TestClient, json: &str) {
            self.reactor.handle_event(ReactorEvent::Inbound {
                conn: client.conn,
                text: json.to_string(),
            });
        }

        fn join(&mut self, client: &TestClient, kind: &str, user_id: i64) {
            let json = format!(
                r#"{{"type":"{}","userId":{},"username":"user{}"}}"#,
                kind, user_id, user_id
            );
            self.send(client, &json);
        }

        /// The sink the reactor writes to.
        fn records(&self) -> Arc<MemoryResultSink> {
            self.sink.clone().expect("harness built with a custom sink")
        }

        /// Feed the reactor its own events until `done` holds.
        async fn pump_until(&mut self, mut done: impl FnMut(&Reactor) -> bool) {
            while !done(&self.reactor) {
                let event = timeout(Duration::from_secs(5), self.events.recv())
                    .await
                    .expect("timed out waiting for reactor event")
                    .expect("event channel closed");
                self.reactor.handle_event(event);
            }
        }
    }

    fn game_start(messages: &[ServerMessage]) -> Option<&crate::network::protocol::GameStartInfo> {
        messages.iter().find_map(|m| match m {
            ServerMessage::GameStart(info) => Some(info),
            _ => None,
        })
    }

    fn game_end(messages: &[ServerMessage]) -> Option<&crate::network::protocol::GameEndInfo> {
        messages.iter().find_map(|m| match m {
            ServerMessage::GameEnd(info) => Some(info),
            _ => None,
        })
    }

    struct FailingSink;

    impl ResultSink for FailingSink {
        fn create_match(&self, _new: NewMatch) -> Result<MatchRecord, StoreError> {
            Err(StoreError::Poisoned)
        }

        fn finish_match(&self, _result: &FinishedMatch) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[tokio::test]
    async fn test_user_connect_acknowledged() {
        let mut h = Harness::new();
        let mut a = h.connect();

        h.send(&a, r#"{"type":"userConnect","userId":7,"username":"ana"}"#);

        assert_eq!(a.drain(), vec![ServerMessage::connection_ack()]);
        assert_eq!(h.reactor.stats().online_users, 1);
    }

    #[tokio::test]
    async fn test_two_joins_pair_without_bot() {
        let mut h = Harness::new();
        let mut a = h.connect();
        let mut b = h.connect();

        h.join(&a, "joinGame", 1);
        h.join(&b, "joinGame", 2);
        assert_eq!(h.reactor.stats().queue_size, 0);
        assert_eq!(h.reactor.stats().pending_matches, 1);

        h.pump_until(|r| r.stats().sessions == 1).await;

        let a_msgs = a.drain();
        let b_msgs = b.drain();
        assert_eq!(a_msgs[0], ServerMessage::waiting());
        let start = game_start(&a_msgs).expect("gameStart for player 1");
        assert_eq!(start.players.player1.user_id, 1);
        assert_eq!(start.players.player2.user_id, 2);
        assert_eq!(game_start(&b_msgs), Some(start));
    }

    #[tokio::test]
    async fn test_lone_join_gets_bot_after_timeout() {
        let mut h = Harness::new();
        let mut a = h.connect();

        h.join(&a, "joinGame", 1);
        h.pump_until(|r| r.stats().sessions == 1).await;

        let msgs = a.drain();
        assert_eq!(msgs[0], ServerMessage::waiting());
        let start = game_start(&msgs).expect("gameStart");
        assert_eq!(start.players.player2.user_id, 0);
        assert_eq!(start.players.player2.username, "Bot");
        assert_eq!(h.reactor.stats().queue_size, 0);
    }

    #[tokio::test]
    async fn test_join_bot_game_is_immediate() {
        let mut h = Harness::new();
        let mut a = h.connect();

        h.send(
            &a,
            r#"{"type":"joinBotGame","userId":4,"username":"dee","gameSettings":{"aiDifficulty":"hard","scoreToWin":3}}"#,
        );
        assert_eq!(h.reactor.stats().queue_size, 0);
        h.pump_until(|r| r.stats().sessions == 1).await;

        let msgs = a.drain();
        let start = game_start(&msgs).expect("gameStart");
        assert_eq!(start.players.player2.user_id, 0);
        assert_eq!(start.game_settings.ai_difficulty, Difficulty::Hard);
        assert_eq!(start.game_settings.score_to_win, 3);
    }

    #[tokio::test]
    async fn test_disconnect_finishes_and_removes_session() {
        let mut h = Harness::new();
        let a = h.connect();
        let mut b = h.connect();
        h.join(&a, "joinGame", 1);
        h.join(&b, "joinGame", 2);
        h.pump_until(|r| r.stats().sessions == 1).await;
        b.drain();

        h.reactor.handle_event(ReactorEvent::Closed { conn: a.conn });

        assert_eq!(h.reactor.stats().sessions, 0);
        assert_eq!(h.reactor.stats().connections, 1);
        let end = game_end(&b.drain()).cloned().expect("gameEnd to survivor");
        // 0-0 goes to the right side
        assert_eq!(end.winner, 2);

        let sink = h.records();
        h.pump_until(|_| sink.get(1).map(|r| r.status) == Some(MatchStatus::Finished))
            .await;
        assert_eq!(sink.get(1).and_then(|r| r.winner_id), Some(2));
    }

    #[tokio::test]
    async fn test_explicit_disconnect_keeps_connection() {
        let mut h = Harness::new();
        let mut a = h.connect();
        h.join(&a, "joinBotGame", 1);
        h.pump_until(|r| r.stats().sessions == 1).await;
        a.drain();

        h.send(&a, r#"{"type":"disconnect"}"#);

        assert_eq!(h.reactor.stats().sessions, 0);
        assert_eq!(h.reactor.stats().connections, 1);
        assert!(game_end(&a.drain()).is_some());
    }

    #[tokio::test]
    async fn test_queue_disconnect_cancels_fallback() {
        let mut h = Harness::new();
        let a = h.connect();

        h.join(&a, "joinGame", 1);
        h.reactor.handle_event(ReactorEvent::Closed { conn: a.conn });
        assert_eq!(h.reactor.stats().queue_size, 0);

        // The fallback timer was aborted, so nothing arrives
        let next = timeout(Duration::from_millis(200), h.events.recv()).await;
        assert!(next.is_err());
        assert_eq!(h.reactor.stats().pending_matches, 0);
    }

    #[tokio::test]
    async fn test_duplicate_join_rejected() {
        let mut h = Harness::new();
        let mut a = h.connect();

        h.join(&a, "joinGame", 1);
        h.join(&a, "joinGame", 1);

        let msgs = a.drain();
        assert_eq!(msgs[1], ServerMessage::error("Already waiting for a match."));
        assert_eq!(h.reactor.stats().queue_size, 1);
    }

    #[tokio::test]
    async fn test_one_connection_cannot_fill_both_slots() {
        let mut h = Harness::new();
        let mut a = h.connect();
        let mut b = h.connect();

        h.join(&a, "joinGame", 1);
        h.join(&a, "joinGame", 2);

        let msgs = a.drain();
        assert_eq!(msgs[0], ServerMessage::waiting());
        assert_eq!(msgs[1], ServerMessage::error("Already waiting for a match."));
        assert_eq!(h.reactor.stats().queue_size, 1);
        assert_eq!(h.reactor.stats().pending_matches, 0);

        // A real second player still pairs with the original entry
        h.join(&b, "joinGame", 2);
        h.pump_until(|r| r.stats().sessions == 1).await;

        let game_id = h.reactor.sessions().find_by_connection(a.conn).unwrap();
        let session = h.reactor.sessions().get(game_id).unwrap();
        assert_eq!(session.peer(Side::Left).connection_id(), Some(a.conn));
        assert_eq!(session.peer(Side::Right).connection_id(), Some(b.conn));
        assert_eq!(game_start(&b.drain()).map(|s| s.players.player1.user_id), Some(1));
    }

    #[tokio::test]
    async fn test_join_while_playing_rejected() {
        let mut h = Harness::new();
        let mut a = h.connect();
        h.join(&a, "joinBotGame", 1);

        // Still pending creation
        h.join(&a, "joinGame", 1);
        assert_eq!(a.drain(), vec![ServerMessage::error("Already in a match.")]);

        h.pump_until(|r| r.stats().sessions == 1).await;
        a.drain();
        h.join(&a, "joinBotGame", 1);
        assert_eq!(a.drain(), vec![ServerMessage::error("Already in a match.")]);
    }

    #[tokio::test]
    async fn test_garbage_is_ignored() {
        let mut h = Harness::new();
        let mut a = h.connect();

        h.send(&a, "not json");
        h.send(&a, r#"{"type":"chat","text":"hi"}"#);
        h.send(&a, r#"{"type":"movePaddle","direction":"sideways"}"#);

        assert!(a.drain().is_empty());
        assert_eq!(h.reactor.stats().connections, 1);
    }

    #[tokio::test]
    async fn test_in_game_messages_without_session_are_noops() {
        let mut h = Harness::new();
        let mut a = h.connect();

        h.send(&a, r#"{"type":"movePaddle","direction":"up"}"#);
        h.send(&a, r#"{"type":"pause"}"#);
        assert!(a.drain().is_empty());

        // Pending creation behaves the same
        h.join(&a, "joinBotGame", 1);
        h.send(&a, r#"{"type":"movePaddle","direction":"up"}"#);
        h.send(&a, r#"{"type":"pause"}"#);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_move_and_pause_route_to_session() {
        let mut h = Harness::new();
        let mut a = h.connect();
        h.join(&a, "joinBotGame", 1);
        h.pump_until(|r| r.stats().sessions == 1).await;
        a.drain();

        h.send(&a, r#"{"type":"movePaddle","direction":"up"}"#);
        let game_id = h.reactor.sessions().find_by_connection(a.conn).unwrap();
        let session = h.reactor.sessions().get(game_id).unwrap();
        assert_eq!(session.court().paddles.player1.y, 238.0);

        h.send(&a, r#"{"type":"pause","paused":true}"#);
        let session = h.reactor.sessions().get(game_id).unwrap();
        assert_eq!(session.state(), SessionState::Paused);
        assert!(a
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::GamePaused(n) if n.game_id == game_id)));

        h.send(&a, r#"{"type":"pause"}"#);
        let session = h.reactor.sessions().get(game_id).unwrap();
        assert_eq!(session.state(), SessionState::Playing);
    }

    #[tokio::test]
    async fn test_leaving_during_creation_finishes_match() {
        let mut h = Harness::new();
        let a = h.connect();
        h.join(&a, "joinBotGame", 1);

        h.reactor.handle_event(ReactorEvent::Closed { conn: a.conn });
        let sink = h.records();
        h.pump_until(|r| {
            r.stats().pending_matches == 0
                && sink.get(1).map(|rec| rec.status) == Some(MatchStatus::Finished)
        })
        .await;

        assert_eq!(h.reactor.stats().sessions, 0);
    }

    #[tokio::test]
    async fn test_creation_failure_sends_nothing() {
        let mut h = Harness::with_sink(Arc::new(FailingSink));
        let mut a = h.connect();

        h.join(&a, "joinBotGame", 1);
        h.pump_until(|r| r.stats().pending_matches == 0).await;

        assert_eq!(h.reactor.stats().sessions, 0);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_handle_queries_running_reactor() {
        let sink = Arc::new(MemoryResultSink::new());
        let (reactor, events) = Reactor::new(ReactorConfig::default(), sink);
        let handle = reactor.handle();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(reactor.run(events, shutdown_rx));

        let conn = Uuid::new_v4();
        let (sender, _rx) = mpsc::channel(16);
        assert!(handle.connected(conn, sender));
        assert!(handle.inbound(conn, r#"{"type":"userConnect","userId":5,"username":"eve"}"#.into()));

        let users = handle.online_users().await.unwrap();
        assert_eq!(users.len(), 4);
        assert_eq!(users.iter().filter(|u| u.is_bot).count(), 3);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.online_users, 1);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(handle.stats().await.is_none());
    }
}
