//! Matchmaking Queue
//!
//! FIFO of players waiting for an opponent. Every entry carries a
//! [`Ticket`]; the bot-fallback timer for an entry fires with that ticket
//! and only takes effect if the entry is still the sole occupant, so a
//! timer can never act on a queue that moved on without it.

use std::collections::VecDeque;

use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::game::settings::GameSettings;
use crate::network::protocol::UserIdentity;
use crate::network::session::ConnectionId;

/// Token identifying one queue entry for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

/// A player waiting for an opponent.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingPlayer {
    /// Connection the join arrived on.
    pub conn: ConnectionId,
    /// Who joined.
    pub user: UserIdentity,
    /// Settings they asked for.
    pub settings: GameSettings,
}

#[derive(Debug)]
struct QueueEntry {
    ticket: Ticket,
    player: WaitingPlayer,
    fallback: Option<AbortHandle>,
}

impl QueueEntry {
    fn cancel_fallback(&mut self) {
        if let Some(handle) = self.fallback.take() {
            handle.abort();
        }
    }
}

/// Outcome of [`WaitQueue::enqueue`].
#[derive(Debug, PartialEq)]
pub enum Enqueued {
    /// Two players left the queue together; `first` waited longest.
    Paired {
        /// Oldest entry (left paddle).
        first: WaitingPlayer,
        /// Next entry (right paddle).
        second: WaitingPlayer,
    },
    /// Sole occupant; arm a fallback timer for this ticket.
    Waiting(Ticket),
    /// This user already has an entry.
    AlreadyQueued,
}

/// The matchmaking queue.
#[derive(Debug, Default)]
pub struct WaitQueue {
    entries: VecDeque<QueueEntry>,
    next_ticket: u64,
}

impl WaitQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `player`, pairing the two oldest entries if possible.
    ///
    /// A user or connection that already has an entry is refused.
    ///
    /// Both paired entries and their timers are gone before this returns.
    pub fn enqueue(&mut self, player: WaitingPlayer) -> Enqueued {
        if self.contains_user(player.user.user_id) || self.contains_connection(player.conn) {
            debug!(user_id = player.user.user_id, conn = %player.conn, "Duplicate join ignored");
            return Enqueued::AlreadyQueued;
        }

        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        info!(
            user_id = player.user.user_id,
            username = %player.user.username,
            queue_size = self.entries.len() + 1,
            "Player added to queue"
        );
        self.entries.push_back(QueueEntry {
            ticket,
            player,
            fallback: None,
        });

        if self.entries.len() >= 2 {
            if let (Some(mut first), Some(mut second)) =
                (self.entries.pop_front(), self.entries.pop_front())
            {
                first.cancel_fallback();
                second.cancel_fallback();
                info!(
                    player1 = %first.player.user.username,
                    player2 = %second.player.user.username,
                    "Matched players"
                );
                return Enqueued::Paired {
                    first: first.player,
                    second: second.player,
                };
            }
        }

        Enqueued::Waiting(ticket)
    }

    /// Attach the fallback timer for `ticket`.
    ///
    /// If the entry is already gone the timer is aborted on the spot.
    pub fn arm(&mut self, ticket: Ticket, handle: AbortHandle) {
        match self.entries.iter_mut().find(|e| e.ticket == ticket) {
            Some(entry) => {
                entry.cancel_fallback();
                entry.fallback = Some(handle);
            }
            None => handle.abort(),
        }
    }

    /// Fallback timer for `ticket` expired.
    ///
    /// Takes the entry only if it is still the sole occupant; otherwise the
    /// timer is stale and nothing happens.
    pub fn fire_fallback(&mut self, ticket: Ticket) -> Option<WaitingPlayer> {
        let sole = self.entries.len() == 1 && self.entries.front().map(|e| e.ticket) == Some(ticket);
        if !sole {
            debug!(?ticket, queue_size = self.entries.len(), "Stale fallback timer");
            return None;
        }
        let entry = self.entries.pop_front()?;
        Some(entry.player)
    }

    /// Drop any entry for `conn` and cancel its timer. Idempotent.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Option<WaitingPlayer> {
        let index = self.entries.iter().position(|e| e.player.conn == conn)?;
        let mut entry = self.entries.remove(index)?;
        entry.cancel_fallback();
        info!(username = %entry.player.user.username, "Removed player from queue");
        Some(entry.player)
    }

    /// Whether `user_id` is waiting.
    pub fn contains_user(&self, user_id: i64) -> bool {
        self.entries.iter().any(|e| e.player.user.user_id == user_id)
    }

    /// Whether `conn` is waiting.
    pub fn contains_connection(&self, conn: ConnectionId) -> bool {
        self.entries.iter().any(|e| e.player.conn == conn)
    }

    /// Waiting players.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Nobody waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
