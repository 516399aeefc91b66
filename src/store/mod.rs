//! Match Result Persistence
//!
//! The engine writes two things per match: a record when the session is
//! created (status `active`) and the final scores when it ends. Everything
//! else about storage belongs to whoever implements [`ResultSink`].
//!
//! Sink calls are blocking; the reactor runs them on tokio's blocking pool
//! and never waits on them inline.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlResultSink;
pub use memory::MemoryResultSink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::protocol::{GameId, UserId};

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Finish requested for a match that was never created.
    #[error("unknown match record {0}")]
    UnknownMatch(GameId),

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Record lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Match in progress.
    Active,
    /// Final scores written.
    Finished,
}

/// One persisted match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Record id, also the session's `gameId`.
    pub id: GameId,
    /// Left side user id.
    pub player1_id: UserId,
    /// Right side user id (0 for the bot).
    pub player2_id: UserId,
    /// Left side score.
    pub player1_score: u32,
    /// Right side score.
    pub player2_score: u32,
    /// Lifecycle.
    pub status: MatchStatus,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Finish time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Winner's user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<UserId>,
}

/// Input to [`ResultSink::create_match`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    /// Left side user id.
    pub player1_id: UserId,
    /// Right side user id.
    pub player2_id: UserId,
    /// Creation time.
    pub started_at: DateTime<Utc>,
}

/// Input to [`ResultSink::finish_match`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedMatch {
    /// Record to update.
    pub id: GameId,
    /// Left side final score.
    pub player1_score: u32,
    /// Right side final score.
    pub player2_score: u32,
    /// Winner's user id.
    pub winner_id: UserId,
    /// Finish time.
    pub finished_at: DateTime<Utc>,
}

impl MatchRecord {
    /// Fresh `active` record for `new` under `id`.
    pub fn active(id: GameId, new: &NewMatch) -> Self {
        Self {
            id,
            player1_id: new.player1_id,
            player2_id: new.player2_id,
            player1_score: 0,
            player2_score: 0,
            status: MatchStatus::Active,
            started_at: new.started_at,
            finished_at: None,
            winner_id: None,
        }
    }

    /// Fold the final result in.
    pub fn apply(&mut self, result: &FinishedMatch) {
        self.player1_score = result.player1_score;
        self.player2_score = result.player2_score;
        self.status = MatchStatus::Finished;
        self.finished_at = Some(result.finished_at);
        self.winner_id = Some(result.winner_id);
    }
}

/// Where match records go.
pub trait ResultSink: Send + Sync + 'static {
    /// Persist a new `active` record and return it with its assigned id.
    fn create_match(&self, new: NewMatch) -> Result<MatchRecord, StoreError>;

    /// Write final scores and winner to an existing record.
    fn finish_match(&self, result: &FinishedMatch) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let started = Utc::now();
        let mut record = MatchRecord::active(
            4,
            &NewMatch { player1_id: 7, player2_id: 0, started_at: started },
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "active");
        assert!(json.get("winner_id").is_none());

        record.apply(&FinishedMatch {
            id: 4,
            player1_score: 5,
            player2_score: 3,
            winner_id: 7,
            finished_at: started,
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "finished");
        assert_eq!(json["player1_score"], 5);
        assert_eq!(json["winner_id"], 7);

        let back: MatchRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
