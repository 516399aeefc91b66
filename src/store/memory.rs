//! In-memory result sink. Used when no results path is configured, and in
//! tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{FinishedMatch, MatchRecord, NewMatch, ResultSink, StoreError};
use crate::network::protocol::GameId;

#[derive(Debug, Default)]
struct Records {
    last_id: GameId,
    by_id: BTreeMap<GameId, MatchRecord>,
}

/// Keeps every record in a map for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryResultSink {
    records: Mutex<Records>,
}

impl MemoryResultSink {
    /// Empty sink; ids start at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record by id.
    pub fn get(&self, id: GameId) -> Option<MatchRecord> {
        self.records.lock().ok()?.by_id.get(&id).cloned()
    }

    /// All records in id order.
    pub fn records(&self) -> Vec<MatchRecord> {
        self.records
            .lock()
            .map(|r| r.by_id.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl ResultSink for MemoryResultSink {
    fn create_match(&self, new: NewMatch) -> Result<MatchRecord, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.last_id += 1;
        let record = MatchRecord::active(records.last_id, &new);
        records.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    fn finish_match(&self, result: &FinishedMatch) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let record = records
            .by_id
            .get_mut(&result.id)
            .ok_or(StoreError::UnknownMatch(result.id))?;
        record.apply(result);
        Ok(())
    }
}
