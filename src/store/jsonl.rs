//! Append-only JSON-lines result sink.
//!
//! Every create and finish appends the full record as one line; the last
//! line for an id is current. On open the file is replayed to rebuild the
//! index and continue the id sequence.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::{info, warn};

use super::{FinishedMatch, MatchRecord, NewMatch, ResultSink, StoreError};
use crate::network::protocol::GameId;

#[derive(Debug)]
struct Journal {
    file: File,
    last_id: GameId,
    by_id: BTreeMap<GameId, MatchRecord>,
}

impl Journal {
    fn append(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        self.by_id.insert(record.id, record.clone());
        Ok(())
    }
}

/// Match records in a JSON-lines file.
#[derive(Debug)]
pub struct JsonlResultSink {
    journal: Mutex<Journal>,
}

impl JsonlResultSink {
    /// Open `path`, creating it if missing, and replay existing records.
    ///
    /// Lines that do not parse are skipped with a warning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut by_id = BTreeMap::new();

        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for (number, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<MatchRecord>(&line) {
                    Ok(record) => {
                        by_id.insert(record.id, record);
                    }
                    Err(e) => warn!(path = %path.display(), line = number + 1, "Skipping bad record: {}", e),
                }
            }
        }

        let last_id = by_id.keys().next_back().copied().unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!(path = %path.display(), records = by_id.len(), last_id, "Opened results journal");

        Ok(Self {
            journal: Mutex::new(Journal { file, last_id, by_id }),
        })
    }

    /// Current state of a record.
    pub fn get(&self, id: GameId) -> Option<MatchRecord> {
        self.journal.lock().ok()?.by_id.get(&id).cloned()
    }
}

impl ResultSink for JsonlResultSink {
    fn create_match(&self, new: NewMatch) -> Result<MatchRecord, StoreError> {
        let mut journal = self.journal.lock().map_err(|_| StoreError::Poisoned)?;
        let record = MatchRecord::active(journal.last_id + 1, &new);
        journal.append(&record)?;
        journal.last_id = record.id;
        Ok(record)
    }

    fn finish_match(&self, result: &FinishedMatch) -> Result<(), StoreError> {
        let mut journal = self.journal.lock().map_err(|_| StoreError::Poisoned)?;
        let mut record = journal
            .by_id
            .get(&result.id)
            .cloned()
            .ok_or(StoreError::UnknownMatch(result.id))?;
        record.apply(result);
        journal.append(&record)
    }
}
