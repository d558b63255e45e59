use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::handoff::RunId;

pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Fetching,
    Inserted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rate: Option<Decimal>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(run_id: RunId) -> Self {
        RunRecord {
            run_id,
            state: RunState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            rate: None,
            error: None,
        }
    }

    pub fn inserted(&mut self, rate: Decimal) {
        self.state = RunState::Inserted;
        self.rate = Some(rate);
        self.finished_at = Some(Utc::now());
    }

    pub fn failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }
}

/// Most recent runs, newest first. Older entries fall off past `HISTORY_LIMIT`.
#[derive(Debug, Default)]
pub struct RunHistory {
    records: Mutex<VecDeque<RunRecord>>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: &RunRecord) {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match records.iter_mut().find(|r| r.run_id == record.run_id) {
            Some(existing) => *existing = record.clone(),
            None => {
                records.push_front(record.clone());
                records.truncate(HISTORY_LIMIT);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<RunRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
