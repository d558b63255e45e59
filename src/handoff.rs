use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::exchange_rate::ExchangeRateSample;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandoffKey {
    ValueRate,
    DatetimeRate,
}

impl HandoffKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffKey::ValueRate => "value_rate",
            HandoffKey::DatetimeRate => "datetime_rate",
        }
    }
}

impl fmt::Display for HandoffKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandoffValue {
    Rate(Decimal),
    Timestamp(i64),
}

#[derive(Debug, Error, PartialEq)]
pub enum HandoffError {
    #[error("run {run}: no value under {key}")]
    Missing { run: RunId, key: HandoffKey },
    #[error("run {run}: {key} was already written")]
    AlreadyWritten { run: RunId, key: HandoffKey },
    #[error("run {run}: {key} holds a value of the wrong kind")]
    Mismatch { run: RunId, key: HandoffKey },
}

/// Per-run key/value channel between the fetch and insert steps.
///
/// Entries are addressed by run id, so overlapping runs never observe each
/// other. Each key is written once per run; reads leave the value in place so
/// a retried insert sees the same data. `discard` drops the run's entries.
#[derive(Debug, Default)]
pub struct HandoffStore {
    entries: Mutex<HashMap<(RunId, HandoffKey), HandoffValue>>,
}

impl HandoffStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<(RunId, HandoffKey), HandoffValue>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(
        &self,
        run: RunId,
        key: HandoffKey,
        value: HandoffValue,
    ) -> Result<(), HandoffError> {
        let mut entries = self.entries();
        if entries.contains_key(&(run, key)) {
            return Err(HandoffError::AlreadyWritten { run, key });
        }
        entries.insert((run, key), value);
        Ok(())
    }

    pub fn pull(&self, run: RunId, key: HandoffKey) -> Result<HandoffValue, HandoffError> {
        self.entries()
            .get(&(run, key))
            .copied()
            .ok_or(HandoffError::Missing { run, key })
    }

    pub fn push_sample(
        &self,
        run: RunId,
        sample: &ExchangeRateSample,
    ) -> Result<(), HandoffError> {
        self.push(
            run,
            HandoffKey::ValueRate,
            HandoffValue::Rate(sample.rate_value),
        )?;
        self.push(
            run,
            HandoffKey::DatetimeRate,
            HandoffValue::Timestamp(sample.fetched_at_epoch),
        )
    }

    /// Rebuilds the sample of `run`. Currencies come from configuration,
    /// only the fetched values travel through the store.
    pub fn pull_sample(
        &self,
        run: RunId,
        source: &str,
        target: &str,
    ) -> Result<ExchangeRateSample, HandoffError> {
        let key = HandoffKey::DatetimeRate;
        let HandoffValue::Timestamp(fetched_at_epoch) = self.pull(run, key)? else {
            return Err(HandoffError::Mismatch { run, key });
        };

        let key = HandoffKey::ValueRate;
        let HandoffValue::Rate(rate_value) = self.pull(run, key)? else {
            return Err(HandoffError::Mismatch { run, key });
        };

        Ok(ExchangeRateSample {
            fetched_at_epoch,
            source_currency: source.to_string(),
            target_currency: target.to_string(),
            rate_value,
        })
    }

    pub fn discard(&self, run: RunId) {
        self.entries().retain(|(id, _), _| *id != run);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn sample(rate: &str) -> ExchangeRateSample {
        ExchangeRateSample {
            fetched_at_epoch: 1_700_000_000,
            source_currency: "BTC".into(),
            target_currency: "RUB".into(),
            rate_value: Decimal::from_str(rate).unwrap(),
        }
    }

    #[test]
    fn sample_round_trips_within_a_run() {
        let store = HandoffStore::new();
        let run = Uuid::new_v4();
        let written = sample("2500000.50");

        store.push_sample(run, &written).unwrap();

        assert_eq!(store.pull_sample(run, "BTC", "RUB").unwrap(), written);
        // reading does not consume
        assert_eq!(store.pull_sample(run, "BTC", "RUB").unwrap(), written);
    }

    #[test]
    fn pull_before_fetch_is_missing() {
        let store = HandoffStore::new();
        let run = Uuid::new_v4();

        let err = store.pull_sample(run, "BTC", "RUB").unwrap_err();

        assert_eq!(
            err,
            HandoffError::Missing {
                run,
                key: HandoffKey::DatetimeRate
            }
        );
    }

    #[test]
    fn runs_are_isolated() {
        let store = HandoffStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.push_sample(first, &sample("1.5")).unwrap();
        store.push_sample(second, &sample("2.5")).unwrap();

        assert_eq!(
            store.pull_sample(first, "BTC", "RUB").unwrap().rate_value,
            Decimal::from_str("1.5").unwrap()
        );
        assert_eq!(
            store.pull_sample(second, "BTC", "RUB").unwrap().rate_value,
            Decimal::from_str("2.5").unwrap()
        );
        assert!(store.pull(Uuid::new_v4(), HandoffKey::ValueRate).is_err());
    }

    #[test]
    fn keys_are_write_once() {
        let store = HandoffStore::new();
        let run = Uuid::new_v4();
        store
            .push(run, HandoffKey::ValueRate, HandoffValue::Rate(Decimal::ONE))
            .unwrap();

        let err = store
            .push(run, HandoffKey::ValueRate, HandoffValue::Rate(Decimal::TWO))
            .unwrap_err();

        assert_eq!(
            err,
            HandoffError::AlreadyWritten {
                run,
                key: HandoffKey::ValueRate
            }
        );
        assert_eq!(
            store.pull(run, HandoffKey::ValueRate).unwrap(),
            HandoffValue::Rate(Decimal::ONE)
        );
    }

    #[test]
    fn wrong_kind_is_a_mismatch() {
        let store = HandoffStore::new();
        let run = Uuid::new_v4();
        store
            .push(run, HandoffKey::DatetimeRate, HandoffValue::Rate(Decimal::ONE))
            .unwrap();

        let err = store.pull_sample(run, "BTC", "RUB").unwrap_err();

        assert!(matches!(
            err,
            HandoffError::Mismatch {
                key: HandoffKey::DatetimeRate,
                ..
            }
        ));
    }

    #[test]
    fn discard_only_drops_the_given_run() {
        let store = HandoffStore::new();
        let done = Uuid::new_v4();
        let running = Uuid::new_v4();
        store.push_sample(done, &sample("1")).unwrap();
        store.push_sample(running, &sample("2")).unwrap();

        store.discard(done);

        assert_eq!(store.len(), 2);
        assert!(store.pull_sample(done, "BTC", "RUB").is_err());
        assert!(store.pull_sample(running, "BTC", "RUB").is_ok());
    }
}
