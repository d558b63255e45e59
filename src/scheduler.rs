use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use cron::Schedule;
use log::{error, info, warn};
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

use crate::{
    config::Config,
    exchange_rate::ExchangeRateSample,
    fetcher::{FetchError, RateSource},
    handoff::{HandoffError, HandoffStore, RunId},
    inserter::{InsertError, RateSink},
    runs::{RunHistory, RunRecord, RunState},
};

/// Fixed-delay retry budget applied to each task of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        RetryPolicy {
            retries: config.retries,
            delay: config.retry_delay,
        }
    }

    /// First attempt plus retries, capped at `u32::MAX`.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Runs `op` until it succeeds or the budget is spent, sleeping `delay`
/// between attempts. The last error is returned.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, task: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(
                    "Task {} failed (attempt {}/{}): {}. Retrying in {:?}",
                    task, attempt, attempts, e, policy.delay
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!("Task {} failed after {} attempts: {}", task, attempts, e);
                return Err(e);
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error(transparent)]
    Insert(#[from] InsertError),
}

/// One fetch-then-insert pipeline. Shared by every run the scheduler starts.
pub struct Pipeline<S, K> {
    source: S,
    sink: K,
    source_currency: String,
    target_currency: String,
    policy: RetryPolicy,
    handoff: HandoffStore,
    history: Arc<RunHistory>,
}

impl<S: RateSource, K: RateSink> Pipeline<S, K> {
    pub fn new(config: &Config, source: S, sink: K, history: Arc<RunHistory>) -> Self {
        Pipeline {
            source,
            sink,
            source_currency: config.source.clone(),
            target_currency: config.currencies.clone(),
            policy: RetryPolicy::from_config(config),
            handoff: HandoffStore::new(),
            history,
        }
    }

    pub async fn run_once(&self) -> RunRecord {
        let run = Uuid::new_v4();
        let mut record = RunRecord::new(run);
        self.history.upsert(&record);

        record.state = RunState::Fetching;
        self.history.upsert(&record);
        info!(
            "Run {} started for {}/{}",
            run, self.source_currency, self.target_currency
        );

        let outcome = self.execute(run).await;
        self.handoff.discard(run);

        match outcome {
            Ok(sample) => {
                record.inserted(sample.rate_value);
                info!("Run {} inserted", run);
            }
            Err(e) => {
                error!("Run {} failed: {}", run, e);
                record.failed(e.to_string());
            }
        }
        self.history.upsert(&record);

        record
    }

    async fn execute(&self, run: RunId) -> Result<ExchangeRateSample, RunError> {
        let fetched =
            retry(&self.policy, "get_rate_from_api", || self.source.fetch()).await?;
        self.handoff.push_sample(run, &fetched)?;

        let stored = retry(&self.policy, "insert_exchange_rate_in_bd", || async move {
            let sample = self
                .handoff
                .pull_sample(run, &self.source_currency, &self.target_currency)?;
            self.sink.insert(&sample).await?;
            Ok::<_, RunError>(sample)
        })
        .await?;

        Ok(stored)
    }
}

/// Starts a run on every tick of the cron schedule.
pub struct Scheduler<S, K> {
    pipeline: Arc<Pipeline<S, K>>,
    schedule: Schedule,
}

impl<S, K> Scheduler<S, K>
where
    S: RateSource + 'static,
    K: RateSink + 'static,
{
    pub fn new(pipeline: Arc<Pipeline<S, K>>, schedule: Schedule) -> Self {
        Scheduler { pipeline, schedule }
    }

    pub async fn run_forever(&self) -> Result<()> {
        info!("Scheduling exchange rate runs");

        for next_tick in self.schedule.upcoming(Utc) {
            let Ok(wait) = next_tick.signed_duration_since(Utc::now()).to_std() else {
                warn!("Skipping tick {} because it is already in the past", next_tick);
                continue;
            };
            info!("Next run at {}, sleeping {}s", next_tick, wait.as_secs());
            sleep(wait).await;

            // Runs are detached so a slow or failing one never delays the next tick.
            let pipeline = Arc::clone(&self.pipeline);
            tokio::spawn(async move {
                pipeline.run_once().await;
            });
        }

        Ok(())
    }
}
