use async_trait::async_trait;
use log::{info, warn};
use sqlx::{Connection, PgConnection};
use thiserror::Error;

use crate::exchange_rate::{ExchangeRateSample, HistoryRow};

const INSERT_HISTORY_ROW: &str = "INSERT INTO history_rate_btc_rub \
     (date_rate, currencie_form, currencie_to, value_rate) \
     VALUES ($1, $2, $3, $4)";

#[derive(Debug, Error)]
pub enum InsertError {
    #[error("timestamp {0} is out of range")]
    Timestamp(i64),
    #[error("can't connect to the database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("can't open a transaction: {0}")]
    Begin(#[source] sqlx::Error),
    #[error("insert rejected: {0}")]
    Insert(#[source] sqlx::Error),
    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),
}

/// Destination of fetched samples, one row per call.
#[async_trait]
pub trait RateSink: Send + Sync {
    async fn insert(&self, sample: &ExchangeRateSample) -> Result<(), InsertError>;
}

/// Appends rows to Postgres over a connection opened for each insert.
pub struct PgHistory {
    database_url: String,
}

impl PgHistory {
    pub fn new(database_url: impl Into<String>) -> Self {
        PgHistory {
            database_url: database_url.into(),
        }
    }

    async fn write(conn: &mut PgConnection, row: &HistoryRow) -> Result<(), InsertError> {
        let mut tx = conn.begin().await.map_err(InsertError::Begin)?;

        sqlx::query(INSERT_HISTORY_ROW)
            .bind(row.date_rate.naive_utc())
            .bind(&row.currencie_form)
            .bind(&row.currencie_to)
            .bind(row.value_rate)
            .execute(&mut *tx)
            .await
            .map_err(InsertError::Insert)?;

        tx.commit().await.map_err(InsertError::Commit)
    }
}

#[async_trait]
impl RateSink for PgHistory {
    async fn insert(&self, sample: &ExchangeRateSample) -> Result<(), InsertError> {
        let row = HistoryRow::try_from(sample)?;

        let mut conn = PgConnection::connect(&self.database_url)
            .await
            .map_err(InsertError::Connect)?;

        // A dropped transaction rolls back; the connection is closed either way.
        let result = Self::write(&mut conn, &row).await;

        if let Err(e) = conn.close().await {
            warn!("Can't close database connection cleanly: {}", e);
        }

        result?;
        info!(
            "Rate {}/{} = {} at {} stored",
            row.currencie_form, row.currencie_to, row.value_rate, row.date_rate
        );

        Ok(())
    }
}
