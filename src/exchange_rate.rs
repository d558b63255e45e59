use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::inserter::InsertError;

/// One rate observation as returned by the API, alive for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateSample {
    pub fetched_at_epoch: i64,
    pub source_currency: String,
    pub target_currency: String,
    pub rate_value: Decimal,
}

/// Row of `history_rate_btc_rub`. Column names follow the existing table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub date_rate: DateTime<Utc>,
    pub currencie_form: String,
    pub currencie_to: String,
    pub value_rate: Decimal,
}

impl TryFrom<&ExchangeRateSample> for HistoryRow {
    type Error = InsertError;

    fn try_from(sample: &ExchangeRateSample) -> Result<Self, Self::Error> {
        let date_rate = DateTime::from_timestamp(sample.fetched_at_epoch, 0)
            .ok_or(InsertError::Timestamp(sample.fetched_at_epoch))?;

        Ok(HistoryRow {
            date_rate,
            currencie_form: sample.source_currency.clone(),
            currencie_to: sample.target_currency.clone(),
            value_rate: sample.rate_value,
        })
    }
}
