use std::{collections::HashMap, str::FromStr};

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::{exchange_rate::ExchangeRateSample, fetcher::FetchError};

#[derive(Debug, Deserialize, PartialEq)]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub info: String,
}

/// Body of the live-rates endpoint. Only the fields the pipeline reads.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub success: Option<bool>,
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub quotes: HashMap<String, Value>,
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn into_sample(
        self,
        source: &str,
        target: &str,
    ) -> Result<ExchangeRateSample, FetchError> {
        if let Some(error) = self.error {
            return Err(FetchError::Api {
                code: error.code,
                info: error.info,
            });
        }
        if self.success == Some(false) {
            return Err(FetchError::Api {
                code: 0,
                info: "request was not successful".into(),
            });
        }

        let fetched_at_epoch = self.timestamp.ok_or(FetchError::MissingTimestamp)?;

        let key = format!("{source}{target}");
        let quote = self
            .quotes
            .get(&key)
            .ok_or_else(|| FetchError::MissingQuote(key.clone()))?;

        Ok(ExchangeRateSample {
            fetched_at_epoch,
            source_currency: source.to_string(),
            target_currency: target.to_string(),
            rate_value: quote_to_decimal(quote)?,
        })
    }
}

pub fn parse_sample(
    body: &str,
    source: &str,
    target: &str,
) -> Result<ExchangeRateSample, FetchError> {
    let response: ApiResponse = serde_json::from_str(body)?;
    response.into_sample(source, target)
}

// serde_json keeps the number's original text (arbitrary_precision), so no
// digit goes through an f64. Other quotes in the map are never inspected.
fn quote_to_decimal(quote: &Value) -> Result<Decimal, FetchError> {
    let Value::Number(number) = quote else {
        return Err(FetchError::InvalidRate(quote.to_string()));
    };
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| FetchError::InvalidRate(text))
}
