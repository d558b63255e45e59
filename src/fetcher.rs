use async_trait::async_trait;
use log::info;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

use crate::{config::Config, exchange_rate::ExchangeRateSample, quotes::parse_sample};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid api url: {0}")]
    Url(String),
    #[error("request to the rates api failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rates api answered with status {0}")]
    Status(StatusCode),
    #[error("rates api returned malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rates api error {code}: {info}")]
    Api { code: i64, info: String },
    #[error("response has no timestamp")]
    MissingTimestamp,
    #[error("response has no quote for {0}")]
    MissingQuote(String),
    #[error("quote {0} is not a decimal number")]
    InvalidRate(String),
}

/// Anything that can produce one rate sample per call.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self) -> Result<ExchangeRateSample, FetchError>;
}

pub struct ApiClient {
    client: Client,
    url: String,
    access_key: String,
    source: String,
    currencies: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.http_timeout).build()?;

        Ok(ApiClient {
            client,
            url: config.api_url.clone(),
            access_key: config.access_key.clone(),
            source: config.source.clone(),
            currencies: config.currencies.clone(),
        })
    }

    fn request_url(&self) -> Result<Url, FetchError> {
        let url = Url::parse_with_params(
            &self.url,
            &[
                ("access_key", self.access_key.as_str()),
                ("source", self.source.as_str()),
                ("currencies", self.currencies.as_str()),
            ],
        )
        .map_err(|e| FetchError::Url(e.to_string()))?;

        Ok(url)
    }
}

#[async_trait]
impl RateSource for ApiClient {
    async fn fetch(&self) -> Result<ExchangeRateSample, FetchError> {
        let resp = self.client.get(self.request_url()?).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }

        let body = resp.text().await?;
        let sample = parse_sample(&body, &self.source, &self.currencies)?;

        info!(
            "Exchange rate {} to {} fetched: datetime_rate={} value_rate={}",
            sample.source_currency,
            sample.target_currency,
            sample.fetched_at_epoch,
            sample.rate_value
        );

        Ok(sample)
    }
}
