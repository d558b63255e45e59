use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use cron::Schedule;

pub const DEFAULT_SCHEDULE: &str = "0 */10 * * * *";
const DEFAULT_RETRIES: u32 = 5;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STATUS_ADDR: &str = "127.0.0.1:8080";

/// Settings read once at startup. Never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub access_key: String,
    pub source: String,
    pub currencies: String,
    pub database_url: String,
    pub schedule: Schedule,
    pub retries: u32,
    pub retry_delay: Duration,
    pub http_timeout: Duration,
    pub status_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("Setting {} is not set", key))
        };

        let schedule_expr = lookup("SCHEDULE")
            .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());
        let schedule = Schedule::from_str(&schedule_expr)
            .with_context(|| format!("Can't parse SCHEDULE {:?}", schedule_expr))?;

        Ok(Config {
            api_url: required("URL")?,
            access_key: required("ACCESS_KEY")?,
            source: required("SOURCE")?,
            currencies: required("CURRENCIES")?,
            database_url: required("DATABASE_URL")?,
            schedule,
            retries: parse_or(&lookup, "RETRIES", DEFAULT_RETRIES)?,
            retry_delay: Duration::from_secs(parse_or(
                &lookup,
                "RETRY_DELAY_SECS",
                DEFAULT_RETRY_DELAY_SECS,
            )?),
            http_timeout: Duration::from_secs(parse_or(
                &lookup,
                "HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            status_addr: match lookup("STATUS_ADDR") {
                Some(addr) => addr
                    .parse()
                    .with_context(|| format!("Can't parse STATUS_ADDR {:?}", addr))?,
                None => DEFAULT_STATUS_ADDR.parse()?,
            },
        })
    }

    /// Key of the requested pair inside the `quotes` object, e.g. `BTCRUB`.
    pub fn pair(&self) -> String {
        format!("{}{}", self.source, self.currencies)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Can't parse {} {:?}", key, value)),
        None => Ok(default),
    }
}
