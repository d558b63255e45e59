use std::sync::Arc;

use anyhow::Result;
use config::Config;
use fetcher::ApiClient;
use inserter::PgHistory;
use log::info;
use runs::RunHistory;
use scheduler::{Pipeline, Scheduler};

mod config;
mod exchange_rate;
mod fetcher;
mod handoff;
mod inserter;
mod quotes;
mod runs;
mod scheduler;
mod status;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = Config::from_env()?;
    info!("Collecting {} rates from {}", config.pair(), config.api_url);

    let history = Arc::new(RunHistory::new());
    let pipeline = Pipeline::new(
        &config,
        ApiClient::new(&config)?,
        PgHistory::new(config.database_url.clone()),
        Arc::clone(&history),
    );
    let scheduler = Scheduler::new(Arc::new(pipeline), config.schedule.clone());

    match status::start(config.status_addr, history) {
        Some(server) => tokio::select! {
            res = scheduler.run_forever() => res?,
            res = server => res?,
        },
        None => scheduler.run_forever().await?,
    }

    Ok(())
}
