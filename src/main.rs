use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use github_graph_scraper::{
    config::Config,
    github::GithubApi,
    neo4j,
    scraper::{RunOutcome, Scraper},
    store::Neo4jGraphStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env();
    init_tracing(&cfg)?;

    let graph = neo4j::connect(&cfg).await?;
    neo4j::healthcheck(&graph).await?;

    let fetcher = Arc::new(GithubApi::new(
        &cfg.github_base_url,
        cfg.github_basic_auth_token.clone(),
    )?);
    let store = Arc::new(Neo4jGraphStore::new(graph));
    let budget = cfg.request_budget();

    tracing::info!(base_url = %cfg.github_base_url, budget, "starting scrape run");

    let scraper = Scraper::new(fetcher, store, budget);
    match scraper.run().await? {
        RunOutcome::BudgetExhausted => {
            tracing::info!("hourly request budget exhausted, stopping")
        }
        RunOutcome::RateLimited => tracing::info!("upstream rate limit reached, stopping"),
        RunOutcome::UsersExhausted => tracing::info!("no more users to scrape, stopping"),
    }

    Ok(())
}

fn init_tracing(cfg: &Config) -> anyhow::Result<()> {
    if cfg.is_dev() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        return Ok(());
    }

    let log_file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&cfg.log_file)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}
