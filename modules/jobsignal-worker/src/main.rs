use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::{ClaudeAgent, LlmAgent};
use browserless_client::BrowserlessClient;
use jobsignal_common::{Config, Policies};
use jobsignal_store::{migrate, CompanyStore, MatchStore, QueueManager, SourceRegistry};
use jobsignal_worker::context::ProcessorContext;
use jobsignal_worker::search::{SerperSearcher, WebSearcher};
use jobsignal_worker::worker::{run_recovery_sweep, run_worker};

#[derive(Parser, Debug)]
#[command(about = "jobsignal queue worker")]
struct Args {
    /// Override WORKER_COUNT from the environment.
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobsignal=info".parse()?))
        .init();

    info!("jobsignal worker starting...");

    let args = Args::parse();
    let config = Config::from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    migrate(&pool).await?;

    let policies = load_policies(&config.policy_dir)?;

    let queue = QueueManager::new(pool.clone());
    let sources = Arc::new(SourceRegistry::new(pool.clone()));
    let companies = CompanyStore::new(pool.clone());
    let matches = MatchStore::new(pool.clone());

    let renderer = (!config.browserless_url.is_empty()).then(|| {
        Arc::new(BrowserlessClient::new(
            &config.browserless_url,
            (!config.browserless_token.is_empty()).then_some(config.browserless_token.as_str()),
        ))
    });
    let search: Option<Arc<dyn WebSearcher>> = (!config.serper_api_key.is_empty())
        .then(|| Arc::new(SerperSearcher::new(&config.serper_api_key)) as Arc<dyn WebSearcher>);
    let agent: Option<Arc<dyn LlmAgent>> = (!config.anthropic_api_key.is_empty())
        .then(|| Arc::new(ClaudeAgent::new(&config.anthropic_api_key)) as Arc<dyn LlmAgent>);

    let ctx = Arc::new(ProcessorContext::new(
        queue, sources, companies, matches, policies, renderer, search, agent,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_count = args.workers.unwrap_or(config.worker_count).max(1);
    let mut handles = Vec::with_capacity(worker_count + 1);
    for worker_id in 0..worker_count {
        handles.push(tokio::spawn(run_worker(
            ctx.clone(),
            worker_id,
            shutdown_rx.clone(),
        )));
    }

    let sweep = tokio::spawn(run_recovery_sweep(
        ctx.clone(),
        config.lease_timeout_secs,
        config.recovery_interval_secs,
        shutdown_rx,
    ));

    info!(workers = worker_count, "Worker pool running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received; draining workers");
    shutdown_tx.send(true)?;

    for handle in handles {
        let _ = handle.await;
    }
    sweep.abort();

    info!("jobsignal worker stopped");
    Ok(())
}

/// Read the policy documents from the configured directory. Missing
/// required documents fail startup.
fn load_policies(policy_dir: &str) -> Result<Policies> {
    let read = |name: &str| -> Option<serde_json::Value> {
        let path = Path::new(policy_dir).join(format!("{name}.json"));
        let raw = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&raw).ok()
    };

    Ok(Policies::from_documents(
        read("prefilter-policy"),
        read("match-policy"),
        read("scraping-settings"),
    )?)
}
