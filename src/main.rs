use anyhow::Result;
use clap::Parser;
use job_throttler::config::{Command, Config};
use job_throttler::{CounterStore, LeakyBucketRateLimiter, RedisStore};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::parse();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("job_throttler={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bucket_types = config
        .load_bucket_types()
        .map_err(|e| anyhow::anyhow!("Failed to load bucket types: {}", e))?;

    tracing::info!(
        "Configuration: redis_url={}, bucket_config={}, bucket_types={}",
        config.redis_url,
        config.bucket_config.display(),
        bucket_types.len()
    );

    let store = RedisStore::connect(&config.redis_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;
    store.ping().await?;

    let limiter = LeakyBucketRateLimiter::new(Arc::new(store), bucket_types)?;

    match config.command() {
        Command::Run => {
            tracing::info!("Draining buckets until shutdown");
            shutdown_signal().await;
            limiter.shutdown().await?;
        }
        Command::DrainOnce => {
            limiter.stop();
            let reports = limiter.drain_all_buckets_once().await;
            let failed = reports.values().filter(|report| report.is_err()).count();
            let output: serde_json::Map<String, serde_json::Value> = reports
                .into_iter()
                .map(|(bucket_type, report)| {
                    let value = match report {
                        Ok(report) => serde_json::json!(report),
                        Err(e) => serde_json::json!({ "error": e.to_string() }),
                    };
                    (bucket_type, value)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
            if failed > 0 {
                anyhow::bail!("{} bucket type(s) failed to drain", failed);
            }
        }
        Command::Forbidden => {
            limiter.stop();
            let flags = limiter.forbidden_flags().await?;
            println!("{}", serde_json::to_string_pretty(&flags)?);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
