use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier_core::app::DispatcherBuilder;
use courier_core::impls::{InMemoryOutboxStore, LogPublisher};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod demo;

use config::Args;
use demo::UserCreated;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format)?;

    let config = args.dispatcher_config()?;
    info!(?config, "starting courier");

    let store = Arc::new(InMemoryOutboxStore::new());
    demo::seed(&store);

    let dispatcher = DispatcherBuilder::new()
        .config(config)
        .register_schema::<UserCreated>()?
        .expect_queues(&["user_events"])
        .repository(store.clone())
        .publisher(Arc::new(LogPublisher::new()))
        .build()?;

    if args.once {
        let report = dispatcher.run_cycle().await?;
        info!(?report, "single cycle done");
    } else {
        let handle = Arc::new(dispatcher).spawn();
        tokio::signal::ctrl_c()
            .await
            .context("install Ctrl-C handler")?;
        info!("shutdown requested; finishing current cycle");
        let stats = handle.shutdown_and_join().await;
        info!(?stats, "dispatcher stopped");
    }

    println!("{}", serde_json::to_string_pretty(&store.counts())?);
    Ok(())
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("init json logging")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("init pretty logging")?,
        other => anyhow::bail!("unsupported log format: {other}"),
    }
    Ok(())
}
