use crate::cli_options::{CliCommand, CliOptions};
use anyhow::{Context, Result};
use clap::Parser;
use feature_group_core::{Dataset, FeatureGroupConfig, FeatureGroupDataset, Table};
use std::fs::{self, File};
use std::io;
use std::future::Future;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli_options;

#[tokio::main]
async fn main() -> Result<()> {
    let CliOptions {
        chdir,
        log_level,
        config,
        command,
    } = CliOptions::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::from(log_level).into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cwd = match chdir {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let config_path = cwd.join(&config);
    let yaml_str = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config {}", config_path.display()))?;
    let config = FeatureGroupConfig::from_yaml_str(&yaml_str)?;

    let cancellation = CancellationToken::new();
    tokio::spawn(cancel_on(shutdown_signal(), cancellation.clone()));
    let dataset = FeatureGroupDataset::from_config(config)
        .await?
        .with_cancellation(cancellation);

    match command {
        CliCommand::Save { input } => {
            let input = cwd.join(input);
            let table = read_table(&input)?;
            tracing::info!("Read {} row(s) from {}", table.num_rows(), input.display());
            dataset.save(&table).await?;
        }
        CliCommand::Load { output } => {
            let table = dataset.load().await?;
            tracing::info!("Query returned {} row(s)", table.num_rows());
            match output {
                Some(path) => {
                    let path = cwd.join(path);
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    table.write_csv(file)?;
                }
                None => table.write_csv(io::stdout().lock())?,
            }
        }
        CliCommand::Describe => {
            let description = dataset.describe();
            println!("{:?}", description);
            if dataset.exists().await? {
                let remote = description.feature_group.describe().await?;
                println!("status: {}", remote.status);
                if let Some(reason) = remote.failure_reason {
                    println!("failure reason: {}", reason);
                }
                if let Some(catalog) = remote.offline_store {
                    println!(
                        "offline store: {}.{}.{}",
                        catalog.catalog, catalog.database, catalog.table_name
                    );
                }
            } else {
                println!("status: does not exist");
            }
        }
    }
    Ok(())
}

fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Table::from_csv_reader(file)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Cancels `cancellation` once `signal` resolves. A signal that cannot be awaited is
/// logged and leaves the token alone.
async fn cancel_on(signal: impl Future<Output = Result<()>>, cancellation: CancellationToken) {
    match signal.await {
        Ok(()) => cancellation.cancel(),
        Err(err) => tracing::error!("Failed to listen for shutdown signals: {:#}", err),
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, cancelling...");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, cancelling...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C, cancelling...");
    }
    Ok(())
}
