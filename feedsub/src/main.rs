//! feedsub - subscribe to a simulated source and stream its items
//!
//! CLI entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use feedsub::cli::{Cli, Command, RunArgs};
use feedsub::config::Config;
use feedsub::fetch::SimulatedFetcher;
use feedsub::subscription::{Subscription, SubscriptionHandle};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    debug!(?level, "Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Run(args) => cmd_run(config, args).await,
        Command::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

/// Run a subscription against the simulated source until stopped
async fn cmd_run(mut config: Config, args: RunArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    debug!(?config, "cmd_run: called");

    let fetcher = Arc::new(SimulatedFetcher::new(config.fetcher.clone()));
    let (handle, mut updates, task) =
        Subscription::spawn(config.subscription.clone(), fetcher).context("Failed to start subscription")?;

    // Consumer: drain until the subscription closes the stream
    let consumer = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(item) = updates.recv().await {
            received += 1;
            println!("{} {} {}", "->".cyan(), item.id.to_string().yellow(), item.data);
        }
        debug!(received, "consumer: stream ended");
        received
    });

    info!("Subscription running. Ctrl+C to close, SIGTERM to cancel.");
    wait_for_stop(&handle, args.duration_secs.map(Duration::from_secs)).await?;

    let received = consumer.await.context("Consumer task failed")?;
    task.await.context("Subscription task failed")?;

    println!("{} {} items received", "✓".green(), received);
    Ok(())
}

/// Block until a stop condition, then close or cancel the subscription
async fn wait_for_stop(handle: &SubscriptionHandle, duration: Option<Duration>) -> Result<()> {
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                warn!("SIGINT received");
                report_close(handle).await;
            }
            _ = sigterm.recv() => {
                warn!("SIGTERM received, cancelling");
                handle.cancel();
            }
            _ = deadline => {
                info!("Run duration elapsed");
                report_close(handle).await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                warn!("Ctrl+C received");
                report_close(handle).await;
            }
            _ = deadline => {
                info!("Run duration elapsed");
                report_close(handle).await;
            }
        }
    }

    Ok(())
}

async fn report_close(handle: &SubscriptionHandle) {
    match handle.close().await {
        Ok(Some(error)) => println!("{} last fetch error: {}", "!".yellow(), error),
        Ok(None) => println!("{} closed cleanly", "✓".green()),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}
