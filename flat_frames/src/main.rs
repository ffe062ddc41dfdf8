use std::process::ExitCode;

use clap::Parser;
use flat_frames::{cli::Args, session::Session, FlatError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(FlatError::Config(e).exit_code());
        }
    };

    let destination = match config.destination(&chrono::Local::now()) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(FlatError::Config(e).exit_code());
        }
    };

    let mut client = match flat_frames::connect(&config).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    tracing::info!("Connected to {}", config.server);

    // Dropping the run on ctrl-c turns the light back off before we disconnect.
    let result = tokio::select! {
        result = flat_frames::run(&client, &config, &destination) => result,
        _ = tokio::signal::ctrl_c() => Err(FlatError::Interrupted),
    };

    if let Err(e) = client.disconnect().await {
        tracing::warn!("Error disconnecting from {}: {}", config.server, e);
    }

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
