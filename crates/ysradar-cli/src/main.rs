//! Headless radar: connects to a multiplayer server and logs the traffic
//! picture until interrupted.

mod setup;
mod summary;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use ysradar_config::{CliArgs, Config, default_config_dir};
use ysradar_net::{ConnectionState, Notification, RadarClient};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone().map(Ok).unwrap_or_else(default_config_dir) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    ysradar_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let mut client = RadarClient::new(setup::client_config(&config));
    client.notifications().subscribe(|n| match n {
        Notification::Map(field) => tracing::info!(target: "ysradar::map", "{field}"),
        Notification::Chat(text) => tracing::info!(target: "ysradar::chat", "{text}"),
        other => tracing::info!(target: "ysradar::status", "{other}"),
    });

    let server = &config.server;
    if let Err(e) = client
        .connect(&server.host, server.port, &server.username, server.version)
        .await
    {
        tracing::error!("{e}");
        return ExitCode::FAILURE;
    }

    let mut state = client.state().subscribe();
    let mut summary = config
        .debug
        .summary_interval()
        .map(tokio::time::interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Disconnected {
                    break;
                }
            }
            _ = async {
                match summary.as_mut() {
                    Some(tick) => { tick.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => log_summary(&client).await,
        }
    }

    client.disconnect().await;
    ExitCode::SUCCESS
}

async fn log_summary(client: &RadarClient) {
    let users = client.users().await;
    let planes = client.planes().await;
    let points = client.nav_points().await;

    tracing::info!(
        users = users.len(),
        planes = planes.len(),
        nav = %summary::nav_summary(&points),
        "traffic\n{}",
        summary::traffic_table(&planes)
    );
    tracing::debug!("roster\n{}", summary::roster_table(&users, Instant::now()));

    for user in client.purge_users().await {
        tracing::info!("{} left the server", user.name);
    }
}
