use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use disaster_feed::{
    cli::Args,
    client::WebSocketTransport,
    config::Config,
    events::{FeedUpdate, create_update_channel, notify},
    feed::EventFeed,
    manager::ConnectionManager,
    monitoring::{HealthStatus, setup_metrics},
    tracing_setup::setup_tracing,
    ui::{ConsoleCommand, UIController},
};
use std::{io::BufRead, thread, time::Duration};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

/// Forwards stdin lines from a plain thread. A blocking stdin read cannot be
/// cancelled, so it must not live on the runtime or shutdown would wait on it.
fn spawn_console_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        return;
                    }
                }
            }
            debug!("stdin closed, console commands disabled");
        });
    if let Err(e) = spawned {
        warn!("Console commands unavailable: {}", e);
    }
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(&args.log_level, args.json_logs)?;

    // wss:// needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    info!(
        "Starting disaster response feed client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_args(&args)?;
    let started_at = Utc::now();

    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    let (updates, update_receiver) = create_update_channel();
    let mut ui = UIController::new(update_receiver, &config.display);
    if config.credential.is_none() {
        ui.print_error(
            "NO CREDENTIAL",
            "No bearer token given (--token or DISASTER_FEED_TOKEN), feed stays idle",
        );
    }

    let mut feed = EventFeed::with_updates(config.feed.capacity, updates.clone())
        .with_channels(&config.feed.channels);
    let mut manager = ConnectionManager::new(WebSocketTransport::new(config.websocket.clone()));
    let mut state_rx = manager.subscribe_state();

    manager.open(config.credential.clone());
    feed.follow(&manager);

    let mut ui_handle = tokio::spawn(async move { ui.run().await });
    let mut health = tokio::time::interval(config.health.check_interval);
    let mut console = spawn_console_reader();

    info!("Feed running. Type 'clear', 'health' or 'quit'; Ctrl+C to shutdown...");
    let ui_finished = loop {
        tokio::select! {
            transition = state_rx.recv() => {
                let state = match transition {
                    Ok(state) => state,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "State subscriber lagged, resyncing");
                        manager.state()
                    }
                    Err(RecvError::Closed) => break false,
                };
                notify(&updates, FeedUpdate::StateChanged(state));
                feed.follow(&manager);
            }
            _ = &mut ui_handle => break true,
            _ = health.tick() => {
                let status = HealthStatus::collect(&manager, &feed, started_at);
                info!(health = %status.to_json(), "Health check");
            }
            Some(line) = console.recv() => {
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Clear) => feed.clear(),
                    Ok(ConsoleCommand::Health) => {
                        let status = HealthStatus::collect(&manager, &feed, started_at);
                        println!("{}", status.to_json());
                    }
                    Ok(ConsoleCommand::Quit) => {
                        info!("Quit requested");
                        break false;
                    }
                    Err(e) if line.trim().is_empty() => debug!("{}", e),
                    Err(e) => warn!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break false;
            }
        }
    };

    manager.close();
    feed.detach();
    drop(feed);
    drop(updates);

    if !ui_finished && tokio::time::timeout(Duration::from_secs(1), ui_handle).await.is_err() {
        warn!("UI did not drain in time");
    }

    info!("Client stopped successfully");
    Ok(())
}
