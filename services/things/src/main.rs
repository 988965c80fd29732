//! twin things service
//!
//! Reads newline-delimited JSON requests on stdin and writes one JSON reply
//! per request on stdout. Requests are handled concurrently; replies carry the
//! request's correlation id.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use twin_signals::{ErrorResponse, Headers, SignalError};
use twin_things::config::Config;
use twin_things::{Reply, Request, ThingsService};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!(
        ask_timeout_ms = config.ask_timeout.as_millis() as u64,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        snapshot_interval = config.snapshot_interval,
        journal = ?config.journal,
        "Configuration loaded"
    );

    let rules = config.load_creation_rules()?;
    let journal = config.open_journal()?;
    let service = Arc::new(ThingsService::new(
        journal,
        rules,
        config.dispatcher_settings(),
    ));

    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = reply_rx.recv().await {
            if let Err(e) = write_line(&mut stdout, &line).await {
                error!(error = %e, "Failed to write reply");
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut requests = JoinSet::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => {
                        let service = Arc::clone(&service);
                        let reply_tx = reply_tx.clone();
                        requests.spawn(async move {
                            let reply = handle_line(&service, &line).await;
                            match serde_json::to_string(&reply) {
                                Ok(json) => {
                                    let _ = reply_tx.send(json).await;
                                }
                                Err(e) => error!(error = %e, "Failed to encode reply"),
                            }
                        });
                    }
                    Ok(None) => {
                        debug!("Input closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read input");
                        break;
                    }
                }
            }
            Some(result) = requests.join_next(), if !requests.is_empty() => {
                if let Err(e) = result {
                    warn!(error = %e, "Request task failed");
                }
            }
        }
    }

    while let Some(result) = requests.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Request task failed");
        }
    }

    service.shutdown().await;
    drop(reply_tx);
    let _ = writer.await;

    info!("Things service shutdown complete");
    Ok(())
}

async fn handle_line(service: &ThingsService, line: &str) -> Reply {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => service.handle_request(request).await,
        Err(e) => Reply::Error(ErrorResponse::new(
            &Headers::new(),
            SignalError::validation("malformed_request", e.to_string()),
        )),
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
