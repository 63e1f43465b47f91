#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use smbserve::{config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .position(|a| a == "--config")
        .and_then(|i| std::env::args().nth(i + 1))
        .or_else(|| std::env::args().nth(1).filter(|a| !a.starts_with("--")))
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());

    let config = config::load_config(&config_path)?;

    let server_state = Arc::new(server::ServerState::new(config.clone()));
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("{} listening on {}", config.server_name, addr);
    info!(
        server_guid = %server_state.server_guid,
        dialects = ?config.negotiation.revisions().iter().map(|r| r.to_string()).collect::<Vec<_>>(),
        credit_limit = config.credits.limit,
        "Negotiation settings"
    );

    // Connections watch this to stop between messages
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut accept_delay = Duration::ZERO;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        accept_delay = Duration::ZERO;
                        info!("Connection from {}", peer);
                        let state = server_state.clone();
                        let shutdown = shutdown_rx.clone();
                        tokio::spawn(
                            async move {
                                if let Err(e) = server::handle_connection(stream, state, shutdown).await {
                                    warn!(error = %e, "Connection terminated");
                                }
                                info!("Connection closed");
                            }
                            .instrument(tracing::info_span!("conn", peer = %peer)),
                        );
                    }
                    Err(e) => {
                        accept_delay = server::next_accept_delay(accept_delay);
                        error!(delay_ms = accept_delay.as_millis() as u64, "Accept error: {:?}", e);
                        tokio::time::sleep(accept_delay).await;
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("Shutting down");
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    }

    Ok(())
}
