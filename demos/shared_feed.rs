//! Two consumers sharing one WebSocket feed
//!
//! Run with: cargo run --example shared_feed [WS_URL]
//!
//! Examples:
//!   cargo run --example shared_feed                            # ws://127.0.0.1:8080
//!   cargo run --example shared_feed wss://ws.postman-echo.com/raw
//!
//! Both subscriptions use the same address and config, so only one socket is
//! opened. Kill the server to watch the connection go through reconnecting
//! and, once the attempts run out, error.

use std::time::Duration;

use serde_json::{json, Value};
use socket_share::{ConnectionStatus, SocketConfig, SocketRegistry};

fn print_usage() {
    eprintln!("Usage: shared_feed [WS_URL]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  WS_URL    WebSocket address (default: ws://127.0.0.1:8080)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let address = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("socket_share=debug".parse()?)
                .add_directive("shared_feed=debug".parse()?),
        )
        .init();

    let config = || {
        SocketConfig::<Value>::default()
            .reconnect_interval(Duration::from_millis(500))
            .reconnect_attempts(3)
    };

    let registry = SocketRegistry::<Value>::websocket();
    let ticker = registry.subscribe(address.as_str(), config());
    let chart = registry.subscribe(address.as_str(), config());

    println!("Connecting to {}", address);
    println!("Connection key: {}", ticker.key());

    ticker.connect();
    chart.connect();
    ticker.send(json!({"type": "hello", "from": "ticker"}));

    let mut status = chart.status_changes();
    let mut stats = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow();
                println!("Status: {}", current);

                if current == ConnectionStatus::Connected {
                    chart.send(json!({"type": "hello", "from": "chart"}));
                }
            }
            _ = stats.tick() => {
                for info in registry.snapshot().await {
                    println!(
                        "{} status={} subscribers={} queued={} received={} sent={} dropped={}",
                        info.address,
                        info.status,
                        info.subscriber_count,
                        info.queue_len,
                        info.messages_received,
                        info.messages_sent,
                        info.messages_dropped,
                    );
                }
                println!(
                    "ticker history={} chart history={} last={:?}",
                    ticker.history().len(),
                    chart.history().len(),
                    chart.last_message(),
                );
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    ticker.disconnect();
    chart.disconnect();
    registry.shutdown();

    Ok(())
}
