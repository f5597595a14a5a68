//! Pentarch API server binary.
//!
//! Usage:
//!   pentarch-api --config config.toml
//!   pentarch-api --port 8080
//!   pentarch-api --port 8080 --bind 0.0.0.0
//!
//! # Environment Variables
//!
//! - `PENTARCH_BIND_ADDR` - Server bind address (default: 127.0.0.1)
//! - `RUST_LOG` - Log filter (default: info with api debug)

use pentarch_api::{serve, AppState};
use pentarch_common::BroadcastSink;
use pentarch_llm::build_llm_client;
use pentarch_supervisor::{
    CheckpointManager, InMemoryCheckpointStore, PipelineConfig, Supervisor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pentarch_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments (simple for now)
    let args: Vec<String> = std::env::args().collect();
    let mut port: u16 = 8080;
    let mut config_path: Option<String> = None;
    let mut bind_addr: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().expect("Invalid port number");
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    bind_addr = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Pentarch API Server");
                println!();
                println!("Usage: pentarch-api [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --port <PORT>    Port to listen on (default: 8080)");
                println!(
                    "  -b, --bind <ADDR>    Bind address (default: 127.0.0.1, env: PENTARCH_BIND_ADDR)"
                );
                println!("  -c, --config <FILE>  Path to config.toml file");
                println!("  -h, --help           Show this help message");
                println!();
                println!("Environment variables:");
                println!("  PENTARCH_BIND_ADDR   Server bind address (overridden by --bind flag)");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    // Determine bind address (CLI flag > env var > default 127.0.0.1)
    let host = bind_addr
        .or_else(|| std::env::var("PENTARCH_BIND_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());

    if host == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0 — this exposes the API to all network interfaces. \
             Ensure a firewall or reverse proxy is in place."
        );
    }

    // Load pipeline configuration
    let config = if let Some(path) = config_path {
        tracing::info!(path = %path, "Loading configuration");
        PipelineConfig::from_file(&path)?
    } else {
        tracing::info!("Using default configuration");
        PipelineConfig::default()
    };

    // Event fan-out channel shared by the supervisor's sink and every
    // WebSocket client.
    let (events, _) = broadcast::channel(config.events.channel_capacity);

    let checkpoints = if config.checkpoint.enabled {
        CheckpointManager::new(Arc::new(InMemoryCheckpointStore::new()))
            .with_save_timeout(Duration::from_millis(config.checkpoint.save_timeout_ms))
    } else {
        tracing::info!("Checkpointing disabled");
        CheckpointManager::disabled()
    };

    let mut builder = Supervisor::builder()
        .with_event_sink(Arc::new(BroadcastSink::new(events.clone())))
        .with_checkpoints(checkpoints)
        .with_event_timeout(Duration::from_millis(config.events.delivery_timeout_ms))
        .with_tool_timeout(Duration::from_millis(config.tool_timeout_ms));

    match &config.llm {
        Some(llm_config) => {
            let client = build_llm_client(llm_config)?;
            tracing::info!(model = %client.model_name(), "Model client configured");
            builder = builder.with_llm(client);
        }
        None => {
            tracing::warn!(
                "No [llm] section in configuration — runs will stop at the action planning stage"
            );
        }
    }

    let state = AppState::new(Arc::new(builder.build()), events);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    serve(Arc::new(state), addr).await?;

    Ok(())
}
