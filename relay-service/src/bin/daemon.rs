//! Standalone capture relay daemon.
//!
//! Listens on a Unix socket for detector frames, runs the capture pipeline,
//! and dispatches accepted candidates to the external download manager.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_service::classify::Classifier;
use relay_service::config::Config;
use relay_service::dedupe::DedupeGuard;
use relay_service::dispatch::DispatchEngine;
use relay_service::interceptor::NetworkInterceptor;
use relay_service::pipeline::Pipeline;
use relay_service::server::RelayServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Older installations kept a flat settings file next to the TOML config
    let config_path = Config::default_config_path();
    let legacy_path = config_path.with_file_name("settings.properties");
    let config = Config::import_legacy(&legacy_path, config_path);

    // Initialize logging; RUST_LOG overrides the configured level
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting capture relay daemon");

    if !config.general.enabled {
        info!("Capture is disabled in configuration, exiting");
        return Ok(());
    }

    let classifier = Arc::new(Classifier::new(&config.capture.registered_file_types));
    let guard = Arc::new(Mutex::new(DedupeGuard::new()));
    let engine = Arc::new(DispatchEngine::from_config(&config.dispatch));

    let (pipeline, handle) = Pipeline::new(guard.clone(), engine);
    let pipeline_task = tokio::spawn(pipeline.run());

    let interceptor = Arc::new(NetworkInterceptor::new(
        classifier,
        guard,
        handle.observer_tx.clone(),
        &config.capture.ignored_url_patterns,
    ));
    if config.capture.auto_capture_links {
        interceptor.enable();
    }

    let socket_path = config.server.socket_path.clone();
    let server = RelayServer::new(socket_path.clone(), handle, interceptor.clone());
    println!("Socket: {:?}", server.socket_path());
    println!("Press Ctrl+C to stop");

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    // Tear down: stop observing, release the pipeline senders, and give
    // in-flight dispatches a moment to resolve
    interceptor.disable();
    drop(server);
    let _ = tokio::time::timeout(Duration::from_secs(2), pipeline_task).await;

    // Clean up socket file
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    Ok(())
}
