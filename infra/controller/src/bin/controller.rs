//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Main controller binary for the Dataset controller

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};

use chrono::Utc;
use clap::Parser;
use dataset_controller::{
    Context, Controller, ControllerConfig, ControllerError, ControllerResult, KubeStore, Metrics,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "dataset-controller", version, about = "Kubernetes controller for Dataset resources")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "DATASET_CONTROLLER_CONFIG")]
    config: Option<PathBuf>,

    /// Address of the health and metrics server
    #[arg(long)]
    http_addr: Option<String>,
}

/// Application state
#[derive(Clone)]
struct AppState {
    /// Metrics collection
    metrics: Arc<Metrics>,
    /// Last event timestamp
    last_event: Arc<tokio::sync::RwLock<chrono::DateTime<Utc>>>,
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Metrics endpoint
async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// Root endpoint with debug information
async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    let last_event = *state.last_event.read().await;
    Json(serde_json::json!({
        "last_event": last_event.to_rfc3339(),
        "service": "dataset-controller",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Start the HTTP server
async fn start_server(addr: String, state: AppState) -> ControllerResult<()> {
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ControllerError::HttpError(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ControllerError::HttpError(e.to_string()))?;

    Ok(())
}

/// Initialize logging
fn init_logging(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,dataset_controller=debug".into());

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let mut config = ControllerConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.http_addr = addr;
    }

    init_logging(config.log_json);

    info!("Starting Dataset controller v{}", env!("CARGO_PKG_VERSION"));

    let job_template = config.job_template()?;
    let metrics = Arc::new(Metrics::install_prometheus()?);
    let last_event = Arc::new(tokio::sync::RwLock::new(Utc::now()));

    let state = AppState {
        metrics: metrics.clone(),
        last_event: last_event.clone(),
    };

    let client = kube::Client::try_default().await?;
    let store = Arc::new(KubeStore::new(client.clone()));
    let ctx = Context::new(store, job_template, metrics);

    // Start HTTP server in background
    let server_handle = tokio::spawn(start_server(config.http_addr.clone(), state));

    let controller = Controller::new(client, ctx, last_event);
    let mut controller_handle = tokio::spawn(controller.run());

    // The controller stops on its own on SIGTERM; ctrl-c is handled here as well
    let controller_running = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
            true
        }
        result = &mut controller_handle => {
            match result {
                Ok(Ok(())) => info!("Controller exited"),
                Ok(Err(e)) => error!("Controller failed: {}", e),
                Err(e) => error!("Controller task failed: {:?}", e),
            }
            false
        }
    };

    info!("Shutting down...");

    server_handle.abort();
    if controller_running {
        controller_handle.abort();
    }

    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        if let Err(e) = server_handle.await {
            if !e.is_cancelled() {
                error!("Server task failed: {:?}", e);
            }
        }
        if controller_running {
            if let Err(e) = controller_handle.await {
                if !e.is_cancelled() {
                    error!("Controller task failed: {:?}", e);
                }
            }
        }
    })
    .await;

    info!("Shutdown complete");
    Ok(())
}
