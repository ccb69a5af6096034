use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

mod bootstrap;
mod codec;
mod config;
mod dataset_file;
mod dataset_store;
mod error;
mod geo;
mod identifier;
mod merged_schedule;
mod overlay;
mod publisher;
mod query;
mod receiver;
mod remote_catalog;
mod remote_schedule;
mod schedule;
mod socks;
mod station;
mod station_registry;

use config::Cli;
use error::Error;
use overlay::{HttpStationClient, StationClient};
use station::{run_station_actor, Station, StationHandle};
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    station: StationHandle,
}

async fn status(State(app): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    Ok(Json(app.station.status().await?))
}

async fn station_list(State(app): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    Ok(Json(app.station.station_list().await?))
}

async fn schedule(State(app): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    Ok(Json(app.station.schedule().await?))
}

async fn dataset_catalog(State(app): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    Ok(Json(app.station.dataset_catalog().await?))
}

async fn dataset_bytes(
    State(app): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Vec<u8>, Error> {
    let id = identifier::Identifier::from_base32(&id)
        .map_err(|_| Error::InvalidFormat("malformed dataset id".into()))?;
    app.station.dataset_bytes(id).await
}

/// `POST /ctrl/<subpath>` — stub per §4.9: checks the requesting peer
/// against the control allowlist before anything else, but performs no
/// control operation yet. The original reads the peer's authenticated
/// overlay identity off the connection; that authentication lives in the
/// overlay transport this crate depends on (§1), so here the peer id
/// arrives as the `x-station-peer-id` header the overlay's HTTP bridge is
/// expected to set. Once the allowlist check clears, reads exactly
/// `Content-Length` bytes of body and discards them — a non-allowlisted
/// peer is rejected before any body is buffered, so it cannot hold the
/// connection open past the declared length.
async fn ctrl(
    State(app): State<AppState>,
    AxumPath(_subpath): AxumPath<String>,
    request: axum::extract::Request,
) -> Result<StatusCode, Error> {
    let peer_id = request
        .headers()
        .get("x-station-peer-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| identifier::Identifier::from_base32(s).ok())
        .ok_or(Error::Denied)?;
    if !app.station.accepts_ctrl(peer_id).await? {
        return Err(Error::Denied);
    }

    let content_length = request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    axum::body::to_bytes(request.into_body(), content_length)
        .await
        .map_err(|_| Error::InvalidFormat("ctrl body exceeds declared Content-Length".into()))?;

    Ok(StatusCode::NOT_FOUND)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Drives the bootstrap (60s), registry maintenance (600s), and schedule
/// (sub-second) timers against the actor mailbox. Mirrors `Station`'s
/// `_bootstrapTimer` and `StationList::_networkUpdateTimer`. The actor
/// itself performs the resulting peer contact and schedule/catalog refresh
/// (see `run_station_actor`); this loop only triggers the tick and logs
/// what the actor reports back.
async fn run_timers(handle: StationHandle) {
    let mut bootstrap_interval =
        tokio::time::interval(std::time::Duration::from_secs(station::BOOTSTRAP_INTERVAL_SECS));
    let mut registry_interval =
        tokio::time::interval(std::time::Duration::from_secs(station::REGISTRY_TICK_INTERVAL_SECS));
    let mut schedule_interval = tokio::time::interval(std::time::Duration::from_millis(750));

    loop {
        tokio::select! {
            _ = bootstrap_interval.tick() => {
                match handle.bootstrap_tick().await {
                    Ok(seeds) => info!(count = seeds.len(), "bootstrap seeds loaded"),
                    Err(e) => warn!(error = %e, "bootstrap tick failed"),
                }
            }
            _ = registry_interval.tick() => {
                match handle.registry_tick().await {
                    Ok(station_registry::RegistryTickAction::ContactCandidate(id)) => {
                        info!(peer = %id, "registry tick: candidate to contact");
                    }
                    Ok(station_registry::RegistryTickAction::RefreshKnown(id)) => {
                        info!(peer = %id, "registry tick: known station to refresh");
                    }
                    Ok(station_registry::RegistryTickAction::Idle) => {}
                    Err(e) => warn!(error = %e, "registry tick failed"),
                }
            }
            _ = schedule_interval.tick() => {
                if let Err(e) = handle.schedule_tick().await {
                    warn!(error = %e, "schedule tick failed");
                }
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "vlf_station=info,tower_http=info".into()))
        .json()
        .init();

    let cli = Cli::parse();
    info!(config_dir = %cli.config_dir.display(), max_cost = cli.max_cost, "starting vlf-station");

    let station = match Station::open(&cli.config_dir, cli.max_cost) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("fatal: cannot open station at {}: {e}", cli.config_dir.display());
            std::process::exit(1);
        }
    };

    let (tx, rx) = mpsc::channel(256);
    let handle = StationHandle::new(tx);
    let client: Arc<dyn StationClient> = Arc::new(HttpStationClient::new());
    tokio::spawn(run_station_actor(station, rx, client));
    tokio::spawn(run_timers(handle.clone()));

    let state = AppState { station: handle };
    let app = Router::new()
        .route("/status", get(status))
        .route("/list", get(station_list))
        .route("/schedule", get(schedule))
        .route("/data", get(dataset_catalog))
        .route("/data/{id}", get(dataset_bytes))
        .route("/ctrl/{subpath}", post(ctrl))
        .fallback(not_found)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CompressionLayer::new()));

    info!(listen = %cli.listen, "listening");
    let listener = match tokio::net::TcpListener::bind(cli.listen).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("fatal: cannot bind {}: {e}", cli.listen);
            std::process::exit(1);
        }
    };

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
        })
        .await;

    if let Err(e) = result {
        warn!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
