//! Control-plane gateway binary (§4.2–§4.7): the scheduler tick, the
//! node-facing HTTP surface, the resource-CRUD API, and the event gateway.

mod api;
mod cancel;
mod scheduler_loop;
mod state;
mod wire;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

use af_domain::{Config, CorsConfig};
use af_store::{EventStream, LivenessStore, ResourceStore};

use crate::cancel::PendingCancels;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "af-gateway", about = "Fleet control-plane gateway")]
struct Cli {
    /// Path to the gateway config YAML (falls back to ./configs/af.yaml then env vars).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let issues = config.validate_gateway();
    for issue in &issues {
        tracing::warn!(%issue, "config issue");
    }
    if Config::has_fatal_issues(&issues) {
        anyhow::bail!("gateway config has fatal issues, refusing to start");
    }

    tracing::info!(addr = %format!("{}:{}", config.gateway.host, config.gateway.port), "starting gateway");

    let config = Arc::new(config);
    let store = ResourceStore::open(&config.node.workspace_root);
    let liveness = Arc::new(LivenessStore::new());
    let events = Arc::new(EventStream::new());
    let pending_cancels = Arc::new(PendingCancels::new());
    let shutdown = CancellationToken::new();

    let node_token_hash = if config.node.shared_token.is_empty() {
        tracing::warn!("no shared node token configured — X-Node-Token auth disabled (dev mode)");
        None
    } else {
        tracing::info!("X-Node-Token auth enabled");
        Some(Sha256::digest(config.node.shared_token.as_bytes()).to_vec())
    };

    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        liveness: liveness.clone(),
        events,
        pending_cancels,
        node_token_hash,
        shutdown: shutdown.clone(),
    };

    let scheduler_task = tokio::spawn(scheduler_loop::run(store, liveness, shutdown.clone()));

    let cors_layer = build_cors_layer(&config.gateway.cors);

    let max_concurrent = std::env::var("AF_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);

    let governor_layer = config.gateway.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no gateway.rate_limit in config)");
    }

    let router = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "gateway listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("axum server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    shutdown.cancel();
    let _ = scheduler_task.await;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins. Origins may
/// carry a trailing `:*` wildcard for the port segment.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
