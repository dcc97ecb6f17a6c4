/*
 * Responsibility
 * - Load config -> build stores and the validator -> assemble the Router
 * - Apply middleware (HTTP layers, DPoP guard)
 * - Start with axum::serve()
 */
use std::{panic, process, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::{health::health, revoke::revoke};
use crate::config::Config;
use crate::middleware::dpop::RequestOrigin;
use crate::middleware::http::{self, HttpLimits};
use crate::services::{
    binding::{BindingStore, InMemoryBindingStore, ValkeyBindingStore},
    dpop::DpopValidator,
    replay::{InMemoryReplayStore, ReplayStore, ValkeyReplayStore},
};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,dpop_validator=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing; stderr may be hidden depending on the launcher.
        tracing::error!(?info, "panic");

        // Development: fail fast. Production: default behavior, server keeps running.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting DPoP guard in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(
        state,
        HttpLimits {
            body_limit_bytes: config.http_body_limit_bytes,
            timeout: config.http_timeout,
        },
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(config: &Config) -> Result<AppState> {
    let (replay, bindings): (Arc<dyn ReplayStore>, Arc<dyn BindingStore>) =
        match config.valkey_url.as_deref() {
            Some(url) => {
                tracing::info!("using valkey for DPoP replay and binding stores");
                (
                    Arc::new(ValkeyReplayStore::new(url).await?),
                    Arc::new(ValkeyBindingStore::new(url).await?),
                )
            }
            None => {
                tracing::warn!(
                    "VALKEY_URL not set; DPoP state is in-memory and not shared across instances"
                );
                if !config.dpop.allow_unbound_tokens {
                    tracing::warn!(
                        "in-memory binding store starts empty and this service issues no tokens; \
                         every protected request fails with no binding found unless \
                         DPOP_ALLOW_UNBOUND_TOKENS=true or VALKEY_URL points at the issuer's store"
                    );
                }
                let replay = Arc::new(InMemoryReplayStore::new());
                let _replay_sweeper = replay.clone().spawn_sweeper(config.sweep_interval);
                let bindings = Arc::new(InMemoryBindingStore::new());
                let _binding_sweeper = bindings.clone().spawn_sweeper(config.sweep_interval);
                (replay, bindings)
            }
        };

    tracing::info!(
        validity_ms = millis(config.dpop.header_validity_period),
        skew_ms = millis(config.dpop.clock_skew),
        revocation_ttl_secs = config.dpop.revocation_ttl.as_secs(),
        skip_in_revoke = config.dpop.skip_dpop_validation_in_revoke,
        allow_unbound = config.dpop.allow_unbound_tokens,
        trust_forwarded_headers = config.trust_forwarded_headers,
        "DPoP policy"
    );

    let validator = Arc::new(DpopValidator::new(config.dpop, replay, bindings));
    let origin = RequestOrigin {
        public_base_url: config.public_base_url.clone(),
        trust_forwarded_headers: config.trust_forwarded_headers,
    };

    Ok(AppState::new(validator, origin))
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Full application router; also what the HTTP tests drive.
pub fn build_router(state: AppState, limits: HttpLimits) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/oauth2/revoke", post(revoke))
        .nest("/api/v1", api::v1::routes(state.clone()))
        .with_state(state);

    http::apply(router, limits)
}
