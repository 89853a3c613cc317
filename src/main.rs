//! Application entry point for the `aquamind-forecast` service.
//!
//! This binary orchestrates the full startup sequence for the strawberry
//! forecasting API, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Loading the readings table (PostgreSQL first, CSV fallback)
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Serving requests until Ctrl-C, then cancelling in-flight forecasts
//!
//! # Environment Variables
//! - `DATABASE_URL` (optional) – PostgreSQL connection string
//! - `READINGS_CSV` (optional) – CSV dataset used as fallback
//! - `AQUAMIND_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AQUAMIND_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full list.
use std::{env, net::SocketAddr};

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod config;
mod forecast;
mod models;
mod routes;
mod schema;
mod state;
mod status;
mod store;

pub use config::Config;
pub use state::AppState;

// Re-exported for routes/*.rs and the forecast core, which only know their
// parent module.
pub use models::{ForecastPoint, GroupKey, Metrics, Parameter, RawReading, Reading, TimeOfDay};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let state = AppState::init(cfg).await?;

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown_token()))
        .await?;

    state.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C and trip the shutdown token.
async fn shutdown_signal(token: CancellationToken) {
    // ---
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cancelling in-flight forecasts");
    token.cancel();
}

// ---

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `AQUAMIND_LOG_LEVEL` picks the level
/// and sqlx statement logging stays at `warn`. Span close events are always
/// on, so each `forecast` span reports its run time; `AQUAMIND_SPAN_EVENTS`
/// adds enter/exit events. `FORCE_COLOR` overrides TTY detection.
fn init_tracing() {
    // ---
    let env_filter = match env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(filter_directives(
            env::var("AQUAMIND_LOG_LEVEL").ok().as_deref(),
        )),
    };
    let use_color = color_override(env::var("FORCE_COLOR").ok().as_deref())
        .unwrap_or_else(|| std::io::stdout().is_terminal());

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events(env::var("AQUAMIND_SPAN_EVENTS").ok().as_deref()))
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

/// Default filter when `RUST_LOG` is unset. Unknown levels mean `debug`.
fn filter_directives(level: Option<&str>) -> String {
    let level = match level.map(str::trim) {
        Some(l @ ("trace" | "debug" | "info" | "warn" | "error")) => l,
        _ => "debug",
    };
    format!("{level},sqlx::query=warn")
}

fn span_events(mode: Option<&str>) -> FmtSpan {
    match mode {
        Some("full") => FmtSpan::FULL,
        Some("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT | FmtSpan::CLOSE,
        _ => FmtSpan::CLOSE,
    }
}

/// `Some` when `FORCE_COLOR` decides, `None` to fall back to TTY detection.
fn color_override(raw: Option<&str>) -> Option<bool> {
    match raw {
        Some("1" | "true" | "yes") => Some(true),
        Some("0" | "false" | "no") => Some(false),
        _ => None,
    }
}
