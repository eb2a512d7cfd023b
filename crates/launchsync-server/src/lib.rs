//! launchsync server library logic.
//!
//! Wires the engine's pure decisions to the ledgers and to the external
//! capabilities: the reconciliation loop, notification fan-out, the countdown
//! scanner, their background timers and a small read-only operator API.

pub mod adapters;
pub mod api;
pub mod background;
pub mod config;
pub mod countdown;
pub mod error;
pub mod fanout;
pub mod ports;
pub mod reconcile;
pub mod retention;
pub mod store;

pub use countdown::{CountdownReport, CountdownScanner, ScanOutcome};
pub use error::{ReconcileError, StartupError};
pub use fanout::{ChangeNotice, DeliveryOutcome, DeliveryReport, Notifier};
pub use ports::{Capabilities, CalendarService, DeliveryTransport, DestinationStore, FeedSource};
pub use reconcile::{CycleOutcome, CycleReport, ReconcileSettings, Reconciler};
pub use store::SqliteDestinationStore;

use axum::{routing::get, Extension, Json, Router};
use launchsync_db::DbPool;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/events", get(api::list_events_handler))
        .route("/api/events/{id}/mirrors", get(api::event_mirrors_handler))
        .route(
            "/api/destinations/{id}/mirrors",
            get(api::destination_mirrors_handler),
        )
        .route(
            "/api/destinations/{id}/watermark",
            get(api::destination_watermark_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
