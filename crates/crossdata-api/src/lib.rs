//! # Crossdata Analytics API
//!
//! HTTP service exposing the cross-source insurance reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Axum HTTP Server                         │
//! │            (/sources, /reports/*, /join, /health)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AnalyticsEngine                          │
//! │        (joins, aggregation, series, quality, insights)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 DatasetSource (TimeoutSource)               │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │   Local directory       │   │        S3 bucket             │
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use chrono::NaiveDateTime;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crossdata_analytics::AnalyticsEngine;
use crossdata_storage::DatasetSource;

pub use config::Config;
pub use error::{ApiError, ApiResult};

/// Application state for Axum handlers
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn DatasetSource>,
    /// Fixed reference time; the wall clock when unset.
    pub as_of: Option<NaiveDateTime>,
}

impl AppState {
    pub fn new(source: Arc<dyn DatasetSource>) -> Self {
        Self { source, as_of: None }
    }

    #[must_use]
    pub fn with_as_of(mut self, as_of: NaiveDateTime) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Reference time for windowed reports.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.as_of.unwrap_or_else(|| chrono::Utc::now().naive_utc())
    }

    /// Engine for one request.
    #[must_use]
    pub fn engine(&self) -> AnalyticsEngine<'_> {
        AnalyticsEngine::new(self.source.as_ref(), self.now())
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Build the Axum router
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // Sources
        .route("/health", get(handlers::health_check))
        .route("/sources", get(handlers::list_sources))
        .route("/sources/availability", get(handlers::source_availability))
        .route("/sources/{domain}/{table}/info", get(handlers::table_info))
        .route("/sources/summary", get(handlers::bucket_summary))
        // Single-table reports
        .route("/reports/user-statistics", get(handlers::user_statistics))
        .route("/reports/client-demographics", get(handlers::client_demographics))
        .route("/reports/agent-roster", get(handlers::agent_roster))
        .route("/reports/beneficiary-relationships", get(handlers::beneficiary_relationships))
        .route("/reports/product-analysis", get(handlers::product_analysis))
        .route("/reports/transaction-audit", get(handlers::transaction_audit))
        // Cross-source reports
        .route("/reports/customer-policy-profile", get(handlers::customer_policy_profile))
        .route("/reports/agent-performance", get(handlers::agent_performance))
        .route("/reports/claims-vs-policies", get(handlers::claims_vs_policies))
        .route(
            "/reports/claims-payments-correlation",
            get(handlers::claims_payments_correlation),
        )
        .route("/reports/data-quality", get(handlers::data_quality))
        .route("/reports/data-quality.md", get(handlers::data_quality_markdown))
        .route("/reports/claims", get(handlers::claims_analysis))
        .route("/reports/payments", get(handlers::payments_analysis))
        .route("/reports/product-profitability", get(handlers::product_profitability))
        .route("/reports/user-growth", get(handlers::user_growth))
        .route("/reports/activity-patterns", get(handlers::activity_patterns))
        .route("/join", get(handlers::cross_source_join))
        .route("/", get(|| async { "Crossdata Analytics API" }))
        // State and middleware
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
