//! HTTP routes

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use once_cell::sync::Lazy;
use orderline_core::Order;
use orderline_observability::{HealthState, health_router};
use regex::Regex;
use tower_http::trace::TraceLayer;

use crate::lookup::{LookupError, LookupService};

static ORDER_UID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").unwrap());

/// Order lookup plus the health and metrics endpoints
pub fn router(lookup: LookupService, health: HealthState) -> Router {
    Router::new()
        .route("/order/{order_uid}", get(get_order))
        .with_state(lookup)
        .merge(health_router(health))
        .layer(TraceLayer::new_for_http())
}

async fn get_order(
    State(lookup): State<LookupService>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>, LookupError> {
    if !ORDER_UID_REGEX.is_match(&order_uid) {
        return Err(LookupError::InvalidKey(order_uid));
    }

    lookup.lookup(&order_uid).await.map(Json)
}
