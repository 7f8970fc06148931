//! Read-through order lookup

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orderline_cache::{OrderCache, Ttl};
use orderline_core::{Order, OrderStore};
use orderline_observability::Metrics;
use orderline_observability::metrics::LookupResult;
use std::sync::Arc;
use std::time::Duration;

/// Lookup errors, rendered as JSON error bodies
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid order id: {0}")]
    InvalidKey(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LookupError {
    pub fn status(&self) -> StatusCode {
        match self {
            LookupError::NotFound(_) => StatusCode::NOT_FOUND,
            LookupError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            LookupError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            LookupError::NotFound(_) => "not_found_error",
            LookupError::InvalidKey(_) => "invalid_request_error",
            LookupError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": status.as_u16(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Serves orders from the cache, falling back to the durable store
///
/// A store hit is cached with the default TTL before it is returned, so the
/// next lookup for the same key is served from memory.
#[derive(Clone)]
pub struct LookupService {
    cache: OrderCache,
    store: Arc<dyn OrderStore>,
    default_ttl: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl LookupService {
    pub fn new(cache: OrderCache, store: Arc<dyn OrderStore>, default_ttl: Duration) -> Self {
        Self {
            cache,
            store,
            default_ttl,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn lookup(&self, key: &str) -> Result<Order, LookupError> {
        if let Some(order) = self.cache.get(key).await {
            tracing::debug!(order_uid = %key, "Cache hit");
            self.record(LookupResult::Hit);
            return Ok(order);
        }

        match self.store.get_by_key(key).await {
            Ok(Some(order)) => {
                tracing::debug!(order_uid = %key, "Cache miss, loaded from store");
                self.cache
                    .set(order.clone(), Ttl::After(self.default_ttl))
                    .await;
                self.record(LookupResult::Miss);
                Ok(order)
            }
            Ok(None) => {
                self.record(LookupResult::NotFound);
                Err(LookupError::NotFound(key.to_string()))
            }
            Err(e) => {
                tracing::error!(order_uid = %key, error = %e, "Store lookup failed");
                self.record(LookupResult::Error);
                Err(LookupError::Internal(e.to_string()))
            }
        }
    }

    fn record(&self, result: LookupResult) {
        if let Some(metrics) = &self.metrics {
            metrics.record_lookup(result);
        }
    }
}
