//! `/metrics` exposition for the standalone frontend process (A4 open
//! question: the frontend serves its own registry; the backend, embedded
//! in a host process, leaves exposition to that host).

use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

#[derive(Clone)]
pub struct MetricsApp {
    registry: Arc<Registry>,
}

impl MetricsApp {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn router(&self) -> Router {
        Router::new().route("/metrics", get(metrics_handler)).with_state(self.clone())
    }
}

async fn metrics_handler(State(app): State<MetricsApp>) -> Result<String, StatusCode> {
    let mut buffer = String::new();
    encode(&mut buffer, &app.registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(buffer)
}
