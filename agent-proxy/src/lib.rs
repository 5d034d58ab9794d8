pub mod backend;
pub mod config;
pub mod error;
pub mod frontend;
pub mod metrics;
pub mod metrics_http;

pub use config::{BackendConfig, FrontendArgs, Options};
pub use error::ProxyError;
pub use metrics::Metrics;
pub use metrics_http::MetricsApp;
