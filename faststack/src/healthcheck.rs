//! HTTP health checks: a probe for remote services and a router answering local probes.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use fxhash::FxHashSet;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::debug;

/// Path of the health endpoint served by [healthcheck_router] by convention.
pub const DEFAULT_HEALTHCHECK_PATH: &str = "/health";

/// Time limit of a single probe, unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Response received from a probed service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: StatusCode,
    pub reason: String,
}

/// Result of a probe. A missing response means the request itself failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthCheck {
    pub healthy: bool,
    pub response: Option<HealthResponse>,
}

impl HealthCheck {
    /// Human-readable summary of this result.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl Display for HealthCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = if self.healthy { "healthy" } else { "unhealthy" };
        match &self.response {
            Some(response) => write!(
                f,
                "Service is {state} with status code {} and reason {}",
                response.status.as_u16(),
                response.reason
            ),
            None => write!(f, "Service is {state} with no response"),
        }
    }
}

/// Issues a GET request to `url`. The service is healthy if it responds with one of `acceptable`
/// status codes (200 if empty). Network failures are reported as unhealthy, never as errors.
pub async fn healthcheck(url: &str, acceptable: &[StatusCode]) -> HealthCheck {
    healthcheck_with_timeout(url, acceptable, DEFAULT_TIMEOUT).await
}

/// [healthcheck] with a custom request timeout.
pub async fn healthcheck_with_timeout(
    url: &str,
    acceptable: &[StatusCode],
    timeout: Duration,
) -> HealthCheck {
    let acceptable: FxHashSet<StatusCode> = if acceptable.is_empty() {
        [StatusCode::OK].into_iter().collect()
    } else {
        acceptable.iter().copied().collect()
    };

    let response = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client.get(url).send().await,
        Err(error) => Err(error),
    };

    match response {
        Ok(response) => {
            let status = response.status();
            debug!(url, status = status.as_u16(), "Received health check response.");

            HealthCheck {
                healthy: acceptable.contains(&status),
                response: Some(HealthResponse {
                    status,
                    reason: status.canonical_reason().unwrap_or_default().to_string(),
                }),
            }
        }
        Err(error) => {
            debug!(url, %error, "Health check request failed.");

            HealthCheck {
                healthy: false,
                response: None,
            }
        }
    }
}

/// Router answering GET `path` with an empty 204 response.
pub fn healthcheck_router<S: Clone + Send + Sync + 'static>(path: &str) -> Router<S> {
    Router::new().route(path, get(|| async { StatusCode::NO_CONTENT }))
}
