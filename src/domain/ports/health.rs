//! Health probe port.

use async_trait::async_trait;

use crate::domain::errors::HealthCheckError;

/// A single readiness probe (TCP connect, HTTP GET, command exit code).
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Run the probe once.
    async fn check(&self) -> Result<(), HealthCheckError>;

    /// Short description for logs, e.g. `tcp localhost:5432`.
    fn describe(&self) -> String;
}
