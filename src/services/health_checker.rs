//! Health probe implementations: TCP connect, HTTP GET, and command exit code.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;

use crate::domain::errors::HealthCheckError;
use crate::domain::models::HealthProbe;
use crate::domain::ports::HealthChecker;

/// Build the checker for a configured probe.
pub fn checker_for(probe: &HealthProbe, timeout: Duration) -> Arc<dyn HealthChecker> {
    match probe {
        HealthProbe::Tcp { host, port } => Arc::new(TcpHealthCheck::new(host.clone(), *port, timeout)),
        HealthProbe::Http { url } => Arc::new(HttpHealthCheck::new(url.clone(), timeout)),
        HealthProbe::Command { argv } => Arc::new(CommandHealthCheck::new(argv.clone(), timeout)),
    }
}

/// Healthy when a TCP connection can be opened.
#[derive(Debug, Clone)]
pub struct TcpHealthCheck {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpHealthCheck {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl HealthChecker for TcpHealthCheck {
    async fn check(&self) -> Result<(), HealthCheckError> {
        let addr = format!("{}:{}", self.host, self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(HealthCheckError::Connect(e.to_string())),
            Err(_) => Err(HealthCheckError::Timeout(self.timeout)),
        }
    }

    fn describe(&self) -> String {
        format!("tcp {}:{}", self.host, self.port)
    }
}

/// Healthy when a GET returns a status below 400.
#[derive(Debug, Clone)]
pub struct HttpHealthCheck {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpHealthCheck {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            timeout,
            client,
        }
    }
}

#[async_trait]
impl HealthChecker for HttpHealthCheck {
    async fn check(&self) -> Result<(), HealthCheckError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                HealthCheckError::Timeout(self.timeout)
            } else {
                HealthCheckError::Connect(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() < 400 {
            Ok(())
        } else {
            Err(HealthCheckError::HttpStatus(status.as_u16()))
        }
    }

    fn describe(&self) -> String {
        format!("http {}", self.url)
    }
}

/// Healthy when the command exits with status 0.
#[derive(Debug, Clone)]
pub struct CommandHealthCheck {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandHealthCheck {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[async_trait]
impl HealthChecker for CommandHealthCheck {
    async fn check(&self) -> Result<(), HealthCheckError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(HealthCheckError::CommandFailed("empty command".to_string()));
        };

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.timeout, status).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(HealthCheckError::CommandFailed(status.to_string())),
            Ok(Err(e)) => Err(HealthCheckError::CommandFailed(e.to_string())),
            Err(_) => Err(HealthCheckError::Timeout(self.timeout)),
        }
    }

    fn describe(&self) -> String {
        format!("cmd {}", self.argv.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_check_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let check = TcpHealthCheck::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(check.check().await.is_ok());
        assert_eq!(check.describe(), format!("tcp 127.0.0.1:{port}"));
    }

    #[tokio::test]
    async fn test_tcp_check_fails_on_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let check = TcpHealthCheck::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(check.check().await.is_err());
    }

    #[tokio::test]
    async fn test_http_check_status_codes() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let down = server
            .mock("GET", "/down")
            .with_status(503)
            .create_async()
            .await;

        let healthy = HttpHealthCheck::new(format!("{}/health", server.url()), Duration::from_secs(2));
        assert!(healthy.check().await.is_ok());

        let unhealthy = HttpHealthCheck::new(format!("{}/down", server.url()), Duration::from_secs(2));
        assert_eq!(
            unhealthy.check().await,
            Err(HealthCheckError::HttpStatus(503))
        );

        ok.assert_async().await;
        down.assert_async().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_check_exit_codes() {
        let ok = CommandHealthCheck::new(vec!["true".to_string()], Duration::from_secs(2));
        assert!(ok.check().await.is_ok());

        let failing = CommandHealthCheck::new(vec!["false".to_string()], Duration::from_secs(2));
        assert!(matches!(
            failing.check().await,
            Err(HealthCheckError::CommandFailed(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_check_times_out() {
        let slow = CommandHealthCheck::new(
            vec!["sleep".to_string(), "5".to_string()],
            Duration::from_millis(50),
        );
        assert_eq!(
            slow.check().await,
            Err(HealthCheckError::Timeout(Duration::from_millis(50)))
        );
    }

    #[test]
    fn test_checker_for_probe_kinds() {
        let tcp = checker_for(
            &HealthProbe::Tcp {
                host: "localhost".to_string(),
                port: 5432,
            },
            Duration::from_secs(1),
        );
        assert_eq!(tcp.describe(), "tcp localhost:5432");

        let cmd = checker_for(
            &HealthProbe::Command {
                argv: vec!["pg_isready".to_string(), "-q".to_string()],
            },
            Duration::from_secs(1),
        );
        assert_eq!(cmd.describe(), "cmd pg_isready -q");
    }
}
