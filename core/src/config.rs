//! Endpoint configuration for the transport.
//!
//! `ClientConfig` is immutable once handed to `Transport::instance` and keys
//! the process-wide transport registry, so it derives `Eq`, `Ord` and `Hash`.
//! Timeouts are plain milliseconds to match the service's configuration files.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ureq::http::Uri;

use crate::error::{ClientError, Result};

pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_MAX_TOTAL: usize = 50;
pub const DEFAULT_MAX_PER_ROUTE: usize = 20;

/// How the transport validates server certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Verify the certificate chain against the bundled web PKI roots and
    /// check the hostname.
    #[default]
    Default,
    /// Accept any certificate chain and any hostname.
    ///
    /// This removes all protection against man-in-the-middle attacks. Only
    /// use it against internal deployments with self-signed certificates.
    Insecure,
}

/// Connection settings for one DIS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the service, e.g. `https://dis.cn-north-1.example.com`.
    pub endpoint: String,
    pub project_id: String,
    pub connection_timeout_ms: u64,
    /// Applied to both reading and writing on an established connection.
    pub socket_timeout_ms: u64,
    /// Upper bound on in-flight requests across all hosts.
    pub max_total: usize,
    /// Upper bound on in-flight requests to a single host:port.
    pub max_per_route: usize,
    pub trust_policy: TrustPolicy,
    pub retry_on_connection_failure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            project_id: String::new(),
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            max_total: DEFAULT_MAX_TOTAL,
            max_per_route: DEFAULT_MAX_PER_ROUTE,
            trust_policy: TrustPolicy::Default,
            retry_on_connection_failure: true,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: &str, project_id: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_timeouts(mut self, connection_timeout_ms: u64, socket_timeout_ms: u64) -> Self {
        self.connection_timeout_ms = connection_timeout_ms;
        self.socket_timeout_ms = socket_timeout_ms;
        self
    }

    pub fn with_pool_limits(mut self, max_total: usize, max_per_route: usize) -> Self {
        self.max_total = max_total;
        self.max_per_route = max_per_route;
        self
    }

    /// Switch certificate handling. `TrustPolicy::Insecure` disables all
    /// certificate and hostname checks.
    pub fn with_trust_policy(mut self, trust_policy: TrustPolicy) -> Self {
        self.trust_policy = trust_policy;
        self
    }

    pub fn with_retry_on_connection_failure(mut self, retry: bool) -> Self {
        self.retry_on_connection_failure = retry;
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// Reject configurations the transport cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(ClientError::Config("endpoint is empty".to_string()));
        }
        let uri: Uri = self
            .endpoint
            .parse()
            .map_err(|e| ClientError::Config(format!("endpoint {:?}: {e}", self.endpoint)))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(ClientError::Config(format!(
                    "endpoint {:?} must use http or https",
                    self.endpoint
                )))
            }
        }
        if uri.host().is_none() {
            return Err(ClientError::Config(format!("endpoint {:?} has no host", self.endpoint)));
        }
        if self.connection_timeout_ms == 0 || self.socket_timeout_ms == 0 {
            return Err(ClientError::Config("timeouts must be greater than zero".to_string()));
        }
        if self.max_total == 0 || self.max_per_route == 0 {
            return Err(ClientError::Config("pool limits must be greater than zero".to_string()));
        }
        if self.max_per_route > self.max_total {
            return Err(ClientError::Config(format!(
                "max_per_route ({}) exceeds max_total ({})",
                self.max_per_route, self.max_total
            )));
        }
        Ok(())
    }
}
