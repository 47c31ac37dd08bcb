//! Process-wide HTTP transport.
//!
//! # Design
//! One `Transport` exists per distinct `ClientConfig`. `Transport::instance`
//! looks the configuration up in a mutex-guarded registry and builds the
//! transport under that lock on first use, so concurrent first calls agree on
//! a single instance and a single connection pool. `close` and `close_all`
//! drop registry entries; the pooled connections go away with the last `Arc`.
//!
//! Each transport owns a `ureq::Agent` configured with the endpoint timeouts,
//! redirects disabled, idle-pool sizes taken from the pool limits and the TLS
//! trust policy. A `RequestGate` caps in-flight requests at the same limits.
//! Calls block the current thread.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn, Level};
use ureq::http::{self, Response};
use ureq::tls::TlsConfig;
use ureq::{Agent, Body};

use crate::config::{ClientConfig, TrustPolicy};
use crate::error::{ClientError, Result};
use crate::gate::{route_of, RequestGate};
use crate::http::{HttpRequest, HttpResponse};

/// Largest response body the transport will buffer.
pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

static REGISTRY: Mutex<BTreeMap<ClientConfig, Arc<Transport>>> = Mutex::new(BTreeMap::new());

/// A configured, pooled HTTP client shared by every call for one endpoint.
pub struct Transport {
    config: ClientConfig,
    agent: Agent,
    gate: RequestGate,
}

impl Transport {
    /// Return the transport registered for `config`, building it on first use.
    pub fn instance(config: &ClientConfig) -> Result<Arc<Transport>> {
        config.validate()?;
        let mut registry = registry();
        if let Some(existing) = registry.get(config) {
            return Ok(Arc::clone(existing));
        }
        let transport = Arc::new(Transport::build(config.clone()));
        registry.insert(config.clone(), Arc::clone(&transport));
        info!(
            endpoint = %config.endpoint,
            max_total = config.max_total,
            max_per_route = config.max_per_route,
            "transport created"
        );
        Ok(transport)
    }

    /// Remove the transport for `config` from the registry.
    ///
    /// Outstanding `Arc`s stay usable; the pool is released once they drop.
    /// A later `instance` call with the same configuration builds a new one.
    pub fn close(config: &ClientConfig) -> Option<Arc<Transport>> {
        let removed = registry().remove(config);
        if removed.is_some() {
            debug!(endpoint = %config.endpoint, "transport closed");
        }
        removed
    }

    /// Remove every registered transport.
    pub fn close_all() {
        let mut registry = registry();
        let count = registry.len();
        registry.clear();
        debug!(count, "all transports closed");
    }

    pub fn is_registered(config: &ClientConfig) -> bool {
        registry().contains_key(config)
    }

    fn build(config: ClientConfig) -> Self {
        let socket_timeout = Some(config.socket_timeout());
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .timeout_connect(Some(config.connection_timeout()))
            .timeout_send_request(socket_timeout)
            .timeout_send_body(socket_timeout)
            .timeout_recv_response(socket_timeout)
            .timeout_recv_body(socket_timeout)
            .max_idle_connections(config.max_total)
            .max_idle_connections_per_host(config.max_per_route)
            .tls_config(tls_config(config.trust_policy))
            .build()
            .new_agent();
        if config.trust_policy == TrustPolicy::Insecure {
            warn!(
                endpoint = %config.endpoint,
                "TLS certificate and hostname verification disabled"
            );
        }
        let gate = RequestGate::new(config.max_total, config.max_per_route);
        Self { config, agent, gate }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Run one exchange, blocking until it completes.
    ///
    /// 2xx responses are returned with their full body. Any other status
    /// becomes `ClientError::Status` carrying the server's error body, with
    /// invalid UTF-8 replaced; if that body cannot be read it is reported as
    /// empty.
    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let _permit = self.gate.acquire(&route_of(&request.url));
        log_request(request);

        let mut response = match self.send(request) {
            Err(ClientError::Transport { source })
                if self.config.retry_on_connection_failure && is_connection_failure(&source) =>
            {
                debug!(url = %request.url, error = %source, "connection failed, retrying once");
                self.send(request)?
            }
            other => other?,
        };

        let status = response.status();
        let headers = response_headers(&response);
        if !status.is_success() {
            let body = match response.body_mut().read_to_vec() {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    debug!(status = status.as_u16(), error = %e, "error body unreadable");
                    String::new()
                }
            };
            debug!(status = status.as_u16(), body = %body, "<- error response");
            return Err(ClientError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_vec()?;
        log_response(status.as_u16(), &body);
        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }

    fn send(&self, request: &HttpRequest) -> Result<Response<Body>> {
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = match &request.body {
            Some(body) => {
                let req = builder.body(body.as_slice()).map_err(invalid_request)?;
                self.agent.run(req)?
            }
            None => {
                let req = builder.body(()).map_err(invalid_request)?;
                self.agent.run(req)?
            }
        };
        Ok(response)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

fn registry() -> MutexGuard<'static, BTreeMap<ClientConfig, Arc<Transport>>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// TLS settings for a trust policy.
pub fn tls_config(policy: TrustPolicy) -> TlsConfig {
    match policy {
        TrustPolicy::Default => TlsConfig::builder().build(),
        TrustPolicy::Insecure => TlsConfig::builder().disable_verification(true).build(),
    }
}

/// Failures worth a second attempt: the peer refused or dropped the
/// connection, typically a stale pooled socket. Timeouts, DNS and TLS
/// failures are not retried.
pub fn is_connection_failure(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::ConnectionFailed => true,
        ureq::Error::Io(e) => matches!(
            e.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

fn invalid_request(err: http::Error) -> ClientError {
    ClientError::InvalidRequest(err.to_string())
}

fn response_headers(response: &Response<Body>) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn log_request(request: &HttpRequest) {
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    let headers: Vec<String> = request
        .headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case("authorization") {
                format!("{name}: <redacted>")
            } else {
                format!("{name}: {value}")
            }
        })
        .collect();
    debug!(
        method = %request.method,
        url = %request.url,
        headers = ?headers,
        body_len = request.body.as_ref().map_or(0, Vec::len),
        "-> request"
    );
}

fn log_response(status: u16, body: &[u8]) {
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    debug!(
        status,
        body_len = body.len(),
        body = %String::from_utf8_lossy(body),
        "<- response"
    );
}
