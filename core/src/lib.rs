//! Blocking transport core for the DIS data-ingestion REST API.
//!
//! # Overview
//! Maps each service operation to its HTTP verb, body shape and codec (JSON
//! or Protobuf), runs it over a shared, pooled HTTP client and decodes the
//! reply into a typed result.
//!
//! # Design
//! - `Transport` is one configured `ureq` agent per distinct `ClientConfig`,
//!   held in a process-wide registry with explicit `close`.
//! - `Dispatcher` owns the closed binding table (`Operation`) and the body
//!   encoding rules (`Payload`).
//! - Signing headers are supplied by the caller; this crate never computes
//!   credentials.
//! - All calls block the current thread. Logging goes through `tracing`;
//!   installing a subscriber is left to the application.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod http;
pub mod payload;
pub mod proto;
pub mod routes;
pub mod transport;
pub mod types;

pub use client::DisClient;
pub use config::{ClientConfig, TrustPolicy};
pub use dispatcher::{build_request, Binding, Codec, Dispatcher, Operation, OperationResult};
pub use error::{ClientError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use payload::{encode_body, Payload};
pub use routes::{CursorStart, Routes};
pub use transport::Transport;
