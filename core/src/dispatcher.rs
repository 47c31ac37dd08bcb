//! Operation bindings and the call dispatcher.
//!
//! # Design
//! Every call the service supports is one `Operation`. Its `Binding` fixes
//! the HTTP verb, whether a body is sent and which codec decodes the reply.
//! The set is closed: adding an operation means adding a variant and a row
//! in `Operation::binding`.
//!
//! Typed calls pick the operation from the result type through
//! `OperationResult::OPERATION`, so the codec follows from the type's
//! encoding family. The dynamic path resolves an operation by name and
//! rejects unknown names before touching the network.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use prost::Message;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::http::{HttpMethod, HttpRequest};
use crate::payload::{encode_body, Payload};
use crate::proto;
use crate::transport::Transport;
use crate::types;

/// Wire encoding of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    Protobuf,
}

impl Codec {
    pub fn content_type(&self) -> &'static str {
        match self {
            Codec::Json => "application/json",
            Codec::Protobuf => "application/x-protobuf",
        }
    }
}

/// Verb, body presence and codec for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub method: HttpMethod,
    pub sends_body: bool,
    pub codec: Codec,
}

const fn bind(method: HttpMethod, sends_body: bool, codec: Codec) -> Binding {
    Binding {
        method,
        sends_body,
        codec,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PutRecords,
    GetRecords,
    PutRecordsProto,
    GetRecordsProto,
    GetPartitionCursor,
    CommitCheckpoint,
    GetCheckpoint,
    DescribeStream,
    CreateStream,
    DeleteStream,
    ListStreams,
    CreateApp,
    ListApps,
    DeleteApp,
    DescribeApp,
    UpdatePartitionCount,
    GetFileUploadResult,
}

impl Operation {
    pub const ALL: [Operation; 17] = [
        Operation::PutRecords,
        Operation::GetRecords,
        Operation::PutRecordsProto,
        Operation::GetRecordsProto,
        Operation::GetPartitionCursor,
        Operation::CommitCheckpoint,
        Operation::GetCheckpoint,
        Operation::DescribeStream,
        Operation::CreateStream,
        Operation::DeleteStream,
        Operation::ListStreams,
        Operation::CreateApp,
        Operation::ListApps,
        Operation::DeleteApp,
        Operation::DescribeApp,
        Operation::UpdatePartitionCount,
        Operation::GetFileUploadResult,
    ];

    pub const fn binding(&self) -> Binding {
        use Codec::{Json, Protobuf};
        use HttpMethod::{Delete, Get, Post, Put};
        match self {
            Operation::PutRecords => bind(Post, true, Json),
            Operation::GetRecords => bind(Get, false, Json),
            Operation::PutRecordsProto => bind(Post, true, Protobuf),
            Operation::GetRecordsProto => bind(Get, false, Protobuf),
            Operation::GetPartitionCursor => bind(Get, false, Json),
            Operation::CommitCheckpoint => bind(Post, true, Json),
            Operation::GetCheckpoint => bind(Get, false, Json),
            Operation::DescribeStream => bind(Get, false, Json),
            Operation::CreateStream => bind(Post, true, Json),
            Operation::DeleteStream => bind(Delete, false, Json),
            Operation::ListStreams => bind(Get, false, Json),
            Operation::CreateApp => bind(Post, true, Json),
            Operation::ListApps => bind(Get, false, Json),
            Operation::DeleteApp => bind(Delete, false, Json),
            Operation::DescribeApp => bind(Get, false, Json),
            Operation::UpdatePartitionCount => bind(Put, true, Json),
            Operation::GetFileUploadResult => bind(Get, false, Json),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::PutRecords => "putRecords",
            Operation::GetRecords => "getRecords",
            Operation::PutRecordsProto => "putRecordsProto",
            Operation::GetRecordsProto => "getRecordsProto",
            Operation::GetPartitionCursor => "getPartitionCursor",
            Operation::CommitCheckpoint => "commitCheckpoint",
            Operation::GetCheckpoint => "getCheckpoint",
            Operation::DescribeStream => "describeStream",
            Operation::CreateStream => "createStream",
            Operation::DeleteStream => "deleteStream",
            Operation::ListStreams => "listStreams",
            Operation::CreateApp => "createApp",
            Operation::ListApps => "listApps",
            Operation::DeleteApp => "deleteApp",
            Operation::DescribeApp => "describeApp",
            Operation::UpdatePartitionCount => "updatePartitionCount",
            Operation::GetFileUploadResult => "getFileUploadResult",
        }
    }

    /// Decode a response body for this operation into JSON.
    ///
    /// Protobuf replies are decoded into their message type first.
    pub fn decode_dynamic(&self, body: &[u8]) -> Result<serde_json::Value> {
        match self {
            Operation::PutRecordsProto => to_json(&decode_protobuf::<proto::PutRecordsResult>(body)?),
            Operation::GetRecordsProto => to_json(&decode_protobuf::<proto::GetRecordsResult>(body)?),
            _ => decode_json(body),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| ClientError::Unimplemented(s.to_string()))
    }
}

/// A result type bound to exactly one operation.
///
/// The implementation decides the codec: serde types decode JSON, prost
/// messages decode Protobuf.
pub trait OperationResult: Sized {
    const OPERATION: Operation;

    fn decode(body: &[u8]) -> Result<Self>;
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ClientError::Deserialization(e.to_string()))
}

fn decode_protobuf<T: Message + Default>(body: &[u8]) -> Result<T> {
    T::decode(body).map_err(|e| ClientError::Deserialization(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ClientError::Serialization(e.to_string()))
}

macro_rules! json_result {
    ($($ty:ty => $op:ident),* $(,)?) => {
        $(
            impl OperationResult for $ty {
                const OPERATION: Operation = Operation::$op;

                fn decode(body: &[u8]) -> Result<Self> {
                    decode_json(body)
                }
            }
        )*
    };
}

macro_rules! protobuf_result {
    ($($ty:ty => $op:ident),* $(,)?) => {
        $(
            impl OperationResult for $ty {
                const OPERATION: Operation = Operation::$op;

                fn decode(body: &[u8]) -> Result<Self> {
                    decode_protobuf(body)
                }
            }
        )*
    };
}

json_result! {
    types::PutRecordsResult => PutRecords,
    types::GetRecordsResult => GetRecords,
    types::GetPartitionCursorResult => GetPartitionCursor,
    types::CommitCheckpointResult => CommitCheckpoint,
    types::GetCheckpointResult => GetCheckpoint,
    types::DescribeStreamResult => DescribeStream,
    types::CreateStreamResult => CreateStream,
    types::DeleteStreamResult => DeleteStream,
    types::ListStreamsResult => ListStreams,
    types::CreateAppResult => CreateApp,
    types::ListAppsResult => ListApps,
    types::DeleteAppResult => DeleteApp,
    types::DescribeAppResult => DescribeApp,
    types::UpdatePartitionCountResult => UpdatePartitionCount,
    types::FileUploadResult => GetFileUploadResult,
}

protobuf_result! {
    proto::PutRecordsResult => PutRecordsProto,
    proto::GetRecordsResult => GetRecordsProto,
}

/// Build the request for `operation` without sending it.
///
/// The binding's verb wins over `method`. A body is attached only when the
/// binding sends one; it is empty when `payload` is `None`. `Content-Type`
/// and `Accept` default to the binding's codec unless the caller set them.
pub fn build_request(
    operation: Operation,
    url: &str,
    method: HttpMethod,
    headers: &[(String, String)],
    payload: Option<&Payload>,
) -> HttpRequest {
    let binding = operation.binding();
    if method != binding.method {
        warn!(
            operation = %operation,
            requested = %method,
            bound = %binding.method,
            "HTTP method overridden by operation binding"
        );
    }

    let mut request = HttpRequest {
        method: binding.method,
        url: url.to_string(),
        headers: headers.to_vec(),
        body: None,
    };
    if request.header("accept").is_none() {
        request
            .headers
            .push(("Accept".to_string(), binding.codec.content_type().to_string()));
    }
    if binding.sends_body {
        if request.header("content-type").is_none() {
            request
                .headers
                .push(("Content-Type".to_string(), binding.codec.content_type().to_string()));
        }
        request.body = Some(encode_body(payload));
    } else if payload.is_some() {
        debug!(operation = %operation, "payload ignored for bodiless operation");
    }
    request
}

/// Routes operations to the transport and decodes their results.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    transport: Arc<Transport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Run the operation bound to `R` and decode its result.
    ///
    /// Returns `Ok(None)` when the server answers 2xx with an empty body.
    pub fn exchange<R: OperationResult>(
        &self,
        url: &str,
        method: HttpMethod,
        headers: &[(String, String)],
        payload: Option<&Payload>,
    ) -> Result<Option<R>> {
        let body = self.send(R::OPERATION, url, method, headers, payload)?;
        if body.is_empty() {
            return Ok(None);
        }
        R::decode(&body).map(Some)
    }

    /// Run an operation named at runtime, returning its result as JSON.
    ///
    /// Names outside the binding table fail with `ClientError::Unimplemented`
    /// and nothing is sent.
    pub fn exchange_dynamic(
        &self,
        operation: &str,
        url: &str,
        method: HttpMethod,
        headers: &[(String, String)],
        payload: Option<&Payload>,
    ) -> Result<Option<serde_json::Value>> {
        let operation: Operation = operation.parse()?;
        let body = self.send(operation, url, method, headers, payload)?;
        if body.is_empty() {
            return Ok(None);
        }
        operation.decode_dynamic(&body).map(Some)
    }

    fn send(
        &self,
        operation: Operation,
        url: &str,
        method: HttpMethod,
        headers: &[(String, String)],
        payload: Option<&Payload>,
    ) -> Result<Vec<u8>> {
        let request = build_request(operation, url, method, headers, payload);
        debug!(operation = %operation, url = %url, "dispatching");
        Ok(self.transport.execute(&request)?.body)
    }
}
