//! Protobuf messages for the binary record endpoints.
//!
//! Hand-written prost messages; no build step. They also derive serde so the
//! dynamic dispatch path can hand them back as JSON, with `data` as base64.

use serde::{Deserialize, Serialize};

use crate::types::base64_bytes;

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct PutRecordsRequestEntry {
    #[prost(string, optional, tag = "1")]
    pub partition_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub explicit_hash_key: Option<String>,
    #[prost(bytes = "vec", tag = "3")]
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[prost(string, optional, tag = "4")]
    pub partition_key: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct PutRecordsRequest {
    #[prost(string, tag = "1")]
    pub stream_name: String,
    #[prost(message, repeated, tag = "2")]
    pub records: Vec<PutRecordsRequestEntry>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct PutRecordsResultEntry {
    #[prost(string, optional, tag = "1")]
    pub partition_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub sequence_number: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub error_code: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub error_message: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct PutRecordsResult {
    #[prost(int32, tag = "1")]
    pub failed_record_count: i32,
    #[prost(message, repeated, tag = "2")]
    pub records: Vec<PutRecordsResultEntry>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct Record {
    #[prost(string, optional, tag = "1")]
    pub partition_key: Option<String>,
    #[prost(string, tag = "2")]
    pub sequence_number: String,
    #[prost(bytes = "vec", tag = "3")]
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[prost(int64, optional, tag = "4")]
    pub timestamp: Option<i64>,
    #[prost(string, optional, tag = "5")]
    pub timestamp_type: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct GetRecordsResult {
    #[prost(message, repeated, tag = "1")]
    pub records: Vec<Record>,
    #[prost(string, optional, tag = "2")]
    pub next_partition_cursor: Option<String>,
}
