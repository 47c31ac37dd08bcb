//! JSON request and result types for the DIS REST API.
//!
//! # Design
//! These mirror the service's snake_case JSON schema. Record payloads travel
//! as base64 strings on the wire and are exposed as raw bytes here. Result
//! types are lenient: missing fields take defaults (`#[serde(default)]`),
//! unknown fields are ignored, and stream or data type values this client
//! does not know decode as `Unknown`. Record data that is not valid base64
//! still fails the decode.
//!
//! The mock server defines its own copies of these shapes; the integration
//! tests catch drift between the two.

use serde::{Deserialize, Serialize};

/// Serde adapter for `Vec<u8>` fields carried as standard base64 strings.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRecordsRequestEntry {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_hash_key: Option<String>,
}

impl PutRecordsRequestEntry {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_partition_key(mut self, key: &str) -> Self {
        self.partition_key = Some(key.to_string());
        self
    }

    pub fn with_partition_id(mut self, id: &str) -> Self {
        self.partition_id = Some(id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRecordsRequest {
    pub stream_name: String,
    pub records: Vec<PutRecordsRequestEntry>,
}

/// Outcome for one record of a put. Failed entries carry `error_code`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PutRecordsResultEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PutRecordsResult {
    pub failed_record_count: u32,
    pub records: Vec<PutRecordsResultEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    pub sequence_number: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetRecordsResult {
    pub records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_partition_cursor: Option<String>,
}

/// Where a partition cursor starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CursorType {
    AtSequenceNumber,
    AfterSequenceNumber,
    TrimHorizon,
    Latest,
    AtTimestamp,
}

impl CursorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorType::AtSequenceNumber => "AT_SEQUENCE_NUMBER",
            CursorType::AfterSequenceNumber => "AFTER_SEQUENCE_NUMBER",
            CursorType::TrimHorizon => "TRIM_HORIZON",
            CursorType::Latest => "LATEST",
            CursorType::AtTimestamp => "AT_TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetPartitionCursorResult {
    pub partition_cursor: String,
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointType {
    #[default]
    LastRead,
}

impl CheckpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointType::LastRead => "LAST_READ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCheckpointRequest {
    pub app_name: String,
    pub checkpoint_type: CheckpointType,
    pub stream_name: String,
    pub partition_id: String,
    pub sequence_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCheckpointResult {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetCheckpointResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    #[default]
    Common,
    Advanced,
    /// A stream type this client does not know yet.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    #[default]
    Blob,
    Json,
    Csv,
    /// A data type this client does not know yet.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStreamRequest {
    pub stream_name: String,
    pub partition_count: u32,
    #[serde(default)]
    pub stream_type: StreamType,
    #[serde(default)]
    pub data_type: DataType,
    /// Retention in hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_duration: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStreamResult {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionResult {
    pub partition_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number_range: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeStreamResult {
    pub stream_name: String,
    pub create_time: i64,
    pub last_modified_time: i64,
    pub retention_period: u32,
    pub status: String,
    pub stream_type: StreamType,
    pub data_type: DataType,
    pub partitions: Vec<PartitionResult>,
    pub has_more_partitions: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStreamResult {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListStreamsResult {
    pub total_number: u32,
    pub stream_names: Vec<String>,
    pub has_more_streams: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePartitionCountRequest {
    pub stream_name: String,
    pub target_partition_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePartitionCountResult {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileUploadResult {
    pub stream_name: String,
    pub file_name: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliver_data_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Consumer apps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAppRequest {
    pub app_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAppResult {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeAppResult {
    pub app_name: String,
    pub app_id: String,
    pub create_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListAppsResult {
    pub apps: Vec<DescribeAppResult>,
    pub has_more_app: bool,
    pub total_number: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAppResult {}
