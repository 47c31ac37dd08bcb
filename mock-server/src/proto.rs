//! Protobuf record messages as the service defines them.

use serde::{Deserialize, Serialize};

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PutRecordsRequestEntry {
    #[prost(string, optional, tag = "1")]
    pub partition_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub explicit_hash_key: Option<String>,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
    #[prost(string, optional, tag = "4")]
    pub partition_key: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
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
