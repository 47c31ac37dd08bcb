//! In-memory mock of the DIS v2 REST API.
//!
//! Streams, consumer apps, records and checkpoints live in a single
//! `RwLock`-guarded store. Records endpoints speak JSON or Protobuf depending
//! on `Content-Type` / `Accept`. Two extra routes exist for transport tests:
//! `/v2/{project}/moved` answers with a redirect and `/v2/{project}/slow`
//! sleeps before answering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use prost::Message;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub mod proto;

const PROTOBUF: &str = "application/x-protobuf";
const MAX_RECORDS_PER_GET: usize = 1000;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRecordsEntry {
    pub data: String,
    pub partition_key: Option<String>,
    pub partition_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRecords {
    pub stream_name: String,
    pub records: Vec<PutRecordsEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStream {
    pub stream_name: String,
    pub partition_count: u32,
    #[serde(default = "default_stream_type")]
    pub stream_type: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    pub data_duration: Option<u32>,
}

fn default_stream_type() -> String {
    "COMMON".to_string()
}

fn default_data_type() -> String {
    "BLOB".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePartitionCount {
    pub stream_name: String,
    pub target_partition_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApp {
    pub app_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitCheckpoint {
    pub app_name: String,
    pub checkpoint_type: String,
    pub stream_name: String,
    pub partition_id: String,
    pub sequence_number: String,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct App {
    pub app_name: String,
    pub app_id: Uuid,
    pub create_time: i64,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredRecord {
    partition_key: Option<String>,
    data: Vec<u8>,
    timestamp: i64,
}

#[derive(Debug)]
struct Stream {
    stream_type: String,
    data_type: String,
    retention_period: u32,
    create_time: i64,
    last_modified_time: i64,
    partitions: Vec<Vec<StoredRecord>>,
}

#[derive(Debug, Default)]
struct Store {
    streams: HashMap<String, Stream>,
    apps: HashMap<String, App>,
    checkpoints: HashMap<(String, String, usize), (String, Option<String>)>,
}

/// Shared mock state. Clones share the same store and request counter.
#[derive(Debug, Clone, Default)]
pub struct MockState {
    store: Arc<RwLock<Store>>,
    requests: Arc<AtomicUsize>,
}

impl MockState {
    /// Number of HTTP requests the mock has received.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

pub fn app() -> Router {
    router(MockState::default())
}

pub fn router(state: MockState) -> Router {
    Router::new()
        .route("/v2/{project}/streams", get(list_streams).post(create_stream))
        .route(
            "/v2/{project}/streams/{stream}",
            get(describe_stream).delete(delete_stream).put(update_partition_count),
        )
        .route("/v2/{project}/streams/{stream}/files/{file}", get(file_upload_result))
        .route("/v2/{project}/records", get(get_records).post(put_records))
        .route("/v2/{project}/cursors", get(get_cursor))
        .route("/v2/{project}/checkpoints", get(get_checkpoint).post(commit_checkpoint))
        .route("/v2/{project}/apps", get(list_apps).post(create_app))
        .route("/v2/{project}/apps/{app}", get(describe_app).delete(delete_app))
        .route("/v2/{project}/moved", get(moved).post(moved))
        .route("/v2/{project}/slow", get(slow))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, MockState::default()).await
}

pub async fn serve(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

async fn count_requests(State(state): State<MockState>, request: Request, next: Next) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    debug!(method = %request.method(), uri = %request.uri(), "mock request");
    next.run(request).await
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "DIS.4301",
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "DIS.4200",
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "DIS.4307",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error_code": self.code, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub fn partition_name(index: usize) -> String {
    format!("shardId-{index:010}")
}

fn parse_partition(id: &str) -> Option<usize> {
    id.strip_prefix("shardId-").unwrap_or(id).parse().ok()
}

fn wants_protobuf(headers: &HeaderMap, name: header::HeaderName) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("protobuf"))
}

fn protobuf_response<M: Message>(message: &M) -> Response {
    ([(header::CONTENT_TYPE, PROTOBUF)], message.encode_to_vec()).into_response()
}

fn encode_cursor(stream: &str, partition: usize, offset: usize) -> String {
    STANDARD.encode(format!("{stream}\n{partition}\n{offset}"))
}

fn decode_cursor(cursor: &str) -> Option<(String, usize, usize)> {
    let raw = String::from_utf8(STANDARD.decode(cursor).ok()?).ok()?;
    let mut parts = raw.splitn(3, '\n');
    let stream = parts.next()?.to_string();
    let partition = parts.next()?.parse().ok()?;
    let offset = parts.next()?.parse().ok()?;
    Some((stream, partition, offset))
}

fn pick_partition(stream: &Stream, partition_id: Option<&str>, partition_key: Option<&str>) -> ApiResult<usize> {
    let count = stream.partitions.len();
    if let Some(id) = partition_id {
        return parse_partition(id)
            .filter(|p| *p < count)
            .ok_or_else(|| ApiError::bad_request(format!("partition {id} does not exist")));
    }
    let key = partition_key.unwrap_or_default();
    let hash = key.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    Ok(hash % count)
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListStreamsQuery {
    limit: Option<usize>,
    start_stream_name: Option<String>,
}

async fn list_streams(
    State(state): State<MockState>,
    Query(query): Query<ListStreamsQuery>,
) -> Json<serde_json::Value> {
    let store = state.store.read().await;
    let mut names: Vec<String> = store.streams.keys().cloned().collect();
    names.sort();
    let total = names.len();
    let start = query.start_stream_name.unwrap_or_default();
    let after: Vec<String> = names.into_iter().filter(|n| *n > start).collect();
    let limit = query.limit.unwrap_or(100);
    let has_more = after.len() > limit;
    let page: Vec<String> = after.into_iter().take(limit).collect();
    Json(serde_json::json!({
        "total_number": total,
        "stream_names": page,
        "has_more_streams": has_more,
    }))
}

async fn create_stream(
    State(state): State<MockState>,
    Json(input): Json<CreateStream>,
) -> ApiResult<StatusCode> {
    if input.partition_count == 0 {
        return Err(ApiError::bad_request("partition_count must be positive"));
    }
    let mut store = state.store.write().await;
    if store.streams.contains_key(&input.stream_name) {
        return Err(ApiError::conflict("stream already exists"));
    }
    let now = now_millis();
    store.streams.insert(
        input.stream_name,
        Stream {
            stream_type: input.stream_type,
            data_type: input.data_type,
            retention_period: input.data_duration.unwrap_or(24),
            create_time: now,
            last_modified_time: now,
            partitions: vec![Vec::new(); input.partition_count as usize],
        },
    );
    Ok(StatusCode::CREATED)
}

async fn describe_stream(
    State(state): State<MockState>,
    Path((_project, name)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = state.store.read().await;
    let stream = store.streams.get(&name).ok_or_else(|| ApiError::not_found("stream not found"))?;
    let partitions: Vec<serde_json::Value> = stream
        .partitions
        .iter()
        .enumerate()
        .map(|(i, records)| {
            serde_json::json!({
                "partition_id": partition_name(i),
                "status": "ACTIVE",
                "sequence_number_range": format!("[0 : {}]", records.len()),
            })
        })
        .collect();
    Ok(Json(serde_json::json!({
        "stream_name": name,
        "create_time": stream.create_time,
        "last_modified_time": stream.last_modified_time,
        "retention_period": stream.retention_period,
        "status": "RUNNING",
        "stream_type": stream.stream_type,
        "data_type": stream.data_type,
        "partitions": partitions,
        "has_more_partitions": false,
    })))
}

async fn delete_stream(
    State(state): State<MockState>,
    Path((_project, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let mut store = state.store.write().await;
    store
        .streams
        .remove(&name)
        .ok_or_else(|| ApiError::not_found("stream not found"))?;
    store.checkpoints.retain(|(_, stream, _), _| *stream != name);
    Ok(StatusCode::NO_CONTENT)
}

async fn update_partition_count(
    State(state): State<MockState>,
    Path((_project, name)): Path<(String, String)>,
    Json(input): Json<UpdatePartitionCount>,
) -> ApiResult<Json<serde_json::Value>> {
    if input.stream_name != name {
        return Err(ApiError::bad_request("stream_name does not match path"));
    }
    let mut store = state.store.write().await;
    let stream = store
        .streams
        .get_mut(&name)
        .ok_or_else(|| ApiError::not_found("stream not found"))?;
    let target = input.target_partition_count as usize;
    if target == 0 {
        return Err(ApiError::bad_request("target_partition_count must be positive"));
    }
    stream.partitions.resize(target, Vec::new());
    stream.last_modified_time = now_millis();
    Ok(Json(serde_json::json!({})))
}

async fn file_upload_result(
    State(state): State<MockState>,
    Path((_project, stream, file)): Path<(String, String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = state.store.read().await;
    if !store.streams.contains_key(&stream) {
        return Err(ApiError::not_found("stream not found"));
    }
    Ok(Json(serde_json::json!({
        "stream_name": stream,
        "file_name": file,
        "state": "Uploaded",
    })))
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

struct IncomingRecord {
    partition_id: Option<String>,
    partition_key: Option<String>,
    data: Vec<u8>,
}

async fn put_records(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> ApiResult<Response> {
    let protobuf = wants_protobuf(&headers, header::CONTENT_TYPE);
    let (stream_name, incoming) = if protobuf {
        let req = proto::PutRecordsRequest::decode(body)
            .map_err(|e| ApiError::bad_request(format!("invalid protobuf: {e}")))?;
        let records = req
            .records
            .into_iter()
            .map(|r| IncomingRecord {
                partition_id: r.partition_id,
                partition_key: r.partition_key,
                data: r.data,
            })
            .collect::<Vec<_>>();
        (req.stream_name, records)
    } else {
        let req: PutRecords = serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid json: {e}")))?;
        let mut records = Vec::with_capacity(req.records.len());
        for r in req.records {
            let data = STANDARD
                .decode(&r.data)
                .map_err(|e| ApiError::bad_request(format!("invalid base64 data: {e}")))?;
            records.push(IncomingRecord {
                partition_id: r.partition_id,
                partition_key: r.partition_key,
                data,
            });
        }
        (req.stream_name, records)
    };

    let mut store = state.store.write().await;
    let stream = store
        .streams
        .get_mut(&stream_name)
        .ok_or_else(|| ApiError::not_found("stream not found"))?;
    let mut results = Vec::with_capacity(incoming.len());
    let mut failed = 0;
    for record in incoming {
        match pick_partition(stream, record.partition_id.as_deref(), record.partition_key.as_deref()) {
            Ok(p) => {
                let partition = &mut stream.partitions[p];
                partition.push(StoredRecord {
                    partition_key: record.partition_key,
                    data: record.data,
                    timestamp: now_millis(),
                });
                results.push(proto::PutRecordsResultEntry {
                    partition_id: Some(partition_name(p)),
                    sequence_number: Some((partition.len() - 1).to_string()),
                    ..Default::default()
                });
            }
            Err(e) => {
                failed += 1;
                results.push(proto::PutRecordsResultEntry {
                    error_code: Some(e.code.to_string()),
                    error_message: Some(e.message),
                    ..Default::default()
                });
            }
        }
    }
    let result = proto::PutRecordsResult {
        failed_record_count: failed,
        records: results,
    };
    if protobuf {
        Ok(protobuf_response(&result))
    } else {
        Ok(Json(result).into_response())
    }
}

#[derive(Debug, Deserialize)]
struct GetRecordsQuery {
    #[serde(rename = "partition-cursor")]
    partition_cursor: String,
    limit: Option<usize>,
}

async fn get_records(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<GetRecordsQuery>,
) -> ApiResult<Response> {
    let (stream_name, partition, offset) =
        decode_cursor(&query.partition_cursor).ok_or_else(|| ApiError::bad_request("invalid partition cursor"))?;
    let store = state.store.read().await;
    let stream = store
        .streams
        .get(&stream_name)
        .ok_or_else(|| ApiError::not_found("stream not found"))?;
    let records = stream
        .partitions
        .get(partition)
        .ok_or_else(|| ApiError::bad_request("partition does not exist"))?;
    let limit = query.limit.unwrap_or(MAX_RECORDS_PER_GET).min(MAX_RECORDS_PER_GET);
    let page: Vec<proto::Record> = records
        .iter()
        .enumerate()
        .skip(offset)
        .take(limit)
        .map(|(seq, r)| proto::Record {
            partition_key: r.partition_key.clone(),
            sequence_number: seq.to_string(),
            data: r.data.clone(),
            timestamp: Some(r.timestamp),
            timestamp_type: Some("CreateTime".to_string()),
        })
        .collect();
    let next = offset + page.len();
    let result = proto::GetRecordsResult {
        records: page,
        next_partition_cursor: Some(encode_cursor(&stream_name, partition, next)),
    };
    if wants_protobuf(&headers, header::ACCEPT) {
        Ok(protobuf_response(&result))
    } else {
        Ok(Json(result).into_response())
    }
}

#[derive(Debug, Deserialize)]
struct CursorQuery {
    #[serde(rename = "stream-name")]
    stream_name: String,
    #[serde(rename = "partition-id")]
    partition_id: String,
    #[serde(rename = "cursor-type", default = "default_cursor_type")]
    cursor_type: String,
    #[serde(rename = "starting-sequence-number")]
    starting_sequence_number: Option<usize>,
    timestamp: Option<i64>,
}

fn default_cursor_type() -> String {
    "AT_SEQUENCE_NUMBER".to_string()
}

async fn get_cursor(
    State(state): State<MockState>,
    Query(query): Query<CursorQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = state.store.read().await;
    let stream = store
        .streams
        .get(&query.stream_name)
        .ok_or_else(|| ApiError::not_found("stream not found"))?;
    let partition = parse_partition(&query.partition_id)
        .filter(|p| *p < stream.partitions.len())
        .ok_or_else(|| ApiError::bad_request("partition does not exist"))?;
    let records = &stream.partitions[partition];
    let seq = query.starting_sequence_number;
    let offset = match query.cursor_type.as_str() {
        "TRIM_HORIZON" => 0,
        "LATEST" => records.len(),
        "AT_SEQUENCE_NUMBER" => seq.ok_or_else(|| ApiError::bad_request("starting-sequence-number required"))?,
        "AFTER_SEQUENCE_NUMBER" => {
            seq.ok_or_else(|| ApiError::bad_request("starting-sequence-number required"))? + 1
        }
        "AT_TIMESTAMP" => {
            let ts = query
                .timestamp
                .ok_or_else(|| ApiError::bad_request("timestamp required"))?;
            records
                .iter()
                .position(|r| r.timestamp >= ts)
                .unwrap_or(records.len())
        }
        other => return Err(ApiError::bad_request(format!("unknown cursor-type {other}"))),
    };
    Ok(Json(serde_json::json!({
        "partition_cursor": encode_cursor(&query.stream_name, partition, offset),
    })))
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

async fn commit_checkpoint(
    State(state): State<MockState>,
    Json(input): Json<CommitCheckpoint>,
) -> ApiResult<StatusCode> {
    if input.checkpoint_type != "LAST_READ" {
        return Err(ApiError::bad_request("checkpoint_type must be LAST_READ"));
    }
    let mut store = state.store.write().await;
    if !store.apps.contains_key(&input.app_name) {
        return Err(ApiError::not_found("app not found"));
    }
    let partition = {
        let stream = store
            .streams
            .get(&input.stream_name)
            .ok_or_else(|| ApiError::not_found("stream not found"))?;
        parse_partition(&input.partition_id)
            .filter(|p| *p < stream.partitions.len())
            .ok_or_else(|| ApiError::bad_request("partition does not exist"))?
    };
    store.checkpoints.insert(
        (input.app_name, input.stream_name, partition),
        (input.sequence_number, input.metadata),
    );
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
struct CheckpointQuery {
    app_name: String,
    stream_name: String,
    partition_id: String,
    #[allow(dead_code)]
    checkpoint_type: Option<String>,
}

async fn get_checkpoint(
    State(state): State<MockState>,
    Query(query): Query<CheckpointQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let partition =
        parse_partition(&query.partition_id).ok_or_else(|| ApiError::bad_request("invalid partition_id"))?;
    let store = state.store.read().await;
    let entry = store
        .checkpoints
        .get(&(query.app_name, query.stream_name, partition));
    Ok(Json(match entry {
        Some((seq, metadata)) => serde_json::json!({ "sequence_number": seq, "metadata": metadata }),
        None => serde_json::json!({ "sequence_number": "-1" }),
    }))
}

// ---------------------------------------------------------------------------
// Apps
// ---------------------------------------------------------------------------

async fn list_apps(State(state): State<MockState>) -> Json<serde_json::Value> {
    let store = state.store.read().await;
    let mut apps: Vec<&App> = store.apps.values().collect();
    apps.sort_by(|a, b| a.app_name.cmp(&b.app_name));
    let total = apps.len();
    Json(serde_json::json!({
        "apps": apps,
        "has_more_app": false,
        "total_number": total,
    }))
}

async fn create_app(State(state): State<MockState>, Json(input): Json<CreateApp>) -> ApiResult<StatusCode> {
    let mut store = state.store.write().await;
    if store.apps.contains_key(&input.app_name) {
        return Err(ApiError::conflict("app already exists"));
    }
    let app = App {
        app_name: input.app_name.clone(),
        app_id: Uuid::new_v4(),
        create_time: now_millis(),
    };
    store.apps.insert(input.app_name, app);
    Ok(StatusCode::CREATED)
}

async fn describe_app(
    State(state): State<MockState>,
    Path((_project, name)): Path<(String, String)>,
) -> ApiResult<Json<App>> {
    let store = state.store.read().await;
    store
        .apps
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("app not found"))
}

async fn delete_app(
    State(state): State<MockState>,
    Path((_project, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let mut store = state.store.write().await;
    store
        .apps
        .remove(&name)
        .ok_or_else(|| ApiError::not_found("app not found"))?;
    store.checkpoints.retain(|(app, _, _), _| *app != name);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Transport test routes
// ---------------------------------------------------------------------------

async fn moved(Path(project): Path<String>) -> Response {
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, format!("/v2/{project}/streams"))],
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: u64,
}

async fn slow(Query(query): Query<SlowQuery>) -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_millis(query.ms)).await;
    Json(serde_json::json!({ "total_number": 0, "stream_names": [], "has_more_streams": false }))
}
