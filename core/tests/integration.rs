//! Dispatcher and transport against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port from its own tokio
//! runtime thread, then drives the blocking `DisClient` over real HTTP.
//! Every test uses its own project id so the registered transports stay
//! independent when tests run in parallel.

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use dis_core::types::{
    CheckpointType, CommitCheckpointRequest, CommitCheckpointResult, CreateAppRequest, CreateAppResult,
    CreateStreamRequest, CreateStreamResult, CursorType, DataType, DeleteAppResult, DeleteStreamResult,
    DescribeAppResult, DescribeStreamResult, FileUploadResult, GetCheckpointResult, GetPartitionCursorResult,
    GetRecordsResult, ListAppsResult, ListStreamsResult, PutRecordsRequest, PutRecordsRequestEntry,
    PutRecordsResult, StreamType, UpdatePartitionCountRequest, UpdatePartitionCountResult,
};
use dis_core::{proto, ClientConfig, ClientError, CursorStart, DisClient, HttpMethod, Payload, Transport};
use mock_server::MockState;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dis_core=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Start the mock server on a random port and return its address.
fn start_server() -> (SocketAddr, MockState) {
    init_tracing();
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let state = MockState::default();
    let server_state = state.clone();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::serve(listener, server_state).await
        })
        .unwrap();
    });

    (addr, state)
}

fn client(addr: SocketAddr, project: &str) -> DisClient {
    DisClient::new(ClientConfig::new(&format!("http://{addr}"), project)).unwrap()
}

fn headers() -> Vec<(String, String)> {
    vec![("X-Sdk-Date".to_string(), "20261019T000000Z".to_string())]
}

fn create_stream(client: &DisClient, name: &str, partitions: u32) {
    let request = CreateStreamRequest {
        stream_name: name.to_string(),
        partition_count: partitions,
        stream_type: StreamType::Common,
        data_type: DataType::Blob,
        data_duration: Some(24),
    };
    let created: Option<CreateStreamResult> = client
        .dispatcher()
        .exchange(
            &client.routes().streams(),
            HttpMethod::Post,
            &headers(),
            Some(&Payload::json(&request).unwrap()),
        )
        .unwrap();
    assert!(created.is_none(), "201 with empty body decodes to None");
}

fn trim_horizon(client: &DisClient, stream: &str, partition: &str) -> String {
    let cursor: GetPartitionCursorResult = client
        .dispatcher()
        .exchange(
            &client.routes().cursors(stream, partition, CursorType::TrimHorizon, None),
            HttpMethod::Get,
            &headers(),
            None,
        )
        .unwrap()
        .unwrap();
    cursor.partition_cursor
}

#[test]
fn stream_lifecycle() {
    let (addr, _) = start_server();
    let client = client(addr, "stream-lifecycle");
    let d = client.dispatcher();
    let r = client.routes();

    // Step 1: empty listing.
    let listed: ListStreamsResult = d.exchange(&r.streams(), HttpMethod::Get, &headers(), None).unwrap().unwrap();
    assert_eq!(listed.total_number, 0);

    // Step 2: create and describe.
    create_stream(&client, "orders", 2);
    let described: DescribeStreamResult = d
        .exchange(&r.stream("orders"), HttpMethod::Get, &headers(), None)
        .unwrap()
        .unwrap();
    assert_eq!(described.stream_name, "orders");
    assert_eq!(described.partitions.len(), 2);
    assert_eq!(described.stream_type, StreamType::Common);

    // Step 3: grow the stream.
    let update = UpdatePartitionCountRequest {
        stream_name: "orders".to_string(),
        target_partition_count: 3,
    };
    let updated: Option<UpdatePartitionCountResult> = d
        .exchange(
            &r.stream("orders"),
            HttpMethod::Put,
            &headers(),
            Some(&Payload::json(&update).unwrap()),
        )
        .unwrap();
    assert_eq!(updated, Some(UpdatePartitionCountResult {}));

    // Step 4: paged listing sees it.
    let listed: ListStreamsResult = d
        .exchange(&r.streams_page(10, None), HttpMethod::Get, &headers(), None)
        .unwrap()
        .unwrap();
    assert_eq!(listed.stream_names, vec!["orders".to_string()]);

    // Step 5: file upload status.
    let upload: FileUploadResult = d
        .exchange(&r.file_upload("orders", "batch.csv"), HttpMethod::Get, &headers(), None)
        .unwrap()
        .unwrap();
    assert_eq!(upload.file_name, "batch.csv");

    // Step 6: delete, then describe is a 404 with the server's message.
    let deleted: Option<DeleteStreamResult> = d
        .exchange(&r.stream("orders"), HttpMethod::Delete, &headers(), None)
        .unwrap();
    assert!(deleted.is_none());
    let err = d
        .exchange::<DescribeStreamResult>(&r.stream("orders"), HttpMethod::Get, &headers(), None)
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    let msg = err.to_string();
    assert!(msg.contains("404"), "{msg}");
    assert!(msg.contains("stream not found"), "{msg}");
    client.close();
}

#[test]
fn json_records_roundtrip() {
    let (addr, _) = start_server();
    let client = client(addr, "json-records");
    let d = client.dispatcher();
    create_stream(&client, "events", 1);

    let put = PutRecordsRequest {
        stream_name: "events".to_string(),
        records: vec![
            PutRecordsRequestEntry::new(b"first".to_vec()).with_partition_id("shardId-0000000000"),
            PutRecordsRequestEntry::new(vec![0xde, 0xad]).with_partition_key("k"),
        ],
    };
    let result: PutRecordsResult = d
        .exchange(
            &client.routes().records(),
            HttpMethod::Post,
            &headers(),
            Some(&Payload::json(&put).unwrap()),
        )
        .unwrap()
        .unwrap();
    assert_eq!(result.failed_record_count, 0);
    assert_eq!(result.records.len(), 2);

    let cursor = trim_horizon(&client, "events", "shardId-0000000000");
    let fetched: GetRecordsResult = d
        .exchange(&client.routes().records_at(&cursor), HttpMethod::Get, &headers(), None)
        .unwrap()
        .unwrap();
    assert_eq!(fetched.records.len(), 2);
    assert_eq!(fetched.records[0].data, b"first");
    assert_eq!(fetched.records[1].data, vec![0xde, 0xad]);
    assert!(fetched.next_partition_cursor.is_some());
    client.close();
}

fn put_json(client: &DisClient, stream: &str, data: &[u8]) {
    let put = PutRecordsRequest {
        stream_name: stream.to_string(),
        records: vec![PutRecordsRequestEntry::new(data.to_vec()).with_partition_id("0")],
    };
    let result: PutRecordsResult = client
        .dispatcher()
        .exchange(
            &client.routes().records(),
            HttpMethod::Post,
            &headers(),
            Some(&Payload::json(&put).unwrap()),
        )
        .unwrap()
        .unwrap();
    assert_eq!(result.failed_record_count, 0);
}

#[test]
fn timestamp_cursor_skips_older_records() {
    let (addr, _) = start_server();
    let client = client(addr, "timestamp-cursor");
    let d = client.dispatcher();
    create_stream(&client, "timed", 1);

    put_json(&client, "timed", b"old");
    let cursor = trim_horizon(&client, "timed", "0");
    let first: GetRecordsResult = d
        .exchange(&client.routes().records_at(&cursor), HttpMethod::Get, &headers(), None)
        .unwrap()
        .unwrap();
    let old_ts = first.records[0].timestamp.unwrap();

    thread::sleep(Duration::from_millis(20));
    put_json(&client, "timed", b"new");

    let at: GetPartitionCursorResult = d
        .exchange(
            &client.routes().cursors(
                "timed",
                "0",
                CursorType::AtTimestamp,
                Some(CursorStart::Timestamp(old_ts + 1)),
            ),
            HttpMethod::Get,
            &headers(),
            None,
        )
        .unwrap()
        .unwrap();
    let fetched: GetRecordsResult = d
        .exchange(&client.routes().records_at(&at.partition_cursor), HttpMethod::Get, &headers(), None)
        .unwrap()
        .unwrap();
    assert_eq!(fetched.records.len(), 1);
    assert_eq!(fetched.records[0].data, b"new");
    client.close();
}

#[test]
fn protobuf_records_roundtrip() {
    let (addr, _) = start_server();
    let client = client(addr, "proto-records");
    let d = client.dispatcher();
    create_stream(&client, "binary", 1);

    let put = proto::PutRecordsRequest {
        stream_name: "binary".to_string(),
        records: vec![proto::PutRecordsRequestEntry {
            data: vec![0xff, 0x00, 0x7f],
            partition_id: Some("0".to_string()),
            ..Default::default()
        }],
    };
    let result: proto::PutRecordsResult = d
        .exchange(
            &client.routes().records(),
            HttpMethod::Post,
            &headers(),
            Some(&Payload::protobuf(&put)),
        )
        .unwrap()
        .unwrap();
    assert_eq!(result.failed_record_count, 0);
    assert_eq!(result.records[0].sequence_number.as_deref(), Some("0"));

    let cursor = trim_horizon(&client, "binary", "0");
    let fetched: proto::GetRecordsResult = d
        .exchange(&client.routes().records_at(&cursor), HttpMethod::Get, &headers(), None)
        .unwrap()
        .unwrap();
    assert_eq!(fetched.records.len(), 1);
    assert_eq!(fetched.records[0].data, vec![0xff, 0x00, 0x7f]);
    client.close();
}

#[test]
fn apps_and_checkpoints() {
    let (addr, _) = start_server();
    let client = client(addr, "apps-checkpoints");
    let d = client.dispatcher();
    let r = client.routes();
    create_stream(&client, "s", 1);

    let created: Option<CreateAppResult> = d
        .exchange(
            &r.apps(),
            HttpMethod::Post,
            &headers(),
            Some(&Payload::json(&CreateAppRequest { app_name: "reader".to_string() }).unwrap()),
        )
        .unwrap();
    assert!(created.is_none());

    let described: DescribeAppResult = d.exchange(&r.app("reader"), HttpMethod::Get, &headers(), None).unwrap().unwrap();
    assert_eq!(described.app_name, "reader");
    assert!(!described.app_id.is_empty());

    let listed: ListAppsResult = d.exchange(&r.apps(), HttpMethod::Get, &headers(), None).unwrap().unwrap();
    assert_eq!(listed.total_number, 1);
    assert_eq!(listed.apps[0].app_name, "reader");

    let commit = CommitCheckpointRequest {
        app_name: "reader".to_string(),
        checkpoint_type: CheckpointType::LastRead,
        stream_name: "s".to_string(),
        partition_id: "shardId-0000000000".to_string(),
        sequence_number: "41".to_string(),
        metadata: Some("m".to_string()),
    };
    let committed: Option<CommitCheckpointResult> = d
        .exchange(
            &r.checkpoints(),
            HttpMethod::Post,
            &headers(),
            Some(&Payload::json(&commit).unwrap()),
        )
        .unwrap();
    assert!(committed.is_none());

    let checkpoint: GetCheckpointResult = d
        .exchange(
            &r.checkpoint("reader", "s", "shardId-0000000000", CheckpointType::LastRead),
            HttpMethod::Get,
            &headers(),
            None,
        )
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.sequence_number.as_deref(), Some("41"));
    assert_eq!(checkpoint.metadata.as_deref(), Some("m"));

    let deleted: Option<DeleteAppResult> = d.exchange(&r.app("reader"), HttpMethod::Delete, &headers(), None).unwrap();
    assert!(deleted.is_none());
    client.close();
}

#[test]
fn dynamic_exchange_returns_json() {
    let (addr, _) = start_server();
    let client = client(addr, "dynamic");
    create_stream(&client, "s", 1);

    let value = client
        .dispatcher()
        .exchange_dynamic("listStreams", &client.routes().streams(), HttpMethod::Get, &headers(), None)
        .unwrap()
        .unwrap();
    assert_eq!(value["stream_names"][0], "s");
    client.close();
}

#[test]
fn unknown_operation_sends_nothing() {
    let (addr, state) = start_server();
    let client = client(addr, "unimplemented");

    let err = client
        .dispatcher()
        .exchange_dynamic(
            "listTransferTasks",
            &client.routes().streams(),
            HttpMethod::Get,
            &headers(),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, ClientError::Unimplemented(_)));
    assert_eq!(state.request_count(), 0);
    client.close();
}

#[test]
fn redirects_are_not_followed() {
    let (addr, _) = start_server();
    let client = client(addr, "redirects");
    let url = format!("{}/moved", client.routes().base());

    let err = client
        .dispatcher()
        .exchange::<ListStreamsResult>(&url, HttpMethod::Get, &headers(), None)
        .unwrap_err();
    assert_eq!(err.status(), Some(307));
    client.close();
}

#[test]
fn slow_response_times_out_as_transport_error() {
    let (addr, _) = start_server();
    let config = ClientConfig::new(&format!("http://{addr}"), "timeouts").with_timeouts(1_000, 200);
    let client = DisClient::new(config).unwrap();
    let url = format!("{}/slow?ms=2000", client.routes().base());

    let err = client
        .dispatcher()
        .exchange::<ListStreamsResult>(&url, HttpMethod::Get, &headers(), None)
        .unwrap_err();
    assert!(err.is_transport(), "{err}");
    client.close();
}

#[test]
fn unreachable_endpoint_is_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let client = DisClient::new(ClientConfig::new(&format!("http://127.0.0.1:{port}"), "unreachable")).unwrap();

    let err = client
        .dispatcher()
        .exchange::<ListStreamsResult>(&client.routes().streams(), HttpMethod::Get, &headers(), None)
        .unwrap_err();
    assert!(err.is_transport(), "{err}");
    assert_eq!(err.status(), None);
    client.close();
}

#[test]
fn concurrent_calls_share_one_transport() {
    let (addr, state) = start_server();
    let config = ClientConfig::new(&format!("http://{addr}"), "concurrent").with_pool_limits(4, 2);
    let first = DisClient::new(config.clone()).unwrap();
    create_stream(&first, "s", 1);
    let before = state.request_count();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let config = config.clone();
            thread::spawn(move || {
                let client = DisClient::new(config).unwrap();
                let listed: ListStreamsResult = client
                    .dispatcher()
                    .exchange(&client.routes().streams(), HttpMethod::Get, &headers(), None)
                    .unwrap()
                    .unwrap();
                assert_eq!(listed.total_number, 1);
                Arc::clone(client.dispatcher().transport())
            })
        })
        .collect();
    for h in handles {
        let transport = h.join().unwrap();
        assert!(Arc::ptr_eq(&transport, first.dispatcher().transport()));
    }
    assert_eq!(state.request_count() - before, 8);
    assert_eq!(first.dispatcher().transport().gate().in_flight(), 0);
    assert!(Transport::is_registered(&config));
    first.close();
}
