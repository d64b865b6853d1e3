//! Integration tests for EtcdConfig.
//!
//! Uses wiremock as the store. Tests cover reads, writes, the three CAS
//! outcomes, create-only CAS, deletes, directories, watches and deadlines.

use std::time::{Duration, Instant};

use confwatch::client::USER_AGENT_VALUE;
use confwatch::{ConfError, EtcdConfig, EtcdSettings, Value};
use tokio::sync::mpsc;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(mock_server: &MockServer) -> EtcdSettings {
    EtcdSettings::default()
        .with_endpoint(mock_server.uri())
        .with_timeout(Duration::from_secs(2))
        .with_watch_timeout(Duration::from_secs(30))
        .with_backoff(Duration::from_millis(50), Duration::from_millis(200))
}

fn create_test_client(mock_server: &MockServer) -> EtcdConfig {
    EtcdConfig::new(settings(mock_server)).expect("failed to create client")
}

fn node_body(action: &str, key: &str, value: &str, index: u64) -> serde_json::Value {
    serde_json::json!({
        "action": action,
        "node": {"key": key, "value": value, "modifiedIndex": index, "createdIndex": 1}
    })
}

fn error_body(code: u32, message: &str, cause: &str, index: u64) -> serde_json::Value {
    serde_json::json!({"errorCode": code, "message": message, "cause": cause, "index": index})
}

/// Park every long-poll not matched by a more specific mock.
/// Mount after the specific mocks.
async fn idle_watches(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(query_param("wait", "true"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_get_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/app/db/host"))
        .and(header("user-agent", USER_AGENT_VALUE))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(node_body("get", "/app/db/host", "db1", 7)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let (value, index) = client
        .get_with_index("app.db.host")
        .await
        .expect("get failed");

    assert_eq!(value, Value::from("db1"));
    assert_eq!(index, 7);
    assert!(!client.is_watching("app.db.host"));
}

#[tokio::test]
async fn test_get_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(error_body(100, "Key not found", "/missing", 3)),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.get("missing").await;

    assert!(matches!(result, Err(ConfError::NoSuchKey { ref key }) if key == "missing"));
}

#[tokio::test]
async fn test_get_directory() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "action": "get",
            "node": {"key": "/queue", "dir": true, "modifiedIndex": 2, "createdIndex": 2,
                "nodes": [
                    {"key": "/queue/00000000000000000003", "value": "a", "modifiedIndex": 3, "createdIndex": 3},
                    {"key": "/queue/00000000000000000004", "value": "b", "modifiedIndex": 4, "createdIndex": 4}
                ]}
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let value = client.get("queue").await.expect("get failed");

    assert_eq!(value, Value::List(vec![Value::from("a"), Value::from("b")]));
}

#[tokio::test]
async fn test_set_arms_watch_at_next_index() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/keys/app/name"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("value=hello+world"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(node_body("set", "/app/name", "hello world", 5)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/app/name"))
        .and(query_param("wait", "true"))
        .and(query_param("waitIndex", "6"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let (value, index) = client
        .set_with_index("app.name", "hello world")
        .await
        .expect("set failed");

    assert_eq!(value, Value::from("hello world"));
    assert_eq!(index, 5);

    // A write arms the watch, which waits for the next index.
    assert!(client.is_watching("app.name"));
    assert_eq!(
        client.cached("app.name").and_then(|r| r.modified_index()),
        Some(5)
    );
}

#[tokio::test]
async fn test_cas_zero_index_is_rejected_locally() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.compare_and_swap("a.b.c", "x", 0).await;

    assert!(matches!(result, Err(ConfError::InvalidIndex { index: 0 })));
}

#[tokio::test]
async fn test_cas_stale_index() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/keys/a/b/c"))
        .and(body_string("value=new&prevIndex=3"))
        .respond_with(
            ResponseTemplate::new(412)
                .set_body_json(error_body(101, "Compare failed", "[3 != 8]", 8)),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.compare_and_swap("a.b.c", "new", 3).await;

    match result {
        Err(ConfError::ComparisonFailed { key, message }) => {
            assert_eq!(key, "a.b.c");
            assert!(message.contains("[3 != 8]"));
        }
        other => panic!("expected ComparisonFailed, got {:?}", other),
    }
    assert!(client.cached("a.b.c").is_none());
}

#[tokio::test]
async fn test_cas_current_index() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/keys/a/b/c"))
        .and(body_string("value=new&prevIndex=8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(node_body("compareAndSwap", "/a/b/c", "new", 9)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    idle_watches(&mock_server).await;

    let client = create_test_client(&mock_server);
    let (value, index) = client
        .compare_and_swap("a.b.c", "new", 8)
        .await
        .expect("cas failed");

    assert_eq!(value, Value::from("new"));
    assert_eq!(index, 9);
    assert!(client.is_watching("a.b.c"));
}

#[tokio::test]
async fn test_cas_create_only() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/keys/lock"))
        .and(body_string("value=me&prevExist=false"))
        .respond_with(
            ResponseTemplate::new(412)
                .set_body_json(error_body(105, "Key already exists", "/lock", 11)),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.compare_and_swap("lock", "me", -1).await;

    assert!(matches!(result, Err(ConfError::ComparisonFailed { ref key, .. }) if key == "lock"));
}

#[tokio::test]
async fn test_compare_value_and_swap() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/keys/mode"))
        .and(body_string("value=true&prevValue=false"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(node_body("compareAndSwap", "/mode", "true", 4)),
        )
        .mount(&mock_server)
        .await;
    idle_watches(&mock_server).await;

    let client = create_test_client(&mock_server);
    let (value, _) = client
        .compare_value_and_swap("mode", "true", "false")
        .await
        .expect("cas failed");

    assert!(value.to_bool().expect("not a bool"));
}

#[tokio::test]
async fn test_mkdir_and_add() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/keys/jobs"))
        .and(body_string("dir=true"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "action": "set",
            "node": {"key": "/jobs", "dir": true, "modifiedIndex": 12, "createdIndex": 12}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/keys/jobs"))
        .and(body_string("value=build"))
        .respond_with(ResponseTemplate::new(201).set_body_json(node_body(
            "create",
            "/jobs/00000000000000000013",
            "build",
            13,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    client.mkdir("jobs").await.expect("mkdir failed");
    let value = client.add("jobs", "build").await.expect("add failed");

    assert_eq!(value, Value::from("build"));
    assert!(client.cached("jobs").is_none());
    assert!(!client.is_watching("jobs"));
}

#[tokio::test]
async fn test_delete_then_get() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v2/keys/old/flag"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "action": "delete",
            "node": {"key": "/old/flag", "modifiedIndex": 20, "createdIndex": 3},
            "prevNode": {"key": "/old/flag", "value": "1", "modifiedIndex": 3, "createdIndex": 3}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/old/flag"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(error_body(100, "Key not found", "/old/flag", 20)),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    client.delete("old.flag").await.expect("delete failed");

    let cached = client.cached("old.flag").expect("deletion not cached");
    assert_eq!(cached.action, "delete");
    assert!(!client.is_watching("old.flag"));

    assert!(matches!(
        client.get("old.flag").await,
        Err(ConfError::NoSuchKey { .. })
    ));
}

#[tokio::test]
async fn test_server_error_surfaces_as_service_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/k"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.get("k").await;

    assert!(matches!(
        result,
        Err(ConfError::Service { status: 503, code: None, .. })
    ));
}

#[tokio::test]
async fn test_deadline_cancels_slow_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(node_body("get", "/slow", "late", 1))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let client = EtcdConfig::new(
        settings(&mock_server).with_timeout(Duration::from_millis(200)),
    )
    .expect("failed to create client");

    let started = Instant::now();
    let result = client.get("slow").await;

    assert!(matches!(result, Err(ConfError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_watch_notifies_every_observer_once() {
    let mock_server = MockServer::start().await;

    // Second poll: parked until the test ends.
    Mock::given(method("GET"))
        .and(path("/v2/keys/app/flag"))
        .and(query_param("wait", "true"))
        .and(query_param("waitIndex", "15"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
        .mount(&mock_server)
        .await;

    // First poll: no index known yet; answers after both observers registered.
    Mock::given(method("GET"))
        .and(path("/v2/keys/app/flag"))
        .and(query_param("wait", "true"))
        .and(query_param("recursive", "false"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(node_body("set", "/app/flag", "on", 14))
                .set_delay(Duration::from_millis(200)),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);

    let (tx, mut rx) = mpsc::unbounded_channel();
    for id in 0..2 {
        let tx = tx.clone();
        client.watch("app.flag", move |key, value| {
            let _ = tx.send((id, key.to_string(), value));
        });
    }
    assert!(client.is_watching("app.flag"));

    let mut seen = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("observer not invoked")
            .expect("channel closed");
        seen.push(event);
    }
    seen.sort_by_key(|(id, _, _)| *id);

    assert_eq!(
        seen,
        vec![
            (0, "app.flag".to_string(), Value::from("on")),
            (1, "app.flag".to_string(), Value::from("on")),
        ]
    );
    assert!(
        tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_err(),
        "observer invoked twice"
    );
    assert_eq!(
        client.cached("app.flag").and_then(|r| r.modified_index()),
        Some(14)
    );

    client.cancel_watch("app.flag");
    assert!(!client.is_watching("app.flag"));
}

#[tokio::test]
async fn test_watch_survives_store_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/svc"))
        .and(query_param("waitIndex", "3"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/svc"))
        .and(query_param("wait", "true"))
        .respond_with(ResponseTemplate::new(500).set_body_string("raft is sad"))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/svc"))
        .and(query_param("wait", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(node_body("set", "/svc", "up", 2)))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.watch("svc", move |_, value| {
        let _ = tx.send(value);
    });

    let value = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("observer not invoked")
        .expect("channel closed");
    assert_eq!(value, Value::from("up"));
    assert!(client.is_watching("svc"));
}

#[tokio::test]
async fn test_watch_rereads_after_index_cleared() {
    let mock_server = MockServer::start().await;

    // Resumed poll, past the store index reported with the 401.
    Mock::given(method("GET"))
        .and(path("/v2/keys/app/mode"))
        .and(query_param("waitIndex", "1006"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/app/mode"))
        .and(query_param("waitIndex", "15"))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body(
            401,
            "The event in requested index is outdated and cleared",
            "the requested history has been cleared [20/15]",
            1005,
        )))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/app/mode"))
        .and(query_param("wait", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(node_body(
            "set",
            "/app/mode",
            "blue",
            14,
        )))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    // Plain read: the write made while the history was out of reach.
    Mock::given(method("GET"))
        .and(path("/v2/keys/app/mode"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(node_body("get", "/app/mode", "green", 900)),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.watch("app.mode", move |_, value| {
        let _ = tx.send(value);
    });

    for expected in ["blue", "green"] {
        let value = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("observer not invoked")
            .expect("channel closed");
        assert_eq!(value, Value::from(expected));
    }
    assert_eq!(
        client.cached("app.mode").and_then(|r| r.modified_index()),
        Some(900)
    );

    let mut resumed = false;
    for _ in 0..100 {
        let requests = mock_server.received_requests().await.unwrap_or_default();
        if requests
            .iter()
            .any(|r| r.url.query().is_some_and(|q| q.contains("waitIndex=1006")))
        {
            resumed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(resumed, "watch did not resume past the reported store index");

    client.cancel_watch("app.mode");
}
