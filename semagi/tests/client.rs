use std::time::Duration;

use semagi::client::ApiClient;
use semagi_core::contract::{TaskApi, TransportError};
use semagi_core::keywords::TaskRequest;
use semagi_core::schedule::PollingPolicy;
use semagi_core::task::{Credentials, FunctionKind, Grouper, TaskSpec, TaskStatus};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(
        &Credentials {
            api_key: "test-key".into(),
            base_url: server.uri(),
        },
        Duration::from_secs(5),
    )
    .expect("client")
}

fn request() -> TaskRequest {
    TaskRequest {
        spec: TaskSpec {
            function: FunctionKind::GroupOnly,
            file: "keywords.json".into(),
            task_name: "shoes".into(),
            grouper: Grouper::HierarchicalClustering,
            min_similarity: 0.5,
            range: 10,
            numbers: 10,
            country: "us".into(),
            language: "en".into(),
            force_group: true,
            force_group_min_similarity: 0.2,
            request_timeout_secs: 5,
            max_wait_secs: 60,
            wait: true,
            polling: PollingPolicy::default(),
        },
        file_name: "keywords.json".into(),
        content: br#"{"keywords":["a"]}"#.to_vec(),
        keyword_count: 1,
    }
}

#[tokio::test]
async fn create_posts_encoded_file_with_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "function": "group-only",
            "task_name": "shoes",
            "file_name": "keywords.json",
            "file_content": "eyJrZXl3b3JkcyI6WyJhIl19",
            "grouper": "hierarchical_clustering",
            "range_": 10,
            "force_group": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "task_id": "task-7",
            "estimate_time": 90,
            "message": "Task created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client_for(&server).create(&request()).await.unwrap();
    assert_eq!(created.task_id, "task-7");
    assert_eq!(created.estimated_seconds, Some(90.0));
    assert_eq!(created.message.as_deref(), Some("Task created"));
}

#[tokio::test]
async fn zero_estimate_means_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/task-7/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "processing",
            "estimate_time": 0
        })))
        .mount(&server)
        .await;

    let snapshot = client_for(&server).status("task-7").await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Running);
    assert_eq!(snapshot.estimated_seconds, None);
}

#[tokio::test]
async fn conflict_on_create_keeps_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "detail": "You already have a task running"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).create(&request()).await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Conflict("You already have a task running".into())
    );
    assert_eq!(err.to_string(), "You already have a task running");
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    let cases = [
        ("auth", 401u16, json!({"detail": "invalid key"})),
        ("gone", 404, json!({"detail": "no such task"})),
        ("busy", 503, json!({"error": "maintenance"})),
        ("bad", 422, json!({"message": "bad id"})),
    ];
    for (id, code, body) in &cases {
        Mock::given(method("GET"))
            .and(path(format!("/api/tasks/{id}/status")))
            .respond_with(ResponseTemplate::new(*code).set_body_json(body.clone()))
            .mount(&server)
            .await;
    }

    let api = client_for(&server);
    assert_eq!(
        api.status("auth").await.unwrap_err(),
        TransportError::Auth("invalid key".into())
    );
    assert_eq!(
        api.status("gone").await.unwrap_err(),
        TransportError::NotFound("gone".into())
    );
    let busy = api.status("busy").await.unwrap_err();
    assert_eq!(
        busy,
        TransportError::Server {
            status: 503,
            message: "maintenance".into()
        }
    );
    assert!(busy.is_retryable());
    assert_eq!(
        api.status("bad").await.unwrap_err(),
        TransportError::Rejected {
            status: 422,
            message: "bad id".into()
        }
    );
}

#[tokio::test]
async fn results_conflict_means_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/task-7/results"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let err = client_for(&server).results("task-7").await.unwrap_err();
    assert_eq!(err, TransportError::NotReady("task-7".into()));
}

#[tokio::test]
async fn results_accept_object_and_legacy_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/new/results"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_name": "shoes",
            "group_count": 3,
            "csv_download_link": "https://files.example/r.csv"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/old/results"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "task name": "shoes",
            "credit cost": 4,
            "csv download link": "https://files.example/r.csv"
        }])))
        .mount(&server)
        .await;

    let api = client_for(&server);
    let new = api.results("new").await.unwrap();
    assert_eq!(new.group_count, Some(3));
    let old = api.results("old").await.unwrap();
    assert_eq!(old.task_name.as_deref(), Some("shoes"));
    assert_eq!(old.credit_cost, Some(4.0));
    assert_eq!(old.csv_download_link, new.csv_download_link);
}

#[tokio::test]
async fn nested_results_keep_their_download_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/v2/results"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response_version": "2.0",
            "status": "completed",
            "task": {"name": "shoes", "function": "group-only"},
            "files": {
                "csv": {"filename": "shoes.csv", "download_link": "https://files.example/r.csv"},
                "json": {"filename": "shoes.json", "download_link": "https://files.example/r.json"}
            },
            "parameters": {"grouping": {"min_similarity": 0.5}},
            "quality": {"overall": 88.0}
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).results("v2").await.unwrap();
    assert_eq!(result.task_name.as_deref(), Some("shoes"));
    assert_eq!(result.function.as_deref(), Some("group-only"));
    assert_eq!(
        result.csv_download_link.as_deref(),
        Some("https://files.example/r.csv")
    );
    assert_eq!(
        result.json_download_link.as_deref(),
        Some("https://files.example/r.json")
    );
    assert_eq!(result.json_file_name.as_deref(), Some("shoes.json"));
    assert_eq!(result.quality.get("overall"), Some(&88.0));
    assert_eq!(
        result
            .parameters
            .get("grouping.min_similarity")
            .map(String::as_str),
        Some("0.5")
    );
    assert!(result.unrecognized_fields.is_empty());
}

#[tokio::test]
async fn undecodable_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/task-7/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).status("task-7").await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidResponse(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let uri = format!("http://127.0.0.1:{port}");

    let api = ApiClient::new(
        &Credentials {
            api_key: "k".into(),
            base_url: uri,
        },
        Duration::from_secs(2),
    )
    .unwrap();
    let err = api.status("task-7").await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)), "{err:?}");
    assert!(err.is_retryable());
}
