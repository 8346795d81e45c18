use super::*;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use coderun_core::testing::{FakeBackend, FakeExec};
use coderun_core::CodeRunConfig;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

struct Harness {
    backend: Arc<FakeBackend>,
    scratch: TempDir,
    router: Router,
}

impl Harness {
    fn new(backend: FakeBackend) -> Self {
        Self::with_timeout(backend, None)
    }

    fn with_timeout(backend: FakeBackend, timeout: Option<Duration>) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let mut config = CodeRunConfig::default();
        config.sandbox.scratch_dir = Some(scratch.path().to_path_buf());

        let runner = CodeRunner::from_config(&config, backend.clone()).unwrap();
        let server = CodeRunServer::with_config(
            runner,
            ServerConfig::new().with_execution_timeout(timeout),
        );
        Self {
            backend,
            router: server.build_router(),
            scratch,
        }
    }

    async fn post_run(&self, body: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/run")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read_json(response).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read_json(response).await
    }

    fn scratch_is_empty(&self) -> bool {
        scratch_is_empty(self.scratch.path())
    }
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_languages_endpoint_lists_registered_languages() {
    let harness = Harness::new(FakeBackend::new());

    let (status, body) = harness.get("/languages").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "languages": ["c", "cpp", "js", "py"] }));
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = Harness::new(FakeBackend::new());

    let (status, body) = harness.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_invalid_input_is_rejected_without_sandbox() {
    let harness = Harness::new(FakeBackend::new());
    let cases = [
        (r#"{"language": "py"}"#, "Missing code input."),
        (r#"{"code": "", "language": "py"}"#, "Missing code input."),
        (r#"{"code": "print(1)"}"#, "Missing language."),
        (r#"{"code": "print(1)", "language": ""}"#, "Missing language."),
        (r#"{"code": "print(1)", "language": "cobol"}"#, "Invalid language."),
    ];

    for (body, message) in cases {
        let (status, response) = harness.post_run(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response, serde_json::json!({ "error": { "message": message } }));
    }

    assert_eq!(harness.backend.create_count(), 0);
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let harness = Harness::new(FakeBackend::new());

    let (status, response) = harness.post_run("{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"]["message"].is_string());
    assert_eq!(harness.backend.create_count(), 0);
}

#[tokio::test]
async fn test_c_hello_world_round_trip() {
    let harness = Harness::new(FakeBackend::new().with_script([
        FakeExec::exit(0, "", ""),
        FakeExec::exit(0, "hello\n", ""),
    ]));
    let body = serde_json::json!({
        "code": "#include <stdio.h>\nint main(){printf(\"hello\\n\");return 0;}",
        "language": "c"
    });

    let (status, response) = harness.post_run(&body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["compiler_output"]["exit_code"], 0);
    assert_eq!(
        response["program_output"],
        serde_json::json!({ "exit_code": 0, "stdout": "hello\n", "stderr": "" })
    );
    assert!(harness.backend.running().is_empty());
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_c_syntax_error_still_reports_program_attempt() {
    let harness = Harness::new(FakeBackend::new().with_script([
        FakeExec::exit(1, "", "main.c:1:1: error: expected identifier\n"),
        FakeExec::exit(126, "", "sh: /sandbox/main: not found\n"),
    ]));

    let (status, response) = harness
        .post_run(r#"{"code": "int main( {", "language": "c"}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_ne!(response["compiler_output"]["exit_code"], 0);
    assert!(response["program_output"].is_object());
    assert_ne!(response["program_output"]["exit_code"], 0);
}

#[tokio::test]
async fn test_python_stderr_exit_code_without_compiler_output() {
    let harness = Harness::new(
        FakeBackend::new().with_script([FakeExec::exit(1, "", "something broke\n")]),
    );

    let (status, response) = harness
        .post_run(r#"{"code": "import sys\nsys.stderr.write('something broke\\n')\nsys.exit(1)", "language": "py"}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["compiler_output"], Value::Null);
    assert_eq!(
        response["program_output"],
        serde_json::json!({ "exit_code": 1, "stdout": "", "stderr": "something broke\n" })
    );
}

#[tokio::test]
async fn test_every_registered_language_yields_program_output() {
    for language in ["c", "cpp", "js", "py"] {
        let harness = Harness::new(FakeBackend::new());
        let body = serde_json::json!({ "code": "source", "language": language });

        let (status, response) = harness.post_run(&body.to_string()).await;

        assert_eq!(status, StatusCode::OK, "{language}");
        assert!(response["program_output"].is_object(), "{language}");
        assert_eq!(harness.backend.create_count(), 1);
        assert!(harness.backend.running().is_empty());
    }
}

#[tokio::test]
async fn test_concurrent_requests_get_distinct_sandboxes() {
    let harness = Harness::new(FakeBackend::new());
    let body = r#"{"code": "print(1)", "language": "py"}"#;

    let (first, second) = tokio::join!(harness.post_run(body), harness.post_run(body));

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    let created = harness.backend.created();
    assert_eq!(created.len(), 2);
    assert_ne!(created[0], created[1]);
    assert!(harness.backend.running().is_empty());
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_unavailable_sandbox_is_a_server_error() {
    let harness = Harness::new(FakeBackend::new().failing_create("docker daemon unreachable"));

    let (status, response) = harness
        .post_run(r#"{"code": "print(1)", "language": "py"}"#)
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let message = response["error"]["message"].as_str().unwrap();
    assert!(message.contains("docker daemon unreachable"));
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_exec_failure_is_internal_error_and_cleans_up() {
    let harness = Harness::new(
        FakeBackend::new().with_script([FakeExec::Fail("exec create failed".to_string())]),
    );

    let (status, _) = harness
        .post_run(r#"{"code": "console.log(1)", "language": "js"}"#)
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.backend.running().is_empty());
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_watchdog_cancels_hung_submission() {
    let harness = Harness::with_timeout(
        FakeBackend::new().with_script([FakeExec::Hang]),
        Some(Duration::from_millis(50)),
    );

    let (status, response) = harness
        .post_run(r#"{"code": "while True: pass", "language": "py"}"#)
        .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(response["error"]["message"].is_string());
    assert_eq!(harness.backend.killed().len(), 1);
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_client_disconnect_tears_down_sandbox() {
    let harness = Harness::new(FakeBackend::new().with_script([FakeExec::Hang]));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        harness.post_run(r#"{"code": "while True: pass", "language": "py"}"#),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.backend.killed(), vec!["fake-0".to_string()]);
    assert!(harness.backend.running().is_empty());
    assert!(harness.scratch_is_empty());
}

#[test]
fn test_server_config_from_settings() {
    let mut settings = coderun_core::config::ServerSettings::default();
    settings.bind_addr = "0.0.0.0:9000".to_string();
    settings.cors_origins = vec!["https://example.com".to_string()];
    let execution = coderun_core::config::ExecutionConfig {
        timeout_secs: Some(5),
        ..Default::default()
    };

    let config = ServerConfig::from_settings(&settings, &execution).unwrap();

    assert_eq!(config.bind_addr, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
    assert_eq!(config.cors_origins, Some(vec!["https://example.com".to_string()]));
    assert_eq!(config.execution_timeout, Some(Duration::from_secs(5)));
}

#[test]
fn test_invalid_bind_addr_is_config_error() {
    let settings = coderun_core::config::ServerSettings {
        bind_addr: "not-an-addr".to_string(),
        ..Default::default()
    };

    let err = ServerConfig::from_settings(&settings, &Default::default()).unwrap_err();
    assert!(matches!(err, ServerError::Config(_)));
}
