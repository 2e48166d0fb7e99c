//! API integration tests for httpmon-api routes.
//!
//! Uses Axum's `tower::ServiceExt` to send requests directly to the app
//! without binding a TCP socket.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use httpmon_api::app::build_app;
use httpmon_api::state::AppState;
use httpmon_core::{
    build_client, parse_manifests, ControllerConfig, Engine, ResponseCounters, RunnerRegistry,
};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn state() -> AppState {
    let counters = Arc::new(ResponseCounters::new());
    let engine = Engine::new(
        build_client(Duration::from_secs(5)).unwrap(),
        counters.clone(),
        &ControllerConfig::default(),
    );
    AppState::new(Arc::new(RunnerRegistry::new(Arc::new(engine))), counters)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

const LOGIN: &str = r#"
kind: HttpMonitor
metadata: { namespace: probes, name: login, resourceVersion: "3" }
spec:
  period: 1h
  requests:
    - { name: ping, method: GET, url: "http://auth.local/ping" }
"#;

#[tokio::test]
async fn health_returns_ok() {
    let resp = build_app(state()).oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp.into_body()).await, "ok");
}

#[tokio::test]
async fn metrics_returns_openmetrics() {
    let resp = build_app(state()).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(ct.contains("openmetrics-text"));
    let text = body_text(resp.into_body()).await;
    assert!(text.contains("# TYPE monitorcontroller_http_response counter"));
    assert!(text.ends_with("# EOF\n"));
}

#[tokio::test]
async fn metrics_include_cycle_outcomes() {
    let server = MockServer::start().await;
    Mock::given(path("/ping"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let state = state();
    let def = parse_manifests(&format!(
        r#"
kind: HttpMonitor
metadata: {{ name: ping }}
spec:
  period: 1h
  requests:
    - {{ name: ping, target_service: edge, method: GET, url: "{}/ping" }}
"#,
        server.uri()
    ))
    .unwrap()
    .remove(0);
    state.registry.engine().execute_cycle(&def).await;

    let text = body_text(build_app(state).oneshot(get("/metrics")).await.unwrap().into_body()).await;
    assert!(text.contains(&format!(
        "monitorcontroller_http_response_total{{url=\"{}/ping\",status=\"503\"}} 1",
        server.uri()
    )));
    assert!(text.contains(
        "monitorcontroller_crd_http_response_total{type=\"HttpMonitor/v1alpha1\",crd=\"default/ping\",requestName=\"ping\",targetService=\"edge\",status=\"503\"} 1"
    ));
}

#[tokio::test]
async fn list_monitors_empty() {
    let resp = build_app(state()).oneshot(get("/api/v1/monitors")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.into_body()).await, Value::Array(vec![]));
}

#[tokio::test]
async fn registered_runner_is_listed_and_fetchable() {
    let state = state();
    let def = parse_manifests(LOGIN).unwrap().remove(0);
    state.registry.upsert(def).await;

    let resp = build_app(state.clone())
        .oneshot(get("/api/v1/monitors"))
        .await
        .unwrap();
    let list = body_json(resp.into_body()).await;
    assert_eq!(list[0]["namespace"], "probes");
    assert_eq!(list[0]["name"], "login");
    assert_eq!(list[0]["fingerprint"], "3");
    assert_eq!(list[0]["state"], "running");
    assert_eq!(list[0]["period_ms"], 3_600_000);

    let resp = build_app(state.clone())
        .oneshot(get("/api/v1/monitors/probes/login"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let detail = body_json(resp.into_body()).await;
    assert_eq!(detail["monitor"]["name"], "login");
    assert_eq!(detail["request_count"], 1);
    assert_eq!(detail["cycles"], 0);

    state.registry.stop_all().await;
}

#[tokio::test]
async fn get_monitor_not_found() {
    let resp = build_app(state())
        .oneshot(get("/api/v1/monitors/probes/missing"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["message"], "Monitor probes/missing not found");
}
