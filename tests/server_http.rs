use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use irisml::dataset::load_iris;
use irisml::ml::forest::{ForestOptions, train_random_forest};
use irisml::server::{AppState, MetricsRegistry, PredictionService, serve_on};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::net::TcpListener;

async fn start_server(model_path: &Path) -> (SocketAddr, AppState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState {
        service: Arc::new(PredictionService::new(model_path)),
        metrics: Arc::new(MetricsRegistry::new(None)),
    };
    tokio::spawn(serve_on(listener, state.clone()));
    (addr, state)
}

fn write_trained_model(path: &Path) {
    let forest = train_random_forest(&load_iris().unwrap(), &ForestOptions::default()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(&forest).unwrap()).unwrap();
}

async fn get(url: String) -> (u16, String) {
    tokio::task::spawn_blocking(move || match ureq::get(&url).call() {
        Ok(response) => (response.status(), response.into_string().unwrap()),
        Err(ureq::Error::Status(status, response)) => (status, response.into_string().unwrap()),
        Err(err) => panic!("request failed: {err}"),
    })
    .await
    .unwrap()
}

async fn post_json(url: String, body: String) -> (u16, Value) {
    tokio::task::spawn_blocking(move || {
        let result = ureq::post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body);
        match result {
            Ok(response) => (response.status(), response.into_json().unwrap()),
            Err(ureq::Error::Status(status, response)) => (status, response.into_json().unwrap()),
            Err(err) => panic!("request failed: {err}"),
        }
    })
    .await
    .unwrap()
}

fn setosa() -> String {
    json!({
        "sepal_length": 5.1,
        "sepal_width": 3.5,
        "petal_length": 1.4,
        "petal_width": 0.2
    })
    .to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn health_is_ok_without_a_model() {
    let dir = tempdir().unwrap();
    let (addr, state) = start_server(&dir.path().join("model.json")).await;
    let (status, body) = get(format!("http://{addr}/health")).await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"status": "ok"}));
    assert!(!state.service.is_loaded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn trained_model_predicts_setosa() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    write_trained_model(&path);
    let (addr, _state) = start_server(&path).await;

    let (status, body) = post_json(format!("http://{addr}/predict"), setosa()).await;
    assert_eq!(status, 200);
    assert_eq!(body["prediction"], json!(0));
    let proba = body["proba"].as_array().unwrap();
    assert_eq!(proba.len(), 3);
    assert!(proba[0].as_f64().unwrap() > 0.9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn absent_artifact_serves_stand_in() {
    let dir = tempdir().unwrap();
    let (addr, _state) = start_server(&dir.path().join("model.json")).await;
    let body = json!({
        "sepal_length": 7.7,
        "sepal_width": 2.6,
        "petal_length": 6.9,
        "petal_width": 2.3
    })
    .to_string();
    let (status, body) = post_json(format!("http://{addr}/predict"), body).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"prediction": 0, "proba": [1.0, 0.0, 0.0]}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_field_is_rejected_before_loading() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    write_trained_model(&path);
    let (addr, state) = start_server(&path).await;

    let body = json!({"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4}).to_string();
    let (status, body) = post_json(format!("http://{addr}/predict"), body).await;
    assert_eq!(status, 422);
    assert!(body["detail"].as_str().unwrap().contains("petal_width"));

    let body = json!({
        "sepal_length": "wide",
        "sepal_width": 3.5,
        "petal_length": 1.4,
        "petal_width": 0.2
    })
    .to_string();
    let (status, _) = post_json(format!("http://{addr}/predict"), body).await;
    assert_eq!(status, 422);
    assert!(!state.service.is_loaded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn corrupt_artifact_returns_500_and_counts_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, b"{\"trees\": 3}").unwrap();
    let (addr, _state) = start_server(&path).await;

    let (status, body) = post_json(format!("http://{addr}/predict"), setosa()).await;
    assert_eq!(status, 500);
    assert!(!body["detail"].as_str().unwrap().is_empty());

    let (_, metrics) = get(format!("http://{addr}/metrics")).await;
    assert!(metrics.contains("model_predictions_total{class=\"error\"} 1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_requests_all_succeed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    write_trained_model(&path);
    let (addr, _state) = start_server(&path).await;

    let samples = [
        (json!([5.1, 3.5, 1.4, 0.2]), 0),
        (json!([4.9, 3.0, 1.4, 0.2]), 0),
        (json!([7.7, 2.6, 6.9, 2.3]), 2),
    ];
    let handles: Vec<_> = (0..30)
        .map(|idx| {
            let (values, expected) = samples[idx % samples.len()].clone();
            let body = json!({
                "sepal_length": values[0],
                "sepal_width": values[1],
                "petal_length": values[2],
                "petal_width": values[3]
            })
            .to_string();
            let url = format!("http://{addr}/predict");
            tokio::spawn(async move { (post_json(url, body).await, expected) })
        })
        .collect();
    for handle in handles {
        let ((status, body), expected) = handle.await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body["prediction"], json!(expected));
    }

    let (status, metrics) = get(format!("http://{addr}/metrics")).await;
    assert_eq!(status, 200);
    assert!(metrics.contains(
        "http_requests_total{method=\"POST\",endpoint=\"/predict\",status=\"200\"} 30"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_routes_are_counted_as_unmatched() {
    let dir = tempdir().unwrap();
    let (addr, state) = start_server(&dir.path().join("model.json")).await;
    let (status, _) = get(format!("http://{addr}/nope")).await;
    assert_eq!(status, 404);
    let snapshot = state.metrics.snapshot();
    assert_eq!(
        snapshot.counter(
            "http_requests_total",
            &[("method", "GET"), ("endpoint", "unmatched"), ("status", "404")]
        ),
        1
    );
}
