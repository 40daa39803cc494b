mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use helpers::{BUCKET, MemoryStorage, ScriptedSource, test_config};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use video_stream_relay::services::transfer::TransferService;
use video_stream_relay::{AppState, create_app};

fn app(source: ScriptedSource, storage: Arc<MemoryStorage>) -> axum::Router {
    let transfer = Arc::new(TransferService::new(
        test_config(),
        Arc::new(source),
        storage,
    ));
    create_app(AppState { transfer })
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_transfer_by_video_id() {
    let storage = Arc::new(MemoryStorage::new(BUCKET));
    let app = app(ScriptedSource::chunks(&["fake", "mp4"]), storage.clone());

    let (status, json) = get(app, "/transfer?videoId=egs0XN-xjA0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["bucketName"], "videos-bucket");
    assert_eq!(json["path"], "egs0XN-xjA0.mp4");
    assert_eq!(json["url"], "s3://videos-bucket/egs0XN-xjA0.mp4");
    assert!(storage.object("egs0XN-xjA0.mp4").is_some());
}

#[tokio::test]
async fn test_transfer_by_url_and_path() {
    let storage = Arc::new(MemoryStorage::new(BUCKET));
    let app = app(ScriptedSource::chunks(&["data"]), storage.clone());

    let (status, json) = get(
        app,
        "/transfer?videoUrl=https%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3Dabc123&path=new_videos",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "new_videos/abc123.mp4");
    assert_eq!(json["url"], "s3://videos-bucket/new_videos/abc123.mp4");
}

#[tokio::test]
async fn test_missing_parameters_is_bad_request() {
    let storage = Arc::new(MemoryStorage::new(BUCKET));
    let app = app(ScriptedSource::chunks(&["data"]), storage.clone());

    let (status, json) = get(app, "/transfer?path=new_videos").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["error"],
        "You need to pass either the videoId or the videoUrl parameter"
    );
    assert!(storage.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_quality_is_bad_request() {
    let storage = Arc::new(MemoryStorage::new(BUCKET));
    let app = app(ScriptedSource::chunks(&["data"]), storage.clone());

    let (status, json) = get(app, "/transfer?videoId=abc&quality=8k").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid quality"));
    assert!(storage.calls().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_is_bad_request() {
    let storage = Arc::new(MemoryStorage::new(BUCKET));
    let app = app(ScriptedSource::failing_open("Video unavailable"), storage);

    let (status, json) = get(app, "/transfer?videoId=gone").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Video fetch failed: Video unavailable");
}

#[tokio::test]
async fn test_upload_failure_is_bad_request() {
    let mut storage = MemoryStorage::new(BUCKET);
    storage.fail_part = Some(1);
    let storage = Arc::new(storage);
    let app = app(ScriptedSource::chunks(&["data"]), storage.clone());

    let (status, json) = get(app, "/transfer?videoId=abc").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Upload failed:"));
    assert_eq!(storage.aborted(), vec!["abc.mp4".to_string()]);
}

#[tokio::test]
async fn test_health_and_request_id() {
    let storage = Arc::new(MemoryStorage::new(BUCKET));
    let app = app(ScriptedSource::chunks(&[]), storage);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["bucket"], "videos-bucket");
    assert_eq!(json["source"], "scripted");
}
