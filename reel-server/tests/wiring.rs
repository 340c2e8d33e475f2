use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use reel_blob::{MemoryObjectStore, MultipartObjectStore};
use reel_core::ReelConfig;
use reel_server::{build, build_with_remote, defaults, Settings};
use tower::ServiceExt;

fn settings_for(root: &std::path::Path, extra: &[(&str, &str)]) -> Settings {
    let mut config: ReelConfig = defaults();
    config.set("media.root", root.to_string_lossy().to_string());
    for (k, v) in extra {
        config.set(*k, *v);
    }
    Settings::from_config(&config)
}

#[tokio::test]
async fn serves_ranges_from_configured_root() {
    let dir = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(dir.path().join("clip.mp4"), &data).unwrap();

    let app = build(&settings_for(dir.path(), &[]));
    let res = app
        .router
        .oneshot(
            Request::get("/stream?fileName=clip.mp4")
                .header(header::RANGE, "bytes=100-199")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes 100-199/4096");
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &data[100..200]);
}

#[tokio::test]
async fn remote_route_uses_attached_store() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path(), &[("remote.prefix", "clips/")]);
    let store = Arc::new(MemoryObjectStore::new());
    let remote: Arc<dyn MultipartObjectStore> = store.clone();
    let app = build_with_remote(&settings, Some(remote));

    let boundary = "wiring-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"remote-bytes");
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let res = app
        .router
        .oneshot(
            Request::post("/upload/remote")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(store.object("clips/a.mp4").unwrap().as_ref(), b"remote-bytes");
}

#[tokio::test]
async fn remote_route_unavailable_without_store() {
    let dir = tempfile::tempdir().unwrap();
    let app = build(&settings_for(dir.path(), &[]));
    let res = app
        .router
        .oneshot(
            Request::post("/upload/remote")
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
                .body(Body::from("--x--\r\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn configured_origins_limit_cors() {
    let dir = tempfile::tempdir().unwrap();
    let app = build(&settings_for(dir.path(), &[("http.cors_origins", "https://player.example")]));

    let preflight = |origin: &'static str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/stream/region/clip.mp4")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap()
    };

    let allowed = app.router.clone().oneshot(preflight("https://player.example")).await.unwrap();
    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://player.example"
    );

    let other = app.router.oneshot(preflight("https://elsewhere.example")).await.unwrap();
    assert!(other.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn configured_window_applies_to_region_route() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("clip.mp4"), vec![7u8; 4096]).unwrap();
    let app = build(&settings_for(dir.path(), &[("stream.window_kb", "1")]));

    let res = app
        .router
        .oneshot(Request::get("/stream/region/clip.mp4").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes 0-1023/4096");
}
