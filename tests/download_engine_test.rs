// tests/download_engine_test.rs

use czds_dl::client::ApiClient;
use czds_dl::config::AppConfig;
use czds_dl::downloader::{DiskGate, DiskSpaceProbe, DownloadEngine, Downloader};
use czds_dl::error::AppError;
use czds_dl::models::DownloadTarget;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct UnknownDisk;

impl DiskSpaceProbe for UnknownDisk {
    fn available_bytes(&self, _dir: &Path) -> Option<u64> {
        None
    }
}

fn engine() -> DownloadEngine {
    let config = Arc::new(AppConfig::default());
    let client = Arc::new(ApiClient::new(config.clone()).expect("Failed to create client"));
    DownloadEngine::new(client, DiskGate::new(Arc::new(UnknownDisk), config.disk.clone()))
}

fn target(server_url: &str, dir: &Path) -> DownloadTarget {
    DownloadTarget {
        tld: "example.zone".into(),
        source_url: format!("{}/czds/downloads/example.zone", server_url),
        local_path: dir.join("2024-05-01-example.zone.gz"),
    }
}

fn partial_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".part"))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_commits_exact_path() {
    let mut server = mockito::Server::new_async().await;
    let body = vec![7u8; 64 * 1024];
    let head = server
        .mock("HEAD", "/czds/downloads/example.zone")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("Content-Disposition", "attachment;filename=example.txt.gz")
        .create_async()
        .await;
    let get = server
        .mock("GET", "/czds/downloads/example.zone")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_body(&body)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = target(&server.url(), dir.path());

    let report = engine()
        .download(&target, "tok", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.bytes, body.len() as u64);
    assert_eq!(report.original_file_name, "example.txt.gz");
    assert_eq!(fs::read(&target.local_path).unwrap(), body);
    assert!(partial_files(dir.path()).is_empty());
    head.assert_async().await;
    get.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_existing_file_is_never_overwritten() {
    let mut server = mockito::Server::new_async().await;
    let head = server
        .mock("HEAD", "/czds/downloads/example.zone")
        .expect(0)
        .create_async()
        .await;
    let get = server
        .mock("GET", "/czds/downloads/example.zone")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = target(&server.url(), dir.path());
    fs::write(&target.local_path, b"original").unwrap();

    let err = engine()
        .download(&target, "tok", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AlreadyExists(ref p) if p == &target.local_path));
    assert_eq!(fs::read(&target.local_path).unwrap(), b"original");
    head.assert_async().await;
    get.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_transfer_leaves_no_file() {
    let mut server = mockito::Server::new_async().await;
    let _head = server
        .mock("HEAD", "/czds/downloads/example.zone")
        .with_status(200)
        .create_async()
        .await;
    let _get = server
        .mock("GET", "/czds/downloads/example.zone")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = target(&server.url(), dir.path());

    let err = engine()
        .download(&target, "tok", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::HttpStatus { status, .. } if status.as_u16() == 500));
    assert!(!err.is_fatal());
    assert!(!target.local_path.exists());
    assert!(partial_files(dir.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_head_failure_is_reported_with_status() {
    let mut server = mockito::Server::new_async().await;
    let _head = server
        .mock("HEAD", "/czds/downloads/example.zone")
        .with_status(404)
        .create_async()
        .await;
    let get = server
        .mock("GET", "/czds/downloads/example.zone")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = target(&server.url(), dir.path());

    let err = engine()
        .download(&target, "tok", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.status_code().map(|s| s.as_u16()), Some(404));
    assert!(!target.local_path.exists());
    get.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_interrupts_unresponsive_server() {
    // 接受连接但从不响应
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let target = target(&format!("http://{}", addr), dir.path());
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let err = engine().download(&target, "tok", &cancel).await.unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    // 测试配置的请求超时为 15 秒
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert!(!target.local_path.exists());
}
