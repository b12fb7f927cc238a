use std::time::Duration;

use s3::{S3BlobStore, S3Config};
use testcontainers_modules::minio::MinIO;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use vox_stt_interface::BlobStore;

async fn store(endpoint: String) -> S3BlobStore {
    let store = S3BlobStore::connect(S3Config {
        endpoint_url: Some(endpoint),
        region: "us-east-1".into(),
        access_key_id: "minioadmin".into(),
        secret_access_key: "minioadmin".into(),
        bucket: "stt-audio-files".into(),
    })
    .await
    .expect("failed to build s3 client");
    store.ensure_bucket().await.expect("failed to ensure bucket");
    store
}

#[ignore = "requires a docker daemon"]
#[tokio::test]
async fn upload_download_round_trip_against_minio() {
    let container = MinIO::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(9000).await.unwrap();
    let store = store(format!("http://127.0.0.1:{port}")).await;

    // ensure_bucket is idempotent across worker restarts
    store.ensure_bucket().await.unwrap();

    let payload = b"xin chao tu minio".to_vec();
    store
        .upload("results/result_test.txt", payload.clone(), "text/plain; charset=utf-8")
        .await
        .unwrap();

    assert!(store.exists("results/result_test.txt").await.unwrap());
    assert!(!store.exists("results/missing.txt").await.unwrap());

    let stat = store.stat("results/result_test.txt").await.unwrap();
    assert_eq!(stat.size_bytes, payload.len() as u64);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("result.txt");
    store.download("results/result_test.txt", &dest).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), payload);

    let url = store
        .presign_get("results/result_test.txt", Duration::from_secs(3600))
        .await
        .unwrap();
    assert!(url.contains("results/result_test.txt"));

    store.delete("results/result_test.txt").await.unwrap();
    assert!(!store.exists("results/result_test.txt").await.unwrap());
}
