//! S3 integration tests.

use vedit_storage::{ObjectStore, S3Client, StorageError};

/// Upload a file and stream it back.
#[tokio::test]
#[ignore = "requires S3"]
async fn test_upload_download_cycle() {
    dotenvy::dotenv().ok();

    let client = S3Client::from_env().expect("Failed to create client");
    client
        .check_connectivity()
        .await
        .expect("Bucket not reachable");

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("clip.mp4");
    std::fs::write(&src, b"not really a video").unwrap();

    let key = format!("integration/{}/clip.mp4", std::process::id());
    let stored = client.upload(&src, &key).await.expect("Upload failed");
    assert_eq!(stored, key);

    let dest = dir.path().join("nested/out.mp4");
    let path = client.download(&key, &dest).await.expect("Download failed");
    assert_eq!(std::fs::read(path).unwrap(), b"not really a video");
}

/// Missing keys map to NotFound.
#[tokio::test]
#[ignore = "requires S3"]
async fn test_missing_key() {
    dotenvy::dotenv().ok();

    let client = S3Client::from_env().expect("Failed to create client");
    let dir = tempfile::tempdir().unwrap();

    let result = client
        .download("integration/definitely-missing.mp4", &dir.path().join("x"))
        .await;
    assert!(matches!(result, Err(StorageError::NotFound(_))));
}
