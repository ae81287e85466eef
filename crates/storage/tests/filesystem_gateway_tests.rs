// Multipart behaviour of the filesystem gateway: staging, assembly order,
// etag verification and abort semantics.

mod common;

use bytes::{Bytes, BytesMut};
use common::{seeded_bytes, sha256_hash, split_parts};
use std::collections::HashMap;
use tempfile::TempDir;
use vault_storage::{
    CompletedPartRef, FilesystemGateway, MultipartGateway, ORIGINAL_FILENAME_METADATA,
    StorageError,
};

const KEY: &str = "users/alice/0b5e4f0c-2f6a-4f43-9d8a-3b1d2d0c9e11.bin";

async fn gateway() -> (FilesystemGateway, TempDir) {
    let dir = TempDir::new().unwrap();
    let gateway = FilesystemGateway::new(dir.path()).await.unwrap();
    (gateway, dir)
}

async fn open_upload(gateway: &FilesystemGateway) -> String {
    let metadata = HashMap::from([(
        ORIGINAL_FILENAME_METADATA.to_string(),
        "holiday.bin".to_string(),
    )]);
    gateway
        .create_multipart_upload(KEY, "application/octet-stream", &metadata)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_out_of_order_parts_assemble_in_part_order() {
    let (gateway, dir) = gateway().await;
    let upload_id = open_upload(&gateway).await;

    let payload = seeded_bytes(1, 25_000);
    let parts = split_parts(&payload, 10_000);

    // Send the parts back to front.
    let mut etags = vec![String::new(); parts.len()];
    for (idx, part) in parts.iter().enumerate().rev() {
        etags[idx] = gateway
            .upload_part(KEY, &upload_id, idx as u32 + 1, part.clone())
            .await
            .unwrap();
        assert_eq!(etags[idx], sha256_hash(part));
    }

    let completed: Vec<_> = etags
        .iter()
        .enumerate()
        .map(|(idx, etag)| CompletedPartRef {
            part_number: idx as u32 + 1,
            etag: etag.clone(),
        })
        .collect();
    gateway
        .complete_multipart_upload(KEY, &upload_id, &completed)
        .await
        .unwrap();

    let stored = std::fs::read(dir.path().join(KEY)).unwrap();
    assert_eq!(Bytes::from(stored), payload);

    let meta = gateway.head(KEY).await.unwrap();
    assert_eq!(meta.size, 25_000);

    // Staging is cleaned up once the object exists.
    let staging = dir.path().join(".multipart").join(&upload_id);
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_reupload_replaces_part() {
    let (gateway, dir) = gateway().await;
    let upload_id = open_upload(&gateway).await;

    gateway
        .upload_part(KEY, &upload_id, 1, Bytes::from_static(b"first"))
        .await
        .unwrap();
    let etag = gateway
        .upload_part(KEY, &upload_id, 1, Bytes::from_static(b"second"))
        .await
        .unwrap();

    gateway
        .complete_multipart_upload(
            KEY,
            &upload_id,
            &[CompletedPartRef {
                part_number: 1,
                etag,
            }],
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(dir.path().join(KEY)).unwrap(), b"second");
}

#[tokio::test]
async fn test_complete_rejects_mismatched_etag() {
    let (gateway, dir) = gateway().await;
    let upload_id = open_upload(&gateway).await;

    gateway
        .upload_part(KEY, &upload_id, 1, Bytes::from_static(b"data"))
        .await
        .unwrap();

    let err = gateway
        .complete_multipart_upload(
            KEY,
            &upload_id,
            &[CompletedPartRef {
                part_number: 1,
                etag: sha256_hash(b"other"),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidPart(_)), "got {err:?}");

    // Nothing was published and the upload can still be completed.
    assert!(!dir.path().join(KEY).exists());
    gateway
        .complete_multipart_upload(
            KEY,
            &upload_id,
            &[CompletedPartRef {
                part_number: 1,
                etag: sha256_hash(b"data"),
            }],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_complete_rejects_missing_or_unordered_parts() {
    let (gateway, _dir) = gateway().await;
    let upload_id = open_upload(&gateway).await;

    let etag = gateway
        .upload_part(KEY, &upload_id, 1, Bytes::from_static(b"one"))
        .await
        .unwrap();

    let missing = gateway
        .complete_multipart_upload(
            KEY,
            &upload_id,
            &[
                CompletedPartRef {
                    part_number: 1,
                    etag: etag.clone(),
                },
                CompletedPartRef {
                    part_number: 2,
                    etag: sha256_hash(b"two"),
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::InvalidPart(_)));

    let unordered = gateway
        .complete_multipart_upload(
            KEY,
            &upload_id,
            &[
                CompletedPartRef {
                    part_number: 2,
                    etag: etag.clone(),
                },
                CompletedPartRef {
                    part_number: 1,
                    etag,
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(unordered, StorageError::InvalidPart(_)));

    let empty = gateway
        .complete_multipart_upload(KEY, &upload_id, &[])
        .await
        .unwrap_err();
    assert!(matches!(empty, StorageError::InvalidPart(_)));
}

#[tokio::test]
async fn test_part_number_bounds() {
    let (gateway, _dir) = gateway().await;
    let upload_id = open_upload(&gateway).await;

    for part_number in [0, 10_001] {
        let err = gateway
            .upload_part(KEY, &upload_id, part_number, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPart(_)));
    }
}

#[tokio::test]
async fn test_upload_is_bound_to_its_key() {
    let (gateway, _dir) = gateway().await;
    let upload_id = open_upload(&gateway).await;

    let err = gateway
        .upload_part("users/mallory/x.bin", &upload_id, 1, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UploadNotFound(_)));
}

#[tokio::test]
async fn test_abort_is_idempotent_and_discards_parts() {
    let (gateway, dir) = gateway().await;
    let upload_id = open_upload(&gateway).await;

    gateway
        .upload_part(KEY, &upload_id, 1, Bytes::from_static(b"data"))
        .await
        .unwrap();

    gateway.abort_multipart_upload(KEY, &upload_id).await.unwrap();
    gateway.abort_multipart_upload(KEY, &upload_id).await.unwrap();
    gateway
        .abort_multipart_upload(KEY, "not-an-upload-id")
        .await
        .unwrap();

    assert!(!dir.path().join(".multipart").join(&upload_id).exists());

    let err = gateway
        .upload_part(KEY, &upload_id, 2, Bytes::from_static(b"late"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UploadNotFound(_)));
}

#[tokio::test]
async fn test_list_reports_sizes_under_prefix_only() {
    let (gateway, _dir) = gateway().await;

    for (key, len) in [
        ("users/alice/a.bin", 10usize),
        ("users/alice/b.bin", 20),
        ("users/bob/c.bin", 30),
    ] {
        let upload_id = gateway
            .create_multipart_upload(key, "application/octet-stream", &HashMap::new())
            .await
            .unwrap();
        let mut body = BytesMut::new();
        body.extend_from_slice(&seeded_bytes(len as u64, len));
        let body = body.freeze();
        let etag = gateway
            .upload_part(key, &upload_id, 1, body)
            .await
            .unwrap();
        gateway
            .complete_multipart_upload(
                key,
                &upload_id,
                &[CompletedPartRef {
                    part_number: 1,
                    etag,
                }],
            )
            .await
            .unwrap();
    }

    let listed = gateway.list("users/alice/").await.unwrap();
    let summary: Vec<_> = listed.iter().map(|o| (o.key.as_str(), o.size)).collect();
    assert_eq!(
        summary,
        vec![("users/alice/a.bin", 10), ("users/alice/b.bin", 20)]
    );

    assert!(gateway.list("users/nobody/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_and_head_missing() {
    let (gateway, _dir) = gateway().await;

    assert!(matches!(
        gateway.delete("users/alice/missing.bin").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        gateway.head("users/alice/missing.bin").await,
        Err(StorageError::NotFound(_))
    ));
}
