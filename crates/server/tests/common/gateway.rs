//! In-memory multipart gateway with call counters and failure injection.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;
use vault_storage::{
    CompletedPartRef, MultipartGateway, ObjectMeta, ObjectSummary, StorageError, StorageResult,
};

/// Pause point inside `complete_multipart_upload`, after the object is stored.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct CompleteGate {
    /// Notified once the remote object exists.
    pub reached: Arc<Notify>,
    /// Notify to let the paused call return.
    pub resume: Arc<Notify>,
}

struct PendingUpload {
    key: String,
    parts: BTreeMap<u32, (String, Bytes)>,
}

/// Mock gateway recording every call.
///
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockGateway {
    uploads: Mutex<HashMap<String, PendingUpload>>,
    objects: Mutex<HashMap<String, Bytes>>,
    etag_counter: AtomicUsize,

    pub create_calls: AtomicUsize,
    pub upload_part_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    pub abort_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,

    pub fail_create: AtomicBool,
    pub fail_upload_part: AtomicBool,
    pub fail_complete: AtomicBool,
    pub fail_abort: AtomicBool,

    complete_gate: Mutex<Option<CompleteGate>>,
}

fn injected(op: &str) -> StorageError {
    StorageError::S3(format!("injected {op} failure").into())
}

#[allow(dead_code)]
impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn part_uploads(&self) -> usize {
        self.upload_part_calls.load(Ordering::SeqCst)
    }

    pub fn completes(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Make every later complete pause once its object is stored.
    pub fn pause_after_complete(&self) -> CompleteGate {
        let gate = CompleteGate::default();
        *self.complete_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_upload_part(&self, fail: bool) {
        self.fail_upload_part.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_complete(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_abort(&self, fail: bool) {
        self.fail_abort.store(fail, Ordering::SeqCst);
    }

    /// Number of multipart uploads still open.
    pub fn open_uploads(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Stored object bytes, if the key exists.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Put an object directly, bypassing the multipart flow.
    pub fn put_object(&self, key: &str, data: Bytes) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }
}

#[async_trait]
impl MultipartGateway for MockGateway {
    async fn create_multipart_upload(
        &self,
        key: &str,
        _content_type: &str,
        _metadata: &HashMap<String, String>,
    ) -> StorageResult<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("create"));
        }
        let upload_id = Uuid::new_v4().to_string();
        self.uploads.lock().unwrap().insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        self.upload_part_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload_part.load(Ordering::SeqCst) {
            return Err(injected("upload_part"));
        }
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| StorageError::UploadNotFound(upload_id.to_string()))?;
        let etag = format!(
            "etag-{part_number}-{}",
            self.etag_counter.fetch_add(1, Ordering::SeqCst)
        );
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartRef],
    ) -> StorageResult<()> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(injected("complete"));
        }
        {
            let mut uploads = self.uploads.lock().unwrap();
            let upload = uploads
                .get(upload_id)
                .filter(|u| u.key == key)
                .ok_or_else(|| StorageError::UploadNotFound(upload_id.to_string()))?;

            let mut body = BytesMut::new();
            for part in parts {
                match upload.parts.get(&part.part_number) {
                    Some((etag, data)) if *etag == part.etag => body.extend_from_slice(data),
                    _ => {
                        return Err(StorageError::InvalidPart(format!(
                            "part {} does not match",
                            part.part_number
                        )));
                    }
                }
            }

            uploads.remove(upload_id);
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), body.freeze());
        }

        let gate = self.complete_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.resume.notified().await;
        }
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(injected("abort"));
        }
        self.uploads.lock().unwrap().remove(upload_id);
        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|data| ObjectMeta {
                size: data.len() as u64,
                last_modified: None,
                content_type: None,
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        let mut listed: Vec<ObjectSummary> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| ObjectSummary {
                key: key.clone(),
                size: data.len() as u64,
            })
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
