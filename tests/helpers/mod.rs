#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Poll;
use video_stream_relay::config::RelayConfig;
use video_stream_relay::models::Quality;
use video_stream_relay::services::source::{ProducerError, VideoSource, VideoStream};
use video_stream_relay::services::storage::{CompletedPartInfo, ObjectStorage};

pub const BUCKET: &str = "videos-bucket";

/// Small parts so a few bytes exercise the multipart path.
pub fn test_config() -> RelayConfig {
    RelayConfig {
        bucket_name: BUCKET.to_string(),
        part_size: 4,
        upload_concurrency: 2,
        relay_capacity: 2,
        ..RelayConfig::default()
    }
}

#[derive(Default)]
struct PendingUpload {
    key: String,
    parts: BTreeMap<i32, Bytes>,
}

#[derive(Default)]
struct StorageState {
    next_id: usize,
    pending: HashMap<String, PendingUpload>,
    objects: HashMap<String, Bytes>,
    aborted: Vec<String>,
    calls: Vec<String>,
}

/// In-memory multipart store with failure injection.
pub struct MemoryStorage {
    bucket: String,
    state: Mutex<StorageState>,
    pub fail_create: bool,
    pub fail_part: Option<i32>,
    pub fail_complete: bool,
    pub stall_create: bool,
    pub panic_part: Option<i32>,
}

impl MemoryStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Mutex::new(StorageState::default()),
            fail_create: false,
            fail_part: None,
            fail_complete: false,
            stall_create: false,
            panic_part: None,
        }
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.state.lock().unwrap().aborted.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn parts_uploaded(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("upload_part"))
            .count()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        if self.stall_create {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create:{}", key));
        if self.fail_create {
            return Err(anyhow!("AccessDenied: bucket is read-only"));
        }
        state.next_id += 1;
        let upload_id = format!("upload-{}", state.next_id);
        state.pending.insert(
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
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPartInfo> {
        // Let other parts interleave like real network calls would.
        tokio::task::yield_now().await;
        // Before taking the lock, so the state stays usable for the abort.
        if self.panic_part == Some(part_number) {
            panic!("part {} handler bug", part_number);
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("upload_part:{}:{}", key, part_number));
        if self.fail_part == Some(part_number) {
            return Err(anyhow!("SlowDown: quota exceeded"));
        }
        let pending = state
            .pending
            .get_mut(upload_id)
            .ok_or_else(|| anyhow!("NoSuchUpload: {}", upload_id))?;
        let size = body.len() as u64;
        pending.parts.insert(part_number, body);
        Ok(CompletedPartInfo {
            part_number,
            e_tag: Some(format!("etag-{}", part_number)),
            size,
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("complete:{}", key));
        if self.fail_complete {
            return Err(anyhow!("InternalError: please retry"));
        }
        let pending = state
            .pending
            .remove(upload_id)
            .ok_or_else(|| anyhow!("NoSuchUpload: {}", upload_id))?;

        let numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        let stored: Vec<i32> = pending.parts.keys().copied().collect();
        if numbers != stored {
            return Err(anyhow!("InvalidPart: {:?} != {:?}", numbers, stored));
        }

        let mut data = BytesMut::new();
        for body in pending.parts.values() {
            data.extend_from_slice(body);
        }
        state.objects.insert(pending.key, data.freeze());
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("abort:{}", key));
        state.pending.remove(upload_id);
        state.aborted.push(key.to_string());
        Ok(())
    }
}

/// Source that replays a fixed script of chunks and errors.
pub struct ScriptedSource {
    items: Vec<Result<Bytes, ProducerError>>,
    open_error: Option<ProducerError>,
    opened: AtomicUsize,
    last_quality: Mutex<Option<Quality>>,
}

impl ScriptedSource {
    pub fn chunks(chunks: &[&'static str]) -> Self {
        Self::script(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect(),
        )
    }

    pub fn script(items: Vec<Result<Bytes, ProducerError>>) -> Self {
        Self {
            items,
            open_error: None,
            opened: AtomicUsize::new(0),
            last_quality: Mutex::new(None),
        }
    }

    pub fn failing_open(message: &str) -> Self {
        Self {
            open_error: Some(ProducerError::new(message)),
            ..Self::script(Vec::new())
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_quality(&self) -> Option<Quality> {
        *self.last_quality.lock().unwrap()
    }
}

#[async_trait]
impl VideoSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, _url: &str, quality: Quality) -> Result<VideoStream, ProducerError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last_quality.lock().unwrap() = Some(quality);
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        Ok(stream::iter(self.items.clone()).boxed())
    }
}

/// Source that never produces a byte.
pub struct StalledSource;

#[async_trait]
impl VideoSource for StalledSource {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn open(&self, _url: &str, _quality: Quality) -> Result<VideoStream, ProducerError> {
        Ok(stream::pending().boxed())
    }
}

/// Source with a programming fault.
pub struct PanickingSource;

#[async_trait]
impl VideoSource for PanickingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn open(&self, _url: &str, _quality: Quality) -> Result<VideoStream, ProducerError> {
        panic!("source blew up");
    }
}

/// Source that streams some chunks and then panics mid-stream.
pub struct CrashingSource {
    chunks: Vec<&'static str>,
}

impl CrashingSource {
    pub fn after(chunks: &[&'static str]) -> Self {
        Self {
            chunks: chunks.to_vec(),
        }
    }
}

#[async_trait]
impl VideoSource for CrashingSource {
    fn name(&self) -> &str {
        "crashing"
    }

    async fn open(&self, _url: &str, _quality: Quality) -> Result<VideoStream, ProducerError> {
        let chunks: Vec<Result<Bytes, ProducerError>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        let crash = stream::poll_fn(|_| -> Poll<Option<Result<Bytes, ProducerError>>> {
            panic!("demuxer bug")
        });
        Ok(stream::iter(chunks).chain(crash).boxed())
    }
}
