use crate::config::RelayConfig;
use crate::models::UploadProgress;
use crate::services::relay::RelayError;
use crate::services::source::ProducerError;
use crate::services::storage::{CompletedPartInfo, ObjectStorage};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub part_size: usize,
    /// Parts in flight at once
    pub concurrency: usize,
    /// Covers initiating, streaming the parts and completing the upload
    pub deadline: Option<Duration>,
    pub scheme: String,
}

impl From<&RelayConfig> for UploadOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            part_size: config.part_size,
            concurrency: config.upload_concurrency,
            deadline: config.transfer_timeout,
            scheme: config.storage_scheme.clone(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The byte stream feeding the upload failed.
    #[error("{0}")]
    Producer(#[from] ProducerError),

    #[error("{0}")]
    Storage(String),

    #[error("transfer deadline of {0:?} exceeded")]
    TimedOut(Duration),

    /// A programming fault such as a panicked part task.
    #[error("{0}")]
    Internal(String),
}

impl From<RelayError> for UploadError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Producer(e) => UploadError::Producer(e),
            RelayError::Crashed(msg) => UploadError::Internal(msg),
        }
    }
}

/// Where a finished object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLocator {
    pub bucket: String,
    pub key: String,
    pub url: String,
}

/// Splits a byte stream into fixed-size parts and stores them as one object.
pub struct ChunkedUploader {
    storage: Arc<dyn ObjectStorage>,
    options: UploadOptions,
    progress: Option<watch::Sender<UploadProgress>>,
}

type PartTask = Result<CompletedPartInfo, UploadError>;

/// Per-upload bookkeeping shared by the part dispatch and drain steps.
struct PartTracker {
    tasks: JoinSet<PartTask>,
    completed: Vec<CompletedPartInfo>,
    next_part: i32,
    loaded: u64,
}

impl ChunkedUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, options: UploadOptions) -> Self {
        Self {
            storage,
            options,
            progress: None,
        }
    }

    /// Publish an [`UploadProgress`] snapshot after each acknowledged part.
    pub fn with_progress(mut self, progress: watch::Sender<UploadProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn locator_for(&self, key: &str) -> UploadLocator {
        let bucket = self.storage.bucket().to_string();
        UploadLocator {
            url: format!("{}://{}/{}", self.options.scheme, bucket, key),
            bucket,
            key: key.to_string(),
        }
    }

    /// Upload `body` to `key`. The multipart upload is completed only when the
    /// stream ended cleanly and every part was stored; otherwise it is aborted.
    pub async fn upload<S, E>(&self, key: &str, body: S) -> Result<UploadLocator, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
        E: Into<UploadError>,
    {
        let started = Instant::now();
        let deadline = self.options.deadline.map(|limit| (limit, started + limit));

        let create = async {
            self.storage
                .create_multipart_upload(key)
                .await
                .map_err(storage_error)
        };
        // Nothing to abort yet if this fails.
        let upload_id = within(deadline, create).await?;

        info!(
            key = %key,
            upload_id = %upload_id,
            part_size = self.options.part_size,
            concurrency = self.options.concurrency,
            "Started multipart upload"
        );

        let work = async {
            let parts = self.upload_parts(key, &upload_id, body).await?;
            self.storage
                .complete_multipart_upload(key, &upload_id, &parts)
                .await
                .map_err(storage_error)?;
            Ok::<_, UploadError>(parts)
        };

        match within(deadline, work).await {
            Ok(parts) => {
                let total: u64 = parts.iter().map(|p| p.size).sum();
                info!(
                    key = %key,
                    parts = parts.len(),
                    bytes = total,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Completed multipart upload"
                );
                Ok(self.locator_for(key))
            }
            Err(e) => {
                warn!(key = %key, upload_id = %upload_id, "Multipart upload failed: {}", e);
                self.abort(key, &upload_id).await;
                Err(e)
            }
        }
    }

    async fn upload_parts<S, E>(
        &self,
        key: &str,
        upload_id: &str,
        mut body: S,
    ) -> Result<Vec<CompletedPartInfo>, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
        E: Into<UploadError>,
    {
        let part_size = self.options.part_size.max(1);
        let mut buffer = BytesMut::new();
        let mut tracker = PartTracker {
            tasks: JoinSet::new(),
            completed: Vec::new(),
            next_part: 1,
            loaded: 0,
        };

        // Returning early drops the JoinSet, which cancels parts still in flight.
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(Into::into)?;
            buffer.extend_from_slice(&chunk);
            while buffer.len() >= part_size {
                let part = buffer.split_to(part_size).freeze();
                self.dispatch(&mut tracker, key, upload_id, part).await?;
            }
        }

        // The tail, or a single empty part for an empty stream.
        if !buffer.is_empty() || tracker.next_part == 1 {
            let part = buffer.split().freeze();
            self.dispatch(&mut tracker, key, upload_id, part).await?;
        }

        while let Some(joined) = tracker.tasks.join_next().await {
            self.record(&mut tracker, key, joined)?;
        }

        let mut parts = tracker.completed;
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    /// Start uploading one part, first waiting for a free slot if the
    /// concurrency limit is reached.
    async fn dispatch(
        &self,
        tracker: &mut PartTracker,
        key: &str,
        upload_id: &str,
        part: Bytes,
    ) -> Result<(), UploadError> {
        while tracker.tasks.len() >= self.options.concurrency.max(1) {
            match tracker.tasks.join_next().await {
                Some(joined) => self.record(tracker, key, joined)?,
                None => break,
            }
        }

        let part_number = tracker.next_part;
        tracker.next_part += 1;
        debug!(key = %key, part_number, size = part.len(), "Uploading part");

        let storage = self.storage.clone();
        let key = key.to_string();
        let upload_id = upload_id.to_string();
        tracker.tasks.spawn(async move {
            storage
                .upload_part(&key, &upload_id, part_number, part)
                .await
                .map_err(|e| UploadError::Storage(format!("part {}: {:#}", part_number, e)))
        });
        Ok(())
    }

    fn record(
        &self,
        tracker: &mut PartTracker,
        key: &str,
        joined: Result<PartTask, tokio::task::JoinError>,
    ) -> Result<(), UploadError> {
        let part = joined
            .map_err(|e| UploadError::Internal(format!("part upload task failed: {}", e)))??;

        tracker.loaded += part.size;
        let progress = UploadProgress {
            key: key.to_string(),
            loaded: tracker.loaded,
            part: part.part_number,
            total_parts_started: tracker.next_part - 1,
        };
        info!(
            key = %key,
            loaded = progress.loaded,
            part = progress.part,
            total = progress.total_parts_started,
            "Copying video ..."
        );
        if let Some(tx) = &self.progress {
            tx.send_replace(progress);
        }

        tracker.completed.push(part);
        Ok(())
    }

    async fn abort(&self, key: &str, upload_id: &str) {
        match self.storage.abort_multipart_upload(key, upload_id).await {
            Ok(()) => info!(key = %key, upload_id = %upload_id, "Aborted multipart upload"),
            Err(e) => warn!(
                key = %key,
                upload_id = %upload_id,
                "Failed to abort multipart upload: {:#}",
                e
            ),
        }
    }
}

/// Run `fut` against the upload deadline, if one is set.
async fn within<T, F>(deadline: Option<(Duration, Instant)>, fut: F) -> Result<T, UploadError>
where
    F: Future<Output = Result<T, UploadError>>,
{
    match deadline {
        Some((limit, at)) => tokio::time::timeout_at(at, fut)
            .await
            .unwrap_or(Err(UploadError::TimedOut(limit))),
        None => fut.await,
    }
}

fn storage_error(e: anyhow::Error) -> UploadError {
    UploadError::Storage(format!("{:#}", e))
}
