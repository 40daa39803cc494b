use crate::config::RelayConfig;
use crate::models::{TransferRequest, TransferResponse, UploadProgress};
use crate::services::error::TransferError;
use crate::services::relay::relay;
use crate::services::resolver;
use crate::services::source::VideoSource;
use crate::services::storage::ObjectStorage;
use crate::services::upload::{ChunkedUploader, UploadError, UploadOptions};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

/// Exactly one of these is produced per request.
pub type TransferOutcome = Result<TransferResponse, TransferError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Resolving,
    Streaming,
    Uploading,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Resolving) | (Resolving, Streaming) | (Streaming, Uploading) => true,
            (Uploading, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Lifecycle of one transfer. Once a terminal state is reached every later
/// signal is dropped, so the first error or completion is the one reported.
#[derive(Debug)]
pub struct Pipeline {
    state: PipelineState,
    outcome: Option<TransferOutcome>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            outcome: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to a non-terminal state. Returns false if the move is not allowed.
    pub fn advance(&mut self, next: PipelineState) -> bool {
        if next.is_terminal() || !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "Ignoring pipeline transition");
            return false;
        }
        self.state = next;
        true
    }

    /// Record the terminal signal. Returns false if one was already recorded.
    pub fn finish(&mut self, outcome: TransferOutcome) -> bool {
        let next = if outcome.is_ok() {
            PipelineState::Completed
        } else {
            PipelineState::Failed
        };

        if !self.state.can_transition_to(next) {
            warn!(
                state = ?self.state,
                ignored = ?outcome.as_ref().err(),
                "Ignoring late pipeline signal"
            );
            return false;
        }

        self.state = next;
        self.outcome = Some(outcome);
        true
    }

    pub fn into_outcome(self) -> TransferOutcome {
        self.outcome.unwrap_or_else(|| {
            Err(TransferError::Unexpected(format!(
                "pipeline stopped in state {:?} without an outcome",
                self.state
            )))
        })
    }
}

/// Wires the source, the relay and the uploader together for each request.
#[derive(Clone)]
pub struct TransferService {
    config: Arc<RelayConfig>,
    source: Arc<dyn VideoSource>,
    storage: Arc<dyn ObjectStorage>,
}

impl TransferService {
    pub fn new(
        config: RelayConfig,
        source: Arc<dyn VideoSource>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            source,
            storage,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub async fn transfer(&self, req: &TransferRequest) -> TransferOutcome {
        self.transfer_with_progress(req, None).await
    }

    /// Run one transfer. Faults outside the expected error paths, panics
    /// included, come back as [`TransferError::Unexpected`].
    pub async fn transfer_with_progress(
        &self,
        req: &TransferRequest,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> TransferOutcome {
        let service = self.clone();
        let req = req.clone();
        let handle = tokio::spawn(async move { service.run(req, progress).await });

        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Transfer task failed: {}", e);
                Err(TransferError::Unexpected(format!("transfer task failed: {}", e)))
            }
        }
    }

    async fn run(
        &self,
        req: TransferRequest,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> TransferOutcome {
        let mut pipeline = Pipeline::new();
        pipeline.advance(PipelineState::Resolving);

        let source = match resolver::resolve(&req) {
            Ok(source) => source,
            Err(e) => {
                pipeline.finish(Err(e));
                return pipeline.into_outcome();
            }
        };

        let span = info_span!("transfer", video_id = %source.video_id, key = %source.key);
        async move {
            let deadline = self.config.transfer_timeout.map(|d| Instant::now() + d);
            info!(url = %source.url, quality = %source.quality, "Starting transfer");

            pipeline.advance(PipelineState::Streaming);
            let open = self.source.open(&source.url, source.quality);
            let opened = match deadline {
                Some(at) => match tokio::time::timeout_at(at, open).await {
                    Ok(res) => res,
                    Err(_) => {
                        pipeline.finish(Err(deadline_exceeded(&self.config)));
                        return pipeline.into_outcome();
                    }
                },
                None => open.await,
            };
            let video = match opened {
                Ok(video) => video,
                Err(e) => {
                    pipeline.finish(Err(TransferError::Producer(e.message)));
                    return pipeline.into_outcome();
                }
            };

            let relayed = relay(video, self.config.relay_capacity);

            pipeline.advance(PipelineState::Uploading);
            let mut options = UploadOptions::from(self.config.as_ref());
            options.deadline = deadline.map(|at| at.saturating_duration_since(Instant::now()));
            let mut uploader = ChunkedUploader::new(self.storage.clone(), options);
            if let Some(progress) = progress {
                uploader = uploader.with_progress(progress);
            }

            let outcome = match uploader.upload(&source.key, relayed).await {
                Ok(locator) => Ok(TransferResponse {
                    bucket_name: locator.bucket,
                    path: locator.key,
                    url: locator.url,
                }),
                Err(UploadError::Producer(e)) => Err(TransferError::Producer(e.message)),
                Err(UploadError::Storage(msg)) => Err(TransferError::Consumer(msg)),
                Err(UploadError::TimedOut(_)) => Err(deadline_exceeded(&self.config)),
                Err(UploadError::Internal(msg)) => Err(TransferError::Unexpected(msg)),
            };

            match &outcome {
                Ok(res) => info!(url = %res.url, "Transfer completed"),
                Err(e) => warn!(stage = ?e.stage(), "Transfer failed: {}", e),
            }
            pipeline.finish(outcome);
            pipeline.into_outcome()
        }
        .instrument(span)
        .await
    }
}

fn deadline_exceeded(config: &RelayConfig) -> TransferError {
    TransferError::Unexpected(format!(
        "transfer deadline of {:?} exceeded",
        config.transfer_timeout.unwrap_or_default()
    ))
}
