use thiserror::Error;

/// Where in the pipeline a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Validation,
    Producer,
    Consumer,
    Unexpected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{0}")]
    Validation(String),

    #[error("Video fetch failed: {0}")]
    Producer(String),

    #[error("Upload failed: {0}")]
    Consumer(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl TransferError {
    pub fn missing_video_reference() -> Self {
        TransferError::Validation(
            "You need to pass either the videoId or the videoUrl parameter".to_string(),
        )
    }

    pub fn stage(&self) -> FailureStage {
        match self {
            TransferError::Validation(_) => FailureStage::Validation,
            TransferError::Producer(_) => FailureStage::Producer,
            TransferError::Consumer(_) => FailureStage::Consumer,
            TransferError::Unexpected(_) => FailureStage::Unexpected,
        }
    }

    /// Message exposed to the caller. Unexpected failures keep their detail in the logs.
    pub fn public_message(&self) -> String {
        match self {
            TransferError::Unexpected(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}
