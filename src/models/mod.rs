use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

/// Caller input for a single transfer. Either `videoId` or `videoUrl` must be given.
#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TransferRequest {
    /// Video id, e.g. `egs0XN-xjA0`
    pub video_id: Option<String>,
    /// Full watch URL, e.g. `https://www.youtube.com/watch?v=egs0XN-xjA0`
    pub video_url: Option<String>,
    /// Folder inside the bucket, without leading or trailing slash
    pub path: Option<String>,
    /// highest, lowest, highestaudio, lowestaudio, highestvideo or lowestvideo
    pub quality: Option<String>,
}

impl TransferRequest {
    pub fn for_video_id(video_id: impl Into<String>) -> Self {
        Self {
            video_id: Some(video_id.into()),
            ..Self::default()
        }
    }

    pub fn for_video_url(video_url: impl Into<String>) -> Self {
        Self {
            video_url: Some(video_url.into()),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Highest,
    Lowest,
    HighestAudio,
    LowestAudio,
    HighestVideo,
    LowestVideo,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Highest => "highest",
            Quality::Lowest => "lowest",
            Quality::HighestAudio => "highestaudio",
            Quality::LowestAudio => "lowestaudio",
            Quality::HighestVideo => "highestvideo",
            Quality::LowestVideo => "lowestvideo",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highest" => Ok(Quality::Highest),
            "lowest" => Ok(Quality::Lowest),
            "highestaudio" => Ok(Quality::HighestAudio),
            "lowestaudio" => Ok(Quality::LowestAudio),
            "highestvideo" => Ok(Quality::HighestVideo),
            "lowestvideo" => Ok(Quality::LowestVideo),
            other => Err(format!(
                "Invalid quality '{}': expected one of highest, lowest, highestaudio, lowestaudio, highestvideo, lowestvideo",
                other
            )),
        }
    }
}

/// Output of the source resolver: everything the pipeline needs before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: String,
    pub video_id: String,
    pub key: String,
    pub quality: Quality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub bucket_name: String,
    pub path: String,
    pub url: String,
}

/// Snapshot published after every finished part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadProgress {
    pub key: String,
    /// Bytes acknowledged by storage so far
    pub loaded: u64,
    /// Number of the part that just finished
    pub part: i32,
    /// Parts handed to storage so far, finished or not
    pub total_parts_started: i32,
}
