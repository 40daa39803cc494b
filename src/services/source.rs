use crate::models::Quality;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::io::ReaderStream;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProducerError {
    pub message: String,
}

impl ProducerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Video payload as it arrives. An `Err` item is terminal.
pub type VideoStream = BoxStream<'static, Result<Bytes, ProducerError>>;

#[async_trait]
pub trait VideoSource: Send + Sync {
    fn name(&self) -> &str;

    /// Open the remote video. Errors before streaming starts come back here,
    /// errors during streaming arrive as the last stream item.
    async fn open(&self, url: &str, quality: Quality) -> Result<VideoStream, ProducerError>;
}

/// yt-dlp format selector for a quality choice.
pub fn format_selector(quality: Quality) -> &'static str {
    match quality {
        Quality::Highest => "best",
        Quality::Lowest => "worst",
        Quality::HighestAudio => "bestaudio",
        Quality::LowestAudio => "worstaudio",
        Quality::HighestVideo => "bestvideo",
        Quality::LowestVideo => "worstvideo",
    }
}

/// Streams a video by running yt-dlp with its output sent to stdout.
pub struct YtDlpSource {
    binary: String,
}

impl YtDlpSource {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, url: &str, quality: Quality) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--quiet",
            "--no-warnings",
            "--no-playlist",
            "--no-part",
            "-f",
            format_selector(quality),
            "-o",
            "-",
            url,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl VideoSource for YtDlpSource {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn open(&self, url: &str, quality: Quality) -> Result<VideoStream, ProducerError> {
        tracing::debug!(url = %url, format = format_selector(quality), "Spawning {}", self.binary);

        let mut child = self
            .command(url, quality)
            .spawn()
            .map_err(|e| ProducerError::new(format!("failed to start {}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProducerError::new("yt-dlp stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProducerError::new("yt-dlp stderr was not captured"))?;

        // Drain stderr concurrently so a chatty child never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut last_error: Option<String> = None;
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim().to_string();
                if !line.is_empty() {
                    tracing::debug!(target: "yt-dlp", "{}", line);
                    last_error = Some(line);
                }
            }
            last_error
        });

        let stream = async_stream::stream! {
            let mut body = ReaderStream::new(stdout);
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => yield Ok(bytes),
                    Err(e) => {
                        yield Err(ProducerError::new(format!("reading video stream: {}", e)));
                        return;
                    }
                }
            }

            let status = child.wait().await;
            let stderr_tail = stderr_task.await.ok().flatten();
            match status {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let detail = stderr_tail
                        .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
                    yield Err(ProducerError::new(detail));
                }
                Err(e) => {
                    yield Err(ProducerError::new(format!("waiting for yt-dlp: {}", e)));
                }
            }
        };

        Ok(stream.boxed())
    }
}
