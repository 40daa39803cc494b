use crate::services::source::{ProducerError, VideoStream};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error(transparent)]
    Producer(#[from] ProducerError),

    /// The feeder died before the producer finished, e.g. on a panic.
    #[error("video relay crashed: {0}")]
    Crashed(String),
}

/// Consumer side of the pass-through buffer.
///
/// Holds at most `capacity` chunks. While it is full the feeder task waits,
/// which in turn stops it from polling the producer.
pub struct RelayReceiver {
    rx: mpsc::Receiver<Result<Bytes, ProducerError>>,
    relayed: Arc<AtomicU64>,
    feeder: JoinHandle<()>,
    feeder_done: bool,
}

/// Start relaying `source` through a buffer of `capacity` chunks.
pub fn relay(mut source: VideoStream, capacity: usize) -> RelayReceiver {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let relayed = Arc::new(AtomicU64::new(0));
    let counter = relayed.clone();

    let feeder = tokio::spawn(async move {
        while let Some(item) = source.next().await {
            let failed = item.is_err();
            if let Ok(chunk) = &item {
                counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }

            if tx.send(item).await.is_err() {
                tracing::debug!("relay receiver dropped; stopping feeder");
                return;
            }

            // An error is the producer's last word.
            if failed {
                return;
            }
        }
        tracing::debug!(
            bytes = counter.load(Ordering::Relaxed),
            "producer finished; closing relay"
        );
    });

    RelayReceiver {
        rx,
        relayed,
        feeder,
        feeder_done: false,
    }
}

impl RelayReceiver {
    /// Bytes the feeder accepted from the producer so far.
    pub fn bytes_relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }
}

impl Stream for RelayReceiver {
    type Item = Result<Bytes, RelayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(item) = ready!(self.rx.poll_recv(cx)) {
            return Poll::Ready(Some(item.map_err(RelayError::from)));
        }
        if self.feeder_done {
            return Poll::Ready(None);
        }

        // The channel closes when the feeder drops its sender, which happens
        // both on a clean finish and while a panic unwinds. Only the join
        // result tells the two apart.
        let joined = ready!(Pin::new(&mut self.feeder).poll(cx));
        self.feeder_done = true;
        match joined {
            Ok(()) => Poll::Ready(None),
            Err(e) => {
                tracing::error!("relay feeder failed: {}", e);
                Poll::Ready(Some(Err(RelayError::Crashed(e.to_string()))))
            }
        }
    }
}

impl Drop for RelayReceiver {
    fn drop(&mut self) {
        // Releases the producer (and its child process) without waiting for
        // the next send to notice the closed channel.
        self.feeder.abort();
    }
}
