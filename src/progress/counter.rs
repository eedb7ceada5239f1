//! Byte accounting for blob transfers
//!
//! Every transfer worker reports chunk sizes into an unbounded channel; a
//! single drain task owns the byte progress bar. The drain ends when the last
//! [`ByteCounter`] is dropped, so its lifetime is exactly the transfer stage.

use crate::progress::StageProgress;
use crate::registry::BlobStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct ByteCounter {
    tx: mpsc::UnboundedSender<u64>,
}

impl ByteCounter {
    /// Start the drain task. Awaiting the handle yields the total progress
    /// added, which is twice the bytes recorded: each chunk is read from the
    /// source and written to the destination.
    pub fn spawn(progress: Arc<dyn StageProgress>) -> (Self, JoinHandle<u64>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let drain = tokio::spawn(async move {
            let mut total = 0u64;
            while let Some(bytes) = rx.recv().await {
                let work = bytes * 2;
                progress.advance(work);
                total += work;
            }
            total
        });
        (Self { tx }, drain)
    }

    pub fn record(&self, bytes: u64) {
        // A closed channel means the stage is already over.
        let _ = self.tx.send(bytes);
    }
}

/// Wraps a blob stream so every chunk passing through is recorded.
pub struct CountingStream;

impl CountingStream {
    pub fn wrap(stream: BlobStream, counter: ByteCounter) -> BlobStream {
        stream
            .inspect(move |chunk| {
                if let Ok(bytes) = chunk {
                    counter.record(bytes.len() as u64);
                }
            })
            .boxed()
    }
}
