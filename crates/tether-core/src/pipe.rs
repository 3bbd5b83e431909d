//! One direction of a duplex channel.
//!
//! A pipe carries chunks of bytes from any number of [`PipeWriter`] clones to a
//! single [`PipeReader`] over an unbounded mpsc channel. The writing side
//! completes the pipe, either cleanly or with an error; the first completion
//! wins. The reader drains buffered chunks before it observes the completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::error::{TransportError, TransportResult};

#[derive(Debug)]
enum Frame {
    Data(Bytes),
    End(Option<TransportError>),
}

/// Creates a connected writer/reader pair.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PipeWriter {
            tx,
            completed: Arc::new(AtomicBool::new(false)),
        },
        PipeReader { rx, end: None },
    )
}

/// Producing end of a pipe.
///
/// Dropping the last writer without calling [`complete`](Self::complete)
/// completes the pipe cleanly.
#[derive(Debug, Clone)]
pub struct PipeWriter {
    tx: UnboundedSender<Frame>,
    completed: Arc<AtomicBool>,
}

impl PipeWriter {
    /// Appends a chunk for the reader.
    ///
    /// Fails with [`TransportError::ChannelClosed`] once the pipe is completed or
    /// the reader is gone.
    pub fn write(&self, data: impl Into<Bytes>) -> TransportResult<()> {
        if self.completed.load(Ordering::Acquire) {
            return Err(TransportError::ChannelClosed);
        }
        self.tx
            .send(Frame::Data(data.into()))
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Completes the pipe, optionally with an error. Later completions are ignored.
    ///
    /// Returns whether this call was the one that completed the pipe.
    pub fn complete(&self, error: Option<TransportError>) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // A reader that is already gone has nothing left to observe.
        let _ = self.tx.send(Frame::End(error));
        true
    }

    /// Returns whether the pipe has been completed.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns whether the reader has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Waits until the reader has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Consuming end of a pipe.
#[derive(Debug)]
pub struct PipeReader {
    rx: UnboundedReceiver<Frame>,
    /// `Some(None)` = completed cleanly, `Some(Some(e))` = completed with `e`.
    end: Option<Option<TransportError>>,
}

impl PipeReader {
    /// Reads the next chunk.
    ///
    /// Returns `Ok(None)` once the pipe completed cleanly and the buffer is
    /// drained, or the completion error if the writer completed with one.
    pub async fn read(&mut self) -> TransportResult<Option<Bytes>> {
        if let Some(end) = &self.end {
            return terminal(end);
        }
        let frame = self.rx.recv().await;
        self.accept(frame)
    }

    /// Reads the next chunk without waiting; `None` means nothing is available yet.
    pub fn try_read(&mut self) -> Option<TransportResult<Option<Bytes>>> {
        if let Some(end) = &self.end {
            return Some(terminal(end));
        }
        match self.rx.try_recv() {
            Ok(frame) => Some(self.accept(Some(frame))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.accept(None)),
        }
    }

    /// Stops reading; further writes fail with [`TransportError::ChannelClosed`].
    pub fn close(&mut self) {
        self.rx.close();
    }

    fn accept(&mut self, frame: Option<Frame>) -> TransportResult<Option<Bytes>> {
        match frame {
            Some(Frame::Data(chunk)) => Ok(Some(chunk)),
            Some(Frame::End(error)) => {
                let result = terminal(&error);
                self.end = Some(error);
                result
            }
            // Every writer dropped without completing.
            None => {
                self.end = Some(None);
                Ok(None)
            }
        }
    }
}

fn terminal(end: &Option<TransportError>) -> TransportResult<Option<Bytes>> {
    match end {
        None => Ok(None),
        Some(err) => Err(err.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_data_then_clean_completion() {
        let (writer, mut reader) = pipe();
        writer.write("hello").unwrap();
        writer.write(Bytes::from_static(b"world")).unwrap();
        assert!(writer.complete(None));

        assert_eq!(reader.read().await.unwrap().unwrap(), "hello");
        assert_eq!(reader.read().await.unwrap().unwrap(), "world");
        assert_eq!(reader.read().await.unwrap(), None);
        assert_eq!(reader.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_completion_is_terminal() {
        let (writer, mut reader) = pipe();
        writer.complete(Some(TransportError::SendFailed("rejected".into())));
        assert!(!writer.complete(None));

        let err = reader.read().await.unwrap_err();
        assert_eq!(err, TransportError::SendFailed("rejected".into()));
        assert!(reader.read().await.is_err());
        assert!(writer.is_completed());
        assert_eq!(writer.write("late"), Err(TransportError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_buffered_chunks_precede_error() {
        let (writer, mut reader) = pipe();
        writer.write("partial").unwrap();
        writer.complete(Some(TransportError::ReceiveFailed("reset".into())));

        assert_eq!(reader.try_read(), Some(Ok(Some(Bytes::from_static(b"partial")))));
        assert!(matches!(reader.try_read(), Some(Err(TransportError::ReceiveFailed(_)))));
    }

    #[tokio::test]
    async fn test_pending_read_wakes_on_completion() {
        let (writer, mut reader) = pipe();
        let read = tokio::spawn(async move { reader.read().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!read.is_finished());

        writer.complete(Some(TransportError::ReceiveFailed("reset".into())));
        let result = read.await.unwrap();
        assert_eq!(result, Err(TransportError::ReceiveFailed("reset".into())));
    }

    #[tokio::test]
    async fn test_dropping_last_writer_completes() {
        let (writer, mut reader) = pipe();
        let clone = writer.clone();
        drop(writer);
        assert!(reader.try_read().is_none());

        drop(clone);
        assert_eq!(reader.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_reader_rejects_writes() {
        let (writer, reader) = pipe();
        let waiter = tokio::spawn({
            let writer = writer.clone();
            async move { writer.closed().await }
        });

        drop(reader);
        waiter.await.unwrap();
        assert!(writer.is_closed());
        assert_eq!(writer.write("x"), Err(TransportError::ChannelClosed));
    }
}
