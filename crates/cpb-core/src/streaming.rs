//! Measurement frames as an async stream.
//!
//! Notification handlers run synchronously inside the transport, so frames
//! are handed over through an unbounded channel: every notification produces
//! exactly one item and nothing is dropped while the stream is alive.
//!
//! The stream ends once every [`MeasurementSink`] is gone, which happens when
//! the transport tears the subscription down (for example on disconnect).

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use cpb_types::MeasurementFrame;

use crate::error::Error;

/// Result type for stream items.
pub type MeasurementResult = std::result::Result<MeasurementFrame, Error>;

/// Sending half handed to the notification handler.
#[derive(Debug, Clone)]
pub struct MeasurementSink {
    sender: mpsc::UnboundedSender<MeasurementResult>,
}

impl MeasurementSink {
    /// Forward one result. Returns `false` if the stream has been dropped.
    pub fn send(&self, result: MeasurementResult) -> bool {
        if self.sender.send(result).is_err() {
            debug!("Measurement stream dropped, discarding frame");
            return false;
        }
        true
    }

    /// Whether the receiving stream is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A stream of measurement frames from one service's main characteristic.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let (version, characteristic, mut frames) = enabler.enable_stream().await?;
/// while let Some(result) = frames.next().await {
///     match result {
///         Ok(frame) => println!("{} bytes from {}", frame.len(), frame.peripheral),
///         Err(e) => eprintln!("Notification error: {}", e),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct MeasurementStream {
    receiver: mpsc::UnboundedReceiver<MeasurementResult>,
}

impl MeasurementStream {
    /// Create a connected sink/stream pair.
    pub fn channel() -> (MeasurementSink, MeasurementStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (MeasurementSink { sender }, MeasurementStream { receiver })
    }

    /// Receive the next result, or `None` once every sink is gone.
    pub async fn recv(&mut self) -> Option<MeasurementResult> {
        self.receiver.recv().await
    }

    /// Receive a result if one is already queued.
    pub fn try_recv(&mut self) -> Option<MeasurementResult> {
        self.receiver.try_recv().ok()
    }

    /// Stop accepting new frames. Queued frames can still be received.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for MeasurementStream {
    type Item = MeasurementResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (sink, stream) = MeasurementStream::channel();
        for i in 0..5u8 {
            assert!(sink.send(Ok(MeasurementFrame::new(vec![i], "peripheral"))));
        }
        drop(sink);

        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.into_iter().enumerate() {
            assert_eq!(frame.unwrap().data[0], i as u8);
        }
    }

    #[tokio::test]
    async fn test_errors_are_items() {
        let (sink, mut stream) = MeasurementStream::channel();
        sink.send(Err(Error::transport("notification lost")));
        match stream.recv().await {
            Some(Err(Error::Transport(msg))) => assert_eq!(msg, "notification lost"),
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn test_send_after_stream_dropped() {
        let (sink, stream) = MeasurementStream::channel();
        drop(stream);
        assert!(sink.is_closed());
        assert!(!sink.send(Ok(MeasurementFrame::new(vec![1u8], "p"))));
    }

    #[test]
    fn test_close_keeps_queued_frames() {
        let (sink, mut stream) = MeasurementStream::channel();
        sink.send(Ok(MeasurementFrame::new(vec![1u8], "p")));
        stream.close();
        assert!(!sink.send(Ok(MeasurementFrame::new(vec![2u8], "p"))));
        assert!(matches!(stream.try_recv(), Some(Ok(_))));
        assert!(stream.try_recv().is_none());
    }
}
