//! Input sinks and replay-latest outputs for interactive streams.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{CacheError, Result};
use crate::stream::BoxStream;

// == Stream Sink ==
/// Unbounded input side of a stream. Dropping every clone ends the pipeline.
#[derive(Debug)]
pub struct StreamSink<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for StreamSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> StreamSink<T> {
    /// Publishes one raw event.
    pub fn publish(&self, value: T) -> Result<()> {
        self.tx.send(value).map_err(|_| CacheError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Creates a sink and the stream of values published into it.
pub fn sink<T: Send + 'static>() -> (StreamSink<T>, BoxStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StreamSink { tx }, UnboundedReceiverStream::new(rx).boxed())
}

// == Stream Output ==
/// Replay-latest output: every subscriber sees the most recent value
/// without re-running upstream work.
#[derive(Debug)]
pub struct StreamOutput<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T> Clone for StreamOutput<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone> StreamOutput<T> {
    pub(crate) fn channel() -> (Arc<watch::Sender<Option<T>>>, Self) {
        let (tx, rx) = watch::channel(None);
        (Arc::new(tx), Self { rx })
    }

    /// Most recent value, if any has been produced yet.
    pub fn latest(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Independent subscriber sharing the same latest value.
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }

    /// Waits for a value newer than the last one seen by this handle.
    ///
    /// Returns `None` once the pipeline has shut down.
    pub async fn next_value(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// Waits until the latest value satisfies `predicate`.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let value = self
            .rx
            .wait_for(|value| value.as_ref().map_or(false, &mut predicate))
            .await
            .ok()?;
        value.clone()
    }
}

/// Pumps `stream` into `tx` until the stream ends or nobody is listening.
pub(crate) fn drive_into<S, T>(stream: S, tx: Arc<watch::Sender<Option<T>>>)
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        loop {
            tokio::select! {
                next = stream.next() => match next {
                    Some(value) => {
                        if tx.send(Some(value)).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = tx.closed() => break,
            }
        }
    });
}

/// Turns a stream into a shared replay-latest output.
pub fn replay_latest<S, T>(stream: S) -> StreamOutput<T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    let (tx, output) = StreamOutput::channel();
    drive_into(stream, tx);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let (input, stream) = sink::<u32>();
        assert!(input.publish(1).is_ok());
        drop(stream);
        assert_eq!(input.publish(2), Err(CacheError::ChannelClosed));
        assert!(input.is_closed());
    }

    #[tokio::test]
    async fn test_subscribers_share_latest() {
        let (input, stream) = sink::<&str>();
        let mut output = replay_latest(stream);
        let late = output.clone();

        input.publish("first").unwrap();
        assert_eq!(output.next_value().await, Some("first"));

        input.publish("second").unwrap();
        assert_eq!(output.next_value().await, Some("second"));

        // A subscriber that never polled still sees the latest value.
        assert_eq!(late.latest(), Some("second"));
        assert_eq!(*late.subscribe().borrow(), Some("second"));
    }

    #[tokio::test]
    async fn test_output_closes_when_stream_ends() {
        let mut output = replay_latest(stream::iter(vec![1, 2]));
        assert_eq!(output.wait_for(|v| *v == 2).await, Some(2));
        assert_eq!(output.next_value().await, None);
    }
}
