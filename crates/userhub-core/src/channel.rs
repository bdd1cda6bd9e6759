//! A single-direction message pipe with explicit completion.
//!
//! [`stream_channel`] returns a [`StreamProducer`] and a [`StreamSubscriber`]
//! joined by a bounded `mpsc` queue. The producer emits messages in order and
//! then terminates the pipe exactly once, either with
//! [`complete`](StreamProducer::complete) or with
//! [`fail`](StreamProducer::fail). The subscriber is a
//! [`Stream`] of `Result<T, Error>`:
//!
//! - after `complete`, it yields every queued message and then ends cleanly;
//! - after `fail`, it yields every queued message, then the error, then ends;
//! - if the producer is dropped without terminating the pipe, it yields a
//!   [`Error::StreamProtocol`] instead of waiting forever.
//!
//! A bidirectional session is two of these pipes with no ordering between
//! them.

use crate::{Error, Result};
use core::pin::Pin;
use core::task::{Context, Poll};
use futures::Stream;
use tokio::sync::mpsc;

enum Signal<T> {
    Message(T),
    Complete,
    Fail(Error),
}

/// Creates a pipe that can hold `buffer` undelivered signals.
///
/// The terminal signal occupies one slot, so a producer that wants to push
/// `n` messages and complete without ever waiting needs `buffer >= n + 1`.
///
/// # Panics
///
/// Panics if `buffer` is zero.
pub fn stream_channel<T>(buffer: usize) -> (StreamProducer<T>, StreamSubscriber<T>) {
    let (tx, rx) = mpsc::channel(buffer);
    (
        StreamProducer {
            tx: Some(tx),
            sent: 0,
        },
        StreamSubscriber { rx, done: false },
    )
}

/// Sending half of a [`stream_channel`].
pub struct StreamProducer<T> {
    // `None` once a terminal signal has been sent.
    tx: Option<mpsc::Sender<Signal<T>>>,
    sent: usize,
}

impl<T> StreamProducer<T> {
    /// Sends one message, waiting for capacity if the pipe is full.
    ///
    /// # Errors
    ///
    /// - [`Error::StreamProtocol`] if the pipe was already terminated.
    /// - [`Error::ChannelError`] if the subscriber has gone away.
    pub async fn send(&mut self, message: T) -> Result<()> {
        let tx = self.open_sender("send")?;
        tx.send(Signal::Message(message))
            .await
            .map_err(|_| Error::ChannelError {
                context: "stream subscriber dropped".to_string(),
            })?;
        self.sent += 1;
        Ok(())
    }

    /// Ends the pipe cleanly. No message may follow.
    ///
    /// # Errors
    ///
    /// Calling `complete` (or `fail`) twice is a protocol violation and is
    /// reported as [`Error::StreamProtocol`].
    pub async fn complete(&mut self) -> Result<()> {
        self.terminate(Signal::Complete, "complete").await
    }

    /// Ends the pipe with `error`, which the subscriber receives after every
    /// message sent before it.
    pub async fn fail(&mut self, error: Error) -> Result<()> {
        self.terminate(Signal::Fail(error), "fail").await
    }

    /// Number of messages accepted so far.
    pub const fn sent(&self) -> usize {
        self.sent
    }

    /// Whether a terminal signal has already been sent.
    pub const fn is_terminated(&self) -> bool {
        self.tx.is_none()
    }

    /// Whether the subscriber has been dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(mpsc::Sender::is_closed)
    }

    fn open_sender(&self, op: &str) -> Result<&mpsc::Sender<Signal<T>>> {
        self.tx.as_ref().ok_or_else(|| already_terminated(op))
    }

    async fn terminate(&mut self, signal: Signal<T>, op: &str) -> Result<()> {
        // Taken before sending: even if the subscriber is gone the pipe is
        // terminated from the producer's side.
        let tx = self.tx.take().ok_or_else(|| already_terminated(op))?;
        tx.send(signal).await.map_err(|_| Error::ChannelError {
            context: "stream subscriber dropped".to_string(),
        })
    }
}

fn already_terminated(op: &str) -> Error {
    Error::StreamProtocol {
        reason: format!("cannot {op}: stream already terminated"),
    }
}

/// Receiving half of a [`stream_channel`].
pub struct StreamSubscriber<T> {
    rx: mpsc::Receiver<Signal<T>>,
    done: bool,
}

impl<T> StreamSubscriber<T> {
    /// Stops accepting messages. Pending and future producer sends fail with
    /// [`Error::ChannelError`]; already queued messages are discarded.
    pub fn close(&mut self) {
        self.rx.close();
        self.done = true;
    }

    /// Whether the stream has reached its end.
    pub const fn is_done(&self) -> bool {
        self.done
    }
}

impl<T> Stream for StreamSubscriber<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Signal::Message(message))) => Poll::Ready(Some(Ok(message))),
            Poll::Ready(Some(Signal::Complete)) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Signal::Fail(error))) => {
                self.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(Some(Err(Error::StreamProtocol {
                    reason: "producer dropped without completing the stream".to_string(),
                })))
            }
        }
    }
}
