use std::future::Future;
use std::pin::Pin;
use std::task;
use std::time::Instant;

use async_channel::{Receiver, Sender};
use futures_lite::FutureExt;
use futures_timer::Delay;

use crate::error::ErrorKind;
use crate::Result;

/// Sending half of a one-shot result, held by whoever finishes the operation.
pub(crate) struct Completion<T: Send + 'static> {
    sender: Sender<Result<T>>,
}

impl<T: Send + 'static> Completion<T> {
    /// Delivers the result. A dropped [`Pending`] simply never observes it.
    pub fn resolve(self, result: Result<T>) {
        let _ = self.sender.try_send(result);
    }

    pub fn fail(self, kind: ErrorKind) {
        self.resolve(Err(kind.into()))
    }
}

/// Future of an operation submitted to a session.
///
/// The operation is submitted when the method returning this future is called, not when the
/// future is first polled. If the session goes away before the operation finishes, the future
/// resolves with [`ErrorKind::Disconnected`].
#[must_use = "dropping the future does not cancel the operation, but its result is lost"]
pub struct Pending<T: Send + 'static> {
    fut: Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>,
}

impl<T: Send + 'static> Pending<T> {
    pub(crate) fn channel() -> (Completion<T>, Self) {
        let (sender, receiver) = async_channel::bounded(1);
        let fut = Box::pin(async move {
            receiver
                .recv()
                .await
                .unwrap_or_else(|_| Err(ErrorKind::Disconnected.into()))
        });
        (Completion { sender }, Self { fut })
    }

    pub(crate) fn ready(result: Result<T>) -> Self {
        Self {
            fut: Box::pin(std::future::ready(result)),
        }
    }

    pub(crate) fn fail(kind: ErrorKind) -> Self {
        Self::ready(Err(kind.into()))
    }

    /// Maps the successful output.
    pub fn map<U: Send + 'static>(self, f: impl FnOnce(T) -> U + Send + 'static) -> Pending<U> {
        Pending {
            fut: Box::pin(async move { self.fut.await.map(f) }),
        }
    }
}

impl<T: Send + 'static> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        self.fut.as_mut().poll(cx)
    }
}

impl<T: Send + 'static> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pending")
    }
}

/// Outcome of [`recv_until`].
pub(crate) enum Received<T> {
    Message(T),
    Deadline,
    Closed,
}

/// Receives the next message, giving up at `deadline` if one is set.
pub(crate) async fn recv_until<T>(receiver: &Receiver<T>, deadline: Option<Instant>) -> Received<T> {
    let recv = async {
        match receiver.recv().await {
            Ok(msg) => Received::Message(msg),
            Err(_) => Received::Closed,
        }
    };
    let Some(deadline) = deadline else {
        return recv.await;
    };
    let Some(dur_wait) = deadline.checked_duration_since(Instant::now()) else {
        return Received::Deadline;
    };
    recv.or(async {
        Delay::new(dur_wait).await;
        Received::Deadline
    })
    .await
}

/// Returns the earlier of two optional deadlines.
pub(crate) fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
