//! Cancellation-aware single-value operations and draining.
//!
//! Every blocking operation here waits on exactly two things at once: the
//! channel and a [`CancellationToken`]. When both are ready, cancellation
//! wins.

use crate::channel::channel;
use crate::receiver::Receiver;
use crate::sender::Sender;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Outcome of [`read_one`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Read<T> {
    /// A value was received.
    Value(T),
    /// The source is closed and empty; the token is still alive.
    Exhausted,
    /// The token fired before a value arrived.
    Cancelled,
}

impl<T> Read<T> {
    /// Returns the value, if one was received.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Exhausted | Self::Cancelled => None,
        }
    }

    /// Returns `true` unless the token fired.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Outcome of [`write_one`].
///
/// A value that was not delivered is handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write<T> {
    /// The destination accepted the value.
    Delivered,
    /// The destination is closed.
    Closed(T),
    /// The token fired before the destination accepted the value.
    Cancelled(T),
}

impl<T> Write<T> {
    /// Returns `true` if the value was delivered.
    #[inline]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Returns `true` unless the token fired.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::Cancelled(_))
    }

    /// Returns the undelivered value, if any.
    pub fn into_inner(self) -> Option<T> {
        match self {
            Self::Delivered => None,
            Self::Closed(value) | Self::Cancelled(value) => Some(value),
        }
    }
}

/// Reads one value from `rx`, or gives up when `token` fires.
pub async fn read_one<T>(token: &CancellationToken, rx: &Receiver<T>) -> Read<T> {
    tokio::select! {
        biased;
        () = token.cancelled() => Read::Cancelled,
        value = rx.recv() => match value {
            Some(value) => Read::Value(value),
            None => Read::Exhausted,
        },
    }
}

/// Writes one value to `tx`, or gives up when `token` fires.
///
/// On cancellation the value is not delivered and is returned in
/// [`Write::Cancelled`].
pub async fn write_one<T>(token: &CancellationToken, tx: &Sender<T>, value: T) -> Write<T> {
    tx.send_until(value, token).await
}

/// Relays every value from `rx` to a new channel until `rx` closes or
/// `token` fires, then closes the new channel.
///
/// The output has the same capacity as `rx`. A value caught mid-send when
/// the token fires is dropped.
pub fn read_while<T: Send + 'static>(token: &CancellationToken, rx: Receiver<T>) -> Receiver<T> {
    let (tx, out) = channel(rx.capacity());
    let token = token.clone();

    tokio::spawn(async move {
        while let Read::Value(value) = read_one(&token, &rx).await {
            if !write_one(&token, &tx, value).await.is_delivered() {
                break;
            }
        }
        tx.close();
    });

    out
}

/// Discards values from `rx` until it is closed and empty.
///
/// Returns the number of values discarded. Returns immediately for a channel
/// that is already closed and empty.
pub async fn drain<T>(rx: &Receiver<T>) -> usize {
    let mut discarded = 0;
    while rx.recv().await.is_some() {
        discarded += 1;
    }
    trace!(chan = %rx.id(), discarded, "drained");
    discarded
}

/// Closes `rx`, then drains it.
///
/// Producers blocked on the channel observe the close and stop waiting.
pub async fn close_and_drain<T>(rx: &Receiver<T>) -> usize {
    rx.close();
    drain(rx).await
}

/// Returns a child of `token` that also fires once `after` has elapsed.
///
/// `token` itself is never cancelled.
pub fn cancel_after(token: &CancellationToken, after: Duration) -> CancellationToken {
    let deadline = token.child_token();
    let timer = deadline.clone();

    tokio::spawn(async move {
        tokio::select! {
            () = timer.cancelled() => {}
            () = tokio::time::sleep(after) => timer.cancel(),
        }
    });

    deadline
}
