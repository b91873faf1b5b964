//! Receiving half of a channel.

use crate::channel::{ChanId, Pop, Shared};
use crate::error::TryRecvError;
use futures_core::Stream;
use std::fmt;
use std::sync::Arc;

/// Receiving half of a [`channel`](crate::channel).
///
/// Receivers are `Clone`; each value is taken by exactly one of them.
/// Values are yielded in the order they were accepted by the channel.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

/// Leaves the parked set if a `recv` future is dropped while waiting.
struct Parked<'a, T> {
    shared: &'a Shared<T>,
    parked: bool,
}

impl<T> Drop for Parked<'_, T> {
    fn drop(&mut self) {
        if self.parked {
            self.shared.unpark();
        }
    }
}

impl<T> Receiver<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Receives the next value, waiting until one is available.
    ///
    /// Returns `None` once the channel is closed and every buffered value
    /// has been taken.
    ///
    /// This method is cancel-safe: if the future is dropped before it
    /// completes, no value is lost.
    pub async fn recv(&self) -> Option<T> {
        let mut guard = Parked {
            shared: &self.shared,
            parked: false,
        };

        loop {
            let data = self.shared.data_notify.notified();
            tokio::pin!(data);
            data.as_mut().enable();

            match self.shared.pop_parked(&mut guard.parked) {
                Pop::Value(value) => return Some(value),
                Pop::Closed => return None,
                Pop::Empty => data.await,
            }
        }
    }

    /// Attempts to receive a value without waiting.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.shared.try_pop()
    }

    /// Discards every buffered value without waiting. Returns the count.
    pub(crate) fn discard_buffered(&self) -> usize {
        let mut discarded = 0;
        while self.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Closes the channel. Returns `true` if this call closed it.
    ///
    /// Values already buffered can still be received.
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    /// Returns `true` if the channel is closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Returns the identity of the channel.
    pub fn id(&self) -> ChanId {
        self.shared.id()
    }

    /// Returns the buffer capacity the channel was created with.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Returns the number of values currently buffered.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns `true` if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the receiver into a [`Stream`] of its values.
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send + 'static,
    {
        futures_util::stream::unfold(self, |rx| async move {
            let value = rx.recv().await?;
            Some((value, rx))
        })
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.shared.add_receiver();
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.shared.drop_receiver();
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.id())
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
