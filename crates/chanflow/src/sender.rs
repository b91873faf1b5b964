//! Sending half of a channel.

use crate::channel::{ChanId, Handoff, Pushed, Shared};
use crate::error::{SendError, TrySendError};
use crate::ops::Write;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sending half of a [`channel`](crate::channel).
///
/// Cloning a sender registers another producer on the same channel. The
/// channel closes when the last sender is dropped.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// Withdraws an unconfirmed handoff if a send future is dropped while
/// waiting for a receiver to take its value.
struct PendingHandoff<'a, T> {
    shared: &'a Shared<T>,
    seq: u64,
    armed: bool,
}

impl<T> Drop for PendingHandoff<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.shared.handoff(self.seq, true);
        }
    }
}

impl<T> Sender<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Attempts to send a value without waiting.
    ///
    /// Returns the value inside the error if the channel is full (or, for a
    /// rendezvous channel, no receiver is waiting) or closed.
    ///
    /// On a rendezvous channel the value goes to a waiting receiver. If that
    /// receiver stops waiting before taking it, the value stays queued for
    /// the next one.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.shared.try_push(value).map(|_| ())
    }

    /// Sends a value, waiting for space if the channel is full.
    ///
    /// A value that only fits because a receiver is waiting (always the case
    /// on a rendezvous channel) counts as sent once a receiver has taken it.
    ///
    /// Dropping the returned future before it completes drops the value. Use
    /// [`write_one`](crate::write_one) to get the value back on cancellation.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        match self.send_until(value, &CancellationToken::new()).await {
            Write::Delivered => Ok(()),
            Write::Closed(value) | Write::Cancelled(value) => Err(SendError(value)),
        }
    }

    /// Sends a value unless `stop` fires first.
    ///
    /// BACKPRESSURE FLOW: the space notification is enabled *before* the push
    /// attempt, so a receiver that takes a value between a failed push and the
    /// await still wakes this task.
    pub(crate) async fn send_until(&self, mut value: T, stop: &CancellationToken) -> Write<T> {
        let seq = loop {
            if stop.is_cancelled() {
                return Write::Cancelled(value);
            }

            let space = self.shared.space_notify.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.shared.try_push(value) {
                Ok(Pushed::Buffered) => return Write::Delivered,
                Ok(Pushed::Handoff(seq)) => break seq,
                Err(TrySendError::Closed(rejected)) => return Write::Closed(rejected),
                Err(TrySendError::Full(rejected)) => value = rejected,
            }

            tokio::select! {
                biased;
                () = stop.cancelled() => return Write::Cancelled(value),
                () = space.as_mut() => {}
            }
        };
        self.await_handoff(seq, stop).await
    }

    /// Waits until the value pushed under `seq` is taken.
    ///
    /// HANDOFF FLOW: a receiver that parked, let the value in, then gave up
    /// leaves it queued beyond capacity. Every take wakes this task; if
    /// `stop` fires or the channel closes first the value is pulled back out
    /// and returned, so it is never both handed back and received.
    async fn await_handoff(&self, seq: u64, stop: &CancellationToken) -> Write<T> {
        let mut pending = PendingHandoff {
            shared: &self.shared,
            seq,
            armed: true,
        };

        loop {
            let taken = self.shared.space_notify.notified();
            tokio::pin!(taken);
            taken.as_mut().enable();

            match self.shared.handoff(seq, false) {
                Handoff::Accepted => {
                    pending.armed = false;
                    return Write::Delivered;
                }
                Handoff::Withdrawn(value) => {
                    pending.armed = false;
                    return Write::Closed(value);
                }
                Handoff::Pending => {}
            }

            tokio::select! {
                biased;
                () = stop.cancelled() => {
                    pending.armed = false;
                    return match self.shared.handoff(seq, true) {
                        Handoff::Withdrawn(value) => Write::Cancelled(value),
                        Handoff::Accepted | Handoff::Pending => Write::Delivered,
                    };
                }
                () = taken.as_mut() => {}
            }
        }
    }

    /// Closes the channel. Returns `true` if this call closed it.
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
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.add_sender();
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.shared.drop_sender();
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("id", &self.id())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
