//! Channel construction and the queue state shared by both ends.

use crate::error::{TryRecvError, TrySendError};
#[cfg(debug_assertions)]
use crate::invariants::debug_assert_within_capacity;
use crate::receiver::Receiver;
use crate::sender::Sender;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

static NEXT_CHAN_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a channel.
///
/// Every [`Sender`] and [`Receiver`] handle of the same channel reports the
/// same id, so it can be used to look a channel up after its receiving end
/// has been handed to a [`FanIn`](crate::FanIn).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChanId(u64);

impl ChanId {
    fn next() -> Self {
        Self(NEXT_CHAN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan#{}", self.0)
    }
}

/// Creates a bounded channel.
///
/// `capacity` is the number of values the channel buffers without a waiting
/// receiver. A capacity of `0` gives a rendezvous channel: a value is only
/// accepted while a receiver is parked in [`Receiver::recv`], and
/// [`Sender::send`] completes once a receiver has taken it.
///
/// Both ends are `Clone`. The channel closes when [`Sender::close`] or
/// [`Receiver::close`] is called, when the last sender is dropped, or when the
/// last receiver is dropped. Values buffered before the close stay receivable.
///
/// # Example
///
/// ```ignore
/// let (tx, rx) = chanflow::channel::<u64>(4);
/// tx.send(1).await?;
/// tx.close();
/// assert_eq!(rx.recv().await, Some(1));
/// assert_eq!(rx.recv().await, None);
/// ```
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared::new(capacity));
    (Sender::new(Arc::clone(&shared)), Receiver::new(shared))
}

/// State behind the channel mutex.
pub(crate) struct State<T> {
    /// Values tagged with the sequence number they were pushed under.
    queue: VecDeque<(u64, T)>,
    next_seq: u64,
    closed: bool,
    /// Receivers currently waiting in `recv` with nothing to take.
    parked: usize,
    senders: usize,
    receivers: usize,
}

/// Outcome of a single pop attempt made on behalf of `recv`.
pub(crate) enum Pop<T> {
    Value(T),
    Closed,
    Empty,
}

/// How a pushed value was accepted.
pub(crate) enum Pushed {
    /// Within capacity; the send is complete.
    Buffered,
    /// Into a slot a parked receiver opened. The send is complete once the
    /// entry with this sequence number is taken.
    Handoff(u64),
}

/// State of a pending handoff.
pub(crate) enum Handoff<T> {
    /// Taken by a receiver, or moved up within capacity.
    Accepted,
    Pending,
    /// Pulled back out of the queue before anyone took it.
    Withdrawn(T),
}

pub(crate) struct Shared<T> {
    id: ChanId,
    capacity: usize,
    state: Mutex<State<T>>,
    /// Woken when a value is queued or the channel closes.
    pub(crate) data_notify: Notify,
    /// Woken when a value is taken, a receiver parks, or the channel closes.
    pub(crate) space_notify: Notify,
}

impl<T> Shared<T> {
    fn new(capacity: usize) -> Self {
        Self {
            id: ChanId::next(),
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                next_seq: 0,
                closed: false,
                parked: 0,
                senders: 1,
                receivers: 1,
            }),
            data_notify: Notify::new(),
            space_notify: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> ChanId {
        self.id
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding this lock cannot leave the queue half-updated,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Closes the channel. Returns `true` if this call closed it.
    pub(crate) fn close(&self) -> bool {
        let newly_closed = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if newly_closed {
            self.data_notify.notify_waiters();
            self.space_notify.notify_waiters();
        }
        newly_closed
    }

    pub(crate) fn try_push(&self, value: T) -> Result<Pushed, TrySendError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(TrySendError::Closed(value));
        }
        let len = state.queue.len();
        if len >= self.capacity.saturating_add(state.parked) {
            return Err(TrySendError::Full(value));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push_back((seq, value));

        // The queue may exceed `capacity` only by the number of parked receivers.
        #[cfg(debug_assertions)]
        debug_assert_within_capacity!(state.queue.len(), self.capacity, state.parked);

        drop(state);
        self.data_notify.notify_waiters();
        if len < self.capacity {
            Ok(Pushed::Buffered)
        } else {
            Ok(Pushed::Handoff(seq))
        }
    }

    /// Checks on a value pushed as [`Pushed::Handoff`].
    ///
    /// An entry still waiting beyond capacity is pulled back out when
    /// `withdraw` is set or the channel has closed.
    pub(crate) fn handoff(&self, seq: u64, withdraw: bool) -> Handoff<T> {
        let mut state = self.lock();
        let Some(pos) = state.queue.iter().position(|(s, _)| *s == seq) else {
            return Handoff::Accepted;
        };
        if pos < self.capacity {
            return Handoff::Accepted;
        }
        if !withdraw && !state.closed {
            return Handoff::Pending;
        }
        match state.queue.remove(pos) {
            Some((_, value)) => {
                drop(state);
                self.space_notify.notify_waiters();
                Handoff::Withdrawn(value)
            }
            None => Handoff::Accepted,
        }
    }

    pub(crate) fn try_pop(&self) -> Result<T, TryRecvError> {
        let mut state = self.lock();
        match state.queue.pop_front() {
            Some((_, value)) => {
                drop(state);
                self.space_notify.notify_waiters();
                Ok(value)
            }
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Pops on behalf of a receiver that may already be parked.
    ///
    /// Taking a value and leaving the parked set happen under one lock, so a
    /// rendezvous sender cannot slip a second value in for the same receiver.
    pub(crate) fn pop_parked(&self, parked: &mut bool) -> Pop<T> {
        let mut state = self.lock();
        if let Some((_, value)) = state.queue.pop_front() {
            if std::mem::take(parked) {
                state.parked -= 1;
            }
            drop(state);
            self.space_notify.notify_waiters();
            return Pop::Value(value);
        }
        if state.closed {
            if std::mem::take(parked) {
                state.parked -= 1;
            }
            return Pop::Closed;
        }
        if !*parked {
            *parked = true;
            state.parked += 1;
            drop(state);
            // A parked receiver opens a slot for rendezvous senders.
            self.space_notify.notify_waiters();
        }
        Pop::Empty
    }

    pub(crate) fn unpark(&self) {
        let mut state = self.lock();
        state.parked -= 1;
    }

    pub(crate) fn add_sender(&self) {
        self.lock().senders += 1;
    }

    pub(crate) fn add_receiver(&self) {
        self.lock().receivers += 1;
    }

    /// Drops one sender handle, closing the channel with the last one.
    pub(crate) fn drop_sender(&self) {
        let last = {
            let mut state = self.lock();
            state.senders -= 1;
            state.senders == 0
        };
        if last {
            self.close();
        }
    }

    /// Drops one receiver handle, closing the channel with the last one.
    pub(crate) fn drop_receiver(&self) {
        let last = {
            let mut state = self.lock();
            state.receivers -= 1;
            state.receivers == 0
        };
        if last {
            self.close();
        }
    }
}
