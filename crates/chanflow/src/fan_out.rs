//! One-to-many broadcasting over a mutable set of sinks.

use crate::channel::{channel, ChanId};
use crate::error::{LifecycleError, TrySendError};
#[cfg(debug_assertions)]
use crate::invariants::debug_assert_member_detached;
use crate::lifecycle::Lifecycle;
use crate::ops::{read_one, Read};
use crate::receiver::Receiver;
use crate::sender::Sender;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Broadcasts every value of one input channel to a dynamic set of sinks.
///
/// # Ordering
///
/// A sink that can take a value immediately gets it inline, in input order.
/// A sink that cannot (full buffer, or no waiting reader on a rendezvous
/// sink) gets it from a detached task that retries delivery to that sink
/// alone, so one slow sink never holds back the others. Values delivered
/// this way may reach their sink out of order, and concurrent retries to
/// the same sink are not sequenced. Sinks that keep up stay strictly
/// ordered.
///
/// The group closes when [`close`](Self::close) is called, when the owning
/// token fires, or when the input is exhausted. Closing closes every sink.
///
/// `FanOut` is a cheap handle; clones share the same group.
pub struct FanOut<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    /// Child of the owner's token; cancelled when the group closes.
    shutdown: CancellationToken,
    state: Mutex<State<T>>,
}

struct State<T> {
    lifecycle: Lifecycle,
    /// Held until the broadcast loop starts.
    input: Option<Receiver<T>>,
    sinks: BTreeMap<ChanId, Sink<T>>,
}

struct Sink<T> {
    tx: Sender<T>,
    /// Private close signal, a child of the group's shutdown token.
    close: CancellationToken,
}

impl<T: Clone + Send + 'static> FanOut<T> {
    /// Creates a group reading from `input`. Nothing is read before
    /// [`start`](Self::start).
    pub fn new(token: &CancellationToken, input: Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                shutdown: token.child_token(),
                state: Mutex::new(State {
                    lifecycle: Lifecycle::default(),
                    input: Some(input),
                    sinks: BTreeMap::new(),
                }),
            }),
        }
    }

    /// Creates and registers a sink buffering up to `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if the group is closed. Use [`try_add`](Self::try_add) to get
    /// the error instead.
    pub fn add(&self, capacity: usize) -> Receiver<T> {
        match self.try_add(capacity) {
            Ok(sink) => sink,
            Err(err) => panic!("FanOut::add: {err}"),
        }
    }

    /// Creates and registers a sink buffering up to `capacity` values.
    pub fn try_add(&self, capacity: usize) -> Result<Receiver<T>, LifecycleError> {
        let mut state = self.open_state()?;
        let (tx, sink) = channel(capacity);
        let close = self.inner.shutdown.child_token();
        debug!(sink = %tx.id(), capacity, "fan-out sink added");
        state.sinks.insert(tx.id(), Sink { tx, close });
        Ok(sink)
    }

    /// Stops delivery to `sink`, closes it, discards what is already queued
    /// for it and forgets it.
    ///
    /// Returns `false` if the sink is not registered or the group is closed.
    pub fn remove(&self, sink: &Receiver<T>) -> bool {
        let id = sink.id();
        let removed = {
            let mut state = self.inner.lock();
            if state.lifecycle.is_closed() {
                return false;
            }
            let removed = state.sinks.remove(&id);

            // INV-GRP-02: removed sink is detached
            #[cfg(debug_assertions)]
            debug_assert_member_detached!(state.sinks, &id);

            removed
        };
        let Some(entry) = removed else {
            return false;
        };

        entry.close.cancel();
        entry.tx.close();
        let discarded = sink.discard_buffered();
        debug!(sink = %id, discarded, "fan-out sink removed");
        true
    }

    /// Starts the broadcast loop. Idempotent.
    ///
    /// # Panics
    ///
    /// Panics if the group is closed. Use [`try_start`](Self::try_start) to
    /// get the error instead.
    pub fn start(&self) {
        if let Err(err) = self.try_start() {
            panic!("FanOut::start: {err}");
        }
    }

    /// Starts the broadcast loop. Idempotent while the group is open.
    ///
    /// Must be called within a Tokio runtime.
    pub fn try_start(&self) -> Result<(), LifecycleError> {
        let input = {
            let mut state = self.open_state()?;
            if !state.lifecycle.start()? {
                return Ok(());
            }
            state.input.take()
        };
        let Some(input) = input else {
            return Ok(());
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.broadcast(&input).await;
            inner.close();
        });
        debug!("fan-out started");
        Ok(())
    }

    /// Stops the broadcast loop and closes every sink. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns `true` if the broadcast loop was started.
    pub fn is_started(&self) -> bool {
        self.inner.lock().lifecycle.is_started()
    }

    /// Returns `true` if the group is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().lifecycle.is_closed()
    }

    /// Returns the number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.inner.lock().sinks.len()
    }

    /// Locks the state of a group that is still open.
    ///
    /// A group whose owning token already fired is closed here first, so
    /// the caller sees the same outcome whether or not the loop noticed.
    fn open_state(&self) -> Result<MutexGuard<'_, State<T>>, LifecycleError> {
        let state = self.inner.lock();
        if state.lifecycle.is_closed() {
            return Err(LifecycleError::Closed);
        }
        if self.inner.shutdown.is_cancelled() {
            drop(state);
            self.inner.close();
            return Err(LifecycleError::Closed);
        }
        Ok(state)
    }
}

impl<T: Clone + Send + 'static> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn broadcast(&self, input: &Receiver<T>) {
        loop {
            let value = match read_one(&self.shutdown, input).await {
                Read::Value(value) => value,
                Read::Exhausted => {
                    debug!("fan-out input exhausted");
                    return;
                }
                Read::Cancelled => return,
            };

            // Snapshot under the lock, deliver without it.
            let sinks: Vec<(ChanId, Sender<T>, CancellationToken)> = {
                let state = self.lock();
                state
                    .sinks
                    .iter()
                    .map(|(id, sink)| (*id, sink.tx.clone(), sink.close.clone()))
                    .collect()
            };

            for (id, tx, close) in sinks {
                match tx.try_send(value.clone()) {
                    Ok(()) | Err(TrySendError::Closed(_)) => {}
                    Err(TrySendError::Full(pending)) => {
                        trace!(sink = %id, "sink busy, delivering in background");
                        tokio::spawn(async move {
                            let _ = tx.send_until(pending, &close).await;
                        });
                    }
                }
            }
        }
    }

    fn close(&self) {
        let sinks = {
            let mut state = self.lock();
            if !state.lifecycle.close() {
                return;
            }
            state.input = None;
            std::mem::take(&mut state.sinks)
        };
        self.shutdown.cancel();
        for sink in sinks.values() {
            sink.close.cancel();
            sink.tx.close();
        }
        debug!(sinks = sinks.len(), "fan-out closed");
    }
}

impl<T> Clone for FanOut<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
