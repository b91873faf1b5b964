//! Many-to-one merging over a mutable set of sources.

use crate::channel::{channel, ChanId};
use crate::config::FanInConfig;
use crate::error::LifecycleError;
#[cfg(debug_assertions)]
use crate::invariants::debug_assert_member_detached;
use crate::lifecycle::Lifecycle;
use crate::ops::Write;
use crate::receiver::Receiver;
use crate::sender::Sender;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Merges values from a dynamic set of source channels into one output.
///
/// Delivery starts lazily on the first call to [`chan`](Self::chan), which
/// spawns one relay task per source. Sources can be added and removed at any
/// time. Values from one source keep their order; values from different
/// sources interleave arbitrarily.
///
/// The group closes when [`close`](Self::close) is called, when the owning
/// token fires, or when every registered source has been exhausted after
/// delivery started. Closing closes the merged output.
///
/// `FanIn` is a cheap handle; clones share the same group.
///
/// # Example
///
/// ```ignore
/// let token = CancellationToken::new();
/// let (tx1, rx1) = chanflow::channel(1);
/// let (tx2, rx2) = chanflow::channel(1);
/// let group = FanIn::new(&token, [rx1, rx2]);
/// let merged = group.chan();
///
/// tx1.send(1).await?;
/// tx2.send(2).await?;
/// group.remove(tx2.id());
/// ```
pub struct FanIn<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    /// Child of the owner's token; cancelled when the group closes.
    shutdown: CancellationToken,
    output: Sender<T>,
    merged: Receiver<T>,
    state: Mutex<State<T>>,
}

struct State<T> {
    lifecycle: Lifecycle,
    members: HashMap<ChanId, Member<T>>,
}

struct Member<T> {
    /// Private close signal, a child of the group's shutdown token.
    close: CancellationToken,
    /// Held until the member's relay is spawned.
    source: Option<Receiver<T>>,
}

impl<T: Send + 'static> FanIn<T> {
    /// Creates a group over `sources` without starting delivery.
    pub fn new<I>(token: &CancellationToken, sources: I) -> Self
    where
        I: IntoIterator<Item = Receiver<T>>,
    {
        Self::with_config(token, sources, FanInConfig::default())
    }

    /// Creates a group with a custom configuration.
    pub fn with_config<I>(token: &CancellationToken, sources: I, config: FanInConfig) -> Self
    where
        I: IntoIterator<Item = Receiver<T>>,
    {
        let shutdown = token.child_token();
        let (output, merged) = channel(config.output_capacity);

        let mut members = HashMap::new();
        for source in sources {
            members.entry(source.id()).or_insert_with(|| Member {
                close: shutdown.child_token(),
                source: Some(source),
            });
        }

        Self {
            inner: Arc::new(Inner {
                shutdown,
                output,
                merged,
                state: Mutex::new(State {
                    lifecycle: Lifecycle::default(),
                    members,
                }),
            }),
        }
    }

    /// Returns the merged output, starting delivery on the first call.
    ///
    /// # Panics
    ///
    /// Panics if the group was closed before it was ever started. Use
    /// [`try_chan`](Self::try_chan) to get the error instead.
    pub fn chan(&self) -> Receiver<T> {
        match self.try_chan() {
            Ok(merged) => merged,
            Err(err) => panic!("FanIn::chan: {err}"),
        }
    }

    /// Returns the merged output, starting delivery on the first call.
    ///
    /// Must be called within a Tokio runtime.
    pub fn try_chan(&self) -> Result<Receiver<T>, LifecycleError> {
        let mut state = self.inner.lock();
        if state.lifecycle.start()? {
            let mut relays = 0;
            for (id, member) in &mut state.members {
                if let Some(source) = member.source.take() {
                    self.inner.spawn_relay(*id, source, member.close.clone());
                    relays += 1;
                }
            }
            self.inner.spawn_watcher();
            debug!(relays, "fan-in started");
        }
        Ok(self.inner.merged.clone())
    }

    /// Registers a source and returns its id.
    ///
    /// Spawns its relay right away if delivery has started. Adding a source
    /// that is already registered, or adding to a closed group, does nothing.
    pub fn add(&self, source: Receiver<T>) -> ChanId {
        let id = source.id();
        let mut state = self.inner.lock();
        if state.lifecycle.is_closed() || state.members.contains_key(&id) {
            return id;
        }

        let close = self.inner.shutdown.child_token();
        let source = if state.lifecycle.is_started() {
            self.inner.spawn_relay(id, source, close.clone());
            None
        } else {
            Some(source)
        };
        state.members.insert(id, Member { close, source });
        debug!(member = %id, "fan-in member added");
        id
    }

    /// Stops relaying from the source with the given id and forgets it.
    ///
    /// Values sent to that source after this returns never reach the merged
    /// output. Returns `false` if the id is unknown or the group is closed.
    ///
    /// The group drops its handle on the source once the relay stops. If no
    /// other [`Receiver`] clone is alive, that closes the source, and its
    /// senders see [`TrySendError::Closed`](crate::TrySendError::Closed).
    pub fn remove(&self, id: ChanId) -> bool {
        let mut state = self.inner.lock();
        if state.lifecycle.is_closed() {
            return false;
        }
        let Some(member) = state.members.remove(&id) else {
            return false;
        };
        member.close.cancel();

        // INV-GRP-02: removed member is detached
        #[cfg(debug_assertions)]
        debug_assert_member_detached!(state.members, &id);

        debug!(member = %id, "fan-in member removed");
        true
    }

    /// Closes the group and its merged output. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns `true` if the group is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().lifecycle.is_closed()
    }

    /// Returns `true` if the source with the given id is registered.
    pub fn contains(&self, id: ChanId) -> bool {
        self.inner.lock().members.contains_key(&id)
    }

    /// Returns the number of registered sources.
    pub fn len(&self) -> usize {
        self.inner.lock().members.len()
    }

    /// Returns `true` if no sources are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the relay for one member. The lock may be held; nothing here
    /// waits.
    fn spawn_relay(self: &Arc<Self>, id: ChanId, source: Receiver<T>, close: CancellationToken) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    () = close.cancelled() => {
                        trace!(member = %id, "relay stopped");
                        return;
                    }
                    next = source.recv() => next,
                };
                let Some(value) = next else {
                    inner.member_exhausted(id);
                    return;
                };
                // Removed while this value was being taken.
                if close.is_cancelled() {
                    return;
                }
                match inner.output.send_until(value, &close).await {
                    Write::Delivered => {}
                    Write::Closed(_) | Write::Cancelled(_) => return,
                }
            }
        });
    }

    fn spawn_watcher(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.shutdown.cancelled().await;
            inner.close();
        });
    }

    fn member_exhausted(&self, id: ChanId) {
        let last = {
            let mut state = self.lock();
            if state.members.remove(&id).is_none() {
                return;
            }
            trace!(member = %id, "fan-in member exhausted");
            state.members.is_empty()
        };
        if last {
            debug!("every fan-in member exhausted");
            self.close();
        }
    }

    fn close(&self) {
        let members = {
            let mut state = self.lock();
            if !state.lifecycle.close() {
                return;
            }
            std::mem::take(&mut state.members)
        };
        for member in members.values() {
            member.close.cancel();
        }
        self.shutdown.cancel();
        self.output.close();
        debug!(members = members.len(), "fan-in closed");
    }
}

impl<T> Clone for FanIn<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
