//! Quiescence-based batching.
//!
//! A batch starts with the first value read while idle. Each further value
//! restarts a quiet timer; when the timer fires with no new arrival the batch
//! is settled and emitted whole, in arrival order. Then the next batch starts.
//!
//! The debounced stream ends when the source closes or the token fires. A
//! batch that is still collecting at that point is discarded, never flushed.

use crate::channel::channel;
#[cfg(debug_assertions)]
use crate::invariants::debug_assert_batch_nonempty;
use crate::ops::{read_one, write_one, Read};
use crate::receiver::Receiver;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Groups values from `rx` into batches separated by at least `quiet` of
/// silence.
///
/// The returned channel is a rendezvous channel that closes exactly once,
/// when `rx` closes or `token` fires.
pub fn debounce_all<T: Send + 'static>(
    token: &CancellationToken,
    rx: Receiver<T>,
    quiet: Duration,
) -> Receiver<Vec<T>> {
    let (tx, out) = channel(0);
    let token = token.clone();

    tokio::spawn(async move {
        while let Some(batch) = collect_batch(&token, &rx, quiet).await {
            // INV-DEB-01: the first read blocks until a value exists
            #[cfg(debug_assertions)]
            debug_assert_batch_nonempty!(batch);

            trace!(len = batch.len(), "batch settled");
            if !write_one(&token, &tx, batch).await.is_delivered() {
                break;
            }
        }
        tx.close();
    });

    out
}

/// Emits the first value of every batch [`debounce_all`] would emit.
pub fn debounce_first<T: Send + 'static>(
    token: &CancellationToken,
    rx: Receiver<T>,
    quiet: Duration,
) -> Receiver<T> {
    pick_from_batches(token, rx, quiet, |batch| batch.into_iter().next())
}

/// Emits the last value of every batch [`debounce_all`] would emit.
pub fn debounce_last<T: Send + 'static>(
    token: &CancellationToken,
    rx: Receiver<T>,
    quiet: Duration,
) -> Receiver<T> {
    pick_from_batches(token, rx, quiet, |mut batch| batch.pop())
}

fn pick_from_batches<T, F>(
    token: &CancellationToken,
    rx: Receiver<T>,
    quiet: Duration,
    pick: F,
) -> Receiver<T>
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> Option<T> + Send + 'static,
{
    let batches = debounce_all(token, rx, quiet);
    let (tx, out) = channel(0);
    let token = token.clone();

    tokio::spawn(async move {
        while let Read::Value(batch) = read_one(&token, &batches).await {
            let Some(value) = pick(batch) else {
                continue;
            };
            if !write_one(&token, &tx, value).await.is_delivered() {
                break;
            }
        }
        tx.close();
        // Stops the batching task if it is still waiting to emit.
        batches.close();
    });

    out
}

/// Collects one settled batch. Returns `None` when the stream is over.
async fn collect_batch<T>(
    token: &CancellationToken,
    rx: &Receiver<T>,
    quiet: Duration,
) -> Option<Vec<T>> {
    let Read::Value(first) = read_one(token, rx).await else {
        return None;
    };
    let mut batch = vec![first];

    let timer = sleep(quiet);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                trace!(discarded = batch.len(), "cancelled mid-batch");
                return None;
            }
            next = rx.recv() => match next {
                Some(value) => {
                    batch.push(value);
                    timer.as_mut().reset(Instant::now() + quiet);
                }
                None => {
                    trace!(discarded = batch.len(), "source closed mid-batch");
                    return None;
                }
            },
            () = &mut timer => return Some(batch),
        }
    }
}
