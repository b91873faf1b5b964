//! Integration tests for chanflow.
//!
//! Most tests run on a paused clock: sleeps complete as soon as every task is
//! idle, so quiet windows are exact and a stuck test fails on `WAIT` instead
//! of hanging.

use chanflow::{
    cancel_after, channel, close_and_drain, debounce_all, debounce_first, debounce_last, drain,
    read_one, read_while, write_one, CancellationToken, FanIn, FanInConfig, FanOut,
    LifecycleError, Read, Receiver, Sender, StreamExt, TryRecvError, TrySendError, Write,
};
use futures::poll;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(30);
const WINDOW: Duration = Duration::from_millis(10);

async fn recv<T>(rx: &Receiver<T>) -> Option<T> {
    timeout(WAIT, rx.recv()).await.expect("timed out waiting for a value")
}

/// Sends `count` copies of `value`, one task each, and waits for all of them.
async fn burst(tx: &Sender<usize>, count: usize, value: usize) {
    let sends: Vec<_> = (0..count)
        .map(|_| {
            let tx = tx.clone();
            tokio::spawn(async move { tx.send(value).await })
        })
        .collect();
    for send in sends {
        send.await.unwrap().expect("send failed");
    }
}

// =============================================================================
// Cancellable ops
// =============================================================================

#[tokio::test]
async fn test_read_one_outcomes() {
    let token = CancellationToken::new();

    let (tx, rx) = channel::<i32>(1);
    tx.try_send(1).unwrap();
    assert_eq!(read_one(&token, &rx).await, Read::Value(1));

    let (tx, rx) = channel::<i32>(1);
    tx.close();
    let outcome = read_one(&token, &rx).await;
    assert_eq!(outcome, Read::Exhausted);
    assert!(outcome.is_alive());

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let (_tx, rx) = channel::<i32>(1);
    let outcome = read_one(&cancelled, &rx).await;
    assert_eq!(outcome, Read::Cancelled);
    assert!(!outcome.is_alive());
    assert_eq!(outcome.into_value(), None);
}

#[tokio::test]
async fn test_read_one_prefers_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let (tx, rx) = channel::<i32>(1);
    tx.try_send(5).unwrap();

    assert_eq!(read_one(&token, &rx).await, Read::Cancelled);
    assert_eq!(rx.len(), 1);
}

#[tokio::test]
async fn test_write_one_outcomes() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(1);
    assert_eq!(write_one(&token, &tx, 1).await, Write::Delivered);
    assert_eq!(rx.try_recv(), Ok(1));

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let outcome = write_one(&cancelled, &tx, 2).await;
    assert!(!outcome.is_alive());
    assert_eq!(outcome.into_inner(), Some(2));
    assert!(rx.is_empty());

    rx.close();
    assert_eq!(write_one(&token, &tx, 3).await, Write::Closed(3));
}

#[tokio::test(start_paused = true)]
async fn test_write_one_cancelled_while_blocked() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(0);

    let canceller = token.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(5)).await;
        canceller.cancel();
    });

    assert_eq!(write_one(&token, &tx, 7).await, Write::Cancelled(7));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_rendezvous_write_not_delivered_to_cancelled_reader() {
    let (tx, rx) = channel::<i32>(0);
    let reader_token = CancellationToken::new();
    let writer_token = CancellationToken::new();

    let read = read_one(&reader_token, &rx);
    tokio::pin!(read);
    assert!(poll!(read.as_mut()).is_pending());

    // The parked reader lets the value in but has not taken it yet.
    let write = write_one(&writer_token, &tx, 1);
    tokio::pin!(write);
    assert!(poll!(write.as_mut()).is_pending());
    assert_eq!(rx.len(), 1);

    reader_token.cancel();
    assert_eq!(read.await, Read::Cancelled);

    writer_token.cancel();
    assert_eq!(write.await, Write::Cancelled(1));
    assert!(rx.is_empty());
}

#[tokio::test]
async fn test_rendezvous_write_completes_when_reader_takes_value() {
    let (tx, rx) = channel::<i32>(0);
    let token = CancellationToken::new();

    let read = read_one(&token, &rx);
    tokio::pin!(read);
    assert!(poll!(read.as_mut()).is_pending());

    let write = write_one(&token, &tx, 1);
    tokio::pin!(write);
    assert!(poll!(write.as_mut()).is_pending());

    assert_eq!(read.await, Read::Value(1));
    assert_eq!(write.await, Write::Delivered);
}

#[tokio::test]
async fn test_rendezvous_dropped_send_withdraws_value() {
    let (tx, rx) = channel::<i32>(0);
    let token = CancellationToken::new();

    let read = read_one(&token, &rx);
    tokio::pin!(read);
    assert!(poll!(read.as_mut()).is_pending());

    {
        let send = tx.send(5);
        tokio::pin!(send);
        assert!(poll!(send.as_mut()).is_pending());
        assert_eq!(rx.len(), 1);
    }
    assert!(rx.is_empty());

    token.cancel();
    assert_eq!(read.await, Read::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_read_while_relays_in_order() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(2);
    let out = read_while(&token, rx);
    assert_eq!(out.capacity(), 2);

    tokio::spawn(async move {
        for i in 0..10 {
            tx.send(i).await.unwrap();
        }
    });

    let received: Vec<i32> = timeout(WAIT, out.into_stream().collect()).await.unwrap();
    assert_eq!(received, (0..10).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_read_while_stops_on_cancel() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(0);
    tokio::spawn(async move {
        for _ in 0..4 {
            if tx.send(1).await.is_err() {
                break;
            }
        }
    });

    let out = read_while(&token, rx);
    assert_eq!(recv(&out).await, Some(1));
    token.cancel();

    for _ in 0..5 {
        if recv(&out).await.is_none() {
            return;
        }
    }
    panic!("output should be closed");
}

#[tokio::test]
async fn test_close_and_drain_empties_channel() {
    let (tx, rx) = channel::<usize>(1024);
    burst(&tx, 100, 1).await;
    assert_eq!(rx.len(), 100);

    assert_eq!(close_and_drain(&rx).await, 100);
    assert!(rx.is_empty());
    assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
}

#[tokio::test]
async fn test_drain_closed_empty_returns_immediately() {
    let (_tx, rx) = channel::<u8>(4);
    rx.close();
    assert_eq!(timeout(WAIT, drain(&rx)).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_and_drain_unblocks_producer() {
    let (tx, rx) = channel::<u8>(1);
    tx.try_send(0).unwrap();
    let producer = tokio::spawn(async move { tx.send(1).await });
    tokio::task::yield_now().await;

    assert_eq!(close_and_drain(&rx).await, 1);
    let err = timeout(WAIT, producer).await.unwrap().unwrap().unwrap_err();
    assert_eq!(err.into_inner(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drain_waits_for_close() {
    let (tx, rx) = channel::<u8>(0);
    let drainer = tokio::spawn(async move { drain(&rx).await });

    for i in 0..3 {
        tx.send(i).await.unwrap();
    }
    drop(tx);

    assert_eq!(timeout(WAIT, drainer).await.unwrap().unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_leaves_parent_alive() {
    let token = CancellationToken::new();
    let deadline = cancel_after(&token, Duration::from_millis(50));
    let (_tx, rx) = channel::<u8>(1);

    assert_eq!(read_one(&deadline, &rx).await, Read::Cancelled);
    assert!(deadline.is_cancelled());
    assert!(!token.is_cancelled());
}

// =============================================================================
// Debounce
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_debounce_single_value() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<usize>(1);
    tx.send(1).await.unwrap();

    let out = debounce_all(&token, rx, WINDOW);
    assert_eq!(recv(&out).await, Some(vec![1]));
    assert_eq!(out.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test(start_paused = true)]
async fn test_debounce_concurrent_values_form_one_batch() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<usize>(1);
    for i in 0..100 {
        let tx = tx.clone();
        tokio::spawn(async move { tx.send(i).await });
    }

    let out = debounce_all(&token, rx, WINDOW);
    let batch = recv(&out).await.unwrap();
    assert_eq!(batch.len(), 100);
    let distinct: HashSet<_> = batch.into_iter().collect();
    assert_eq!(distinct.len(), 100);
    assert_eq!(out.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test(start_paused = true)]
async fn test_debounce_bursts_separated_by_silence() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<usize>(1);
    tokio::spawn(async move {
        burst(&tx, 3, 3).await;
        sleep(WINDOW * 2).await;
        burst(&tx, 5, 5).await;
        sleep(WINDOW * 2).await;
        burst(&tx, 2, 2).await;
        // Keep the source open; closing it would discard the last batch.
        sleep(WAIT).await;
    });

    let out = debounce_all(&token, rx, WINDOW);
    assert_eq!(recv(&out).await, Some(vec![3; 3]));
    assert_eq!(recv(&out).await, Some(vec![5; 5]));
    assert_eq!(recv(&out).await, Some(vec![2; 2]));
}

#[tokio::test(start_paused = true)]
async fn test_debounce_preserves_arrival_order() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<usize>(4);
    tokio::spawn(async move {
        for i in 0..20 {
            tx.send(i).await.unwrap();
            sleep(WINDOW / 2).await;
        }
        sleep(WAIT).await;
    });

    let out = debounce_all(&token, rx, WINDOW);
    assert_eq!(recv(&out).await, Some((0..20).collect()));
}

#[tokio::test(start_paused = true)]
async fn test_debounce_cancel_discards_partial_batch() {
    let token = cancel_after(&CancellationToken::new(), Duration::from_secs(1));
    let (tx, rx) = channel::<usize>(1);
    tokio::spawn(async move {
        burst(&tx, 3, 3).await;
        sleep(Duration::from_secs(2)).await;
        burst(&tx, 5, 5).await;
    });

    let out = debounce_all(&token, rx, WINDOW);
    assert_eq!(recv(&out).await, Some(vec![3; 3]));
    assert_eq!(recv(&out).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_cancel_mid_collection() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<usize>(8);
    let out = debounce_all(&token, rx, WINDOW);

    tx.send(1).await.unwrap();
    sleep(WINDOW / 2).await;
    tx.send(2).await.unwrap();
    token.cancel();

    assert_eq!(recv(&out).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_cancel_while_emitting_discards_batch() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<usize>(8);
    let out = debounce_all(&token, rx, WINDOW);

    tx.send(1).await.unwrap();
    tx.send(2).await.unwrap();
    // The batch settles with nobody reading the output.
    sleep(WINDOW * 5).await;
    token.cancel();

    assert_eq!(recv(&out).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_source_close_does_not_flush() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<usize>(8);
    let out = debounce_all(&token, rx, WINDOW);

    tx.send(1).await.unwrap();
    tx.send(2).await.unwrap();
    drop(tx);

    assert_eq!(recv(&out).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_idle_source_close_closes_output() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<usize>(1);
    let out = debounce_all(&token, rx, WINDOW);
    tx.close();
    assert_eq!(recv(&out).await, None);
}

/// Feeds 1..=4, a quiet gap, 10..=40, then a long pause before a value the
/// one-second deadline cuts off.
fn spawn_two_bursts(tx: Sender<usize>) {
    tokio::spawn(async move {
        for i in 1..=4 {
            tx.send(i).await.unwrap();
        }
        sleep(WINDOW * 2).await;
        for i in 1..=4 {
            tx.send(i * 10).await.unwrap();
        }
        sleep(Duration::from_secs(1)).await;
        let _ = tx.send(100).await;
    });
}

#[tokio::test(start_paused = true)]
async fn test_debounce_first() {
    let token = cancel_after(&CancellationToken::new(), Duration::from_secs(1));
    let (tx, rx) = channel::<usize>(100);
    spawn_two_bursts(tx);

    let out = debounce_first(&token, rx, WINDOW);
    assert_eq!(recv(&out).await, Some(1));
    assert_eq!(recv(&out).await, Some(10));
    assert_eq!(recv(&out).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_last() {
    let token = cancel_after(&CancellationToken::new(), Duration::from_secs(1));
    let (tx, rx) = channel::<usize>(100);
    spawn_two_bursts(tx);

    let out = debounce_last(&token, rx, WINDOW);
    assert_eq!(recv(&out).await, Some(4));
    assert_eq!(recv(&out).await, Some(40));
    assert_eq!(recv(&out).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_first_and_last_single_value() {
    let token = CancellationToken::new();

    let (tx, rx) = channel::<usize>(1);
    tx.send(1).await.unwrap();
    assert_eq!(recv(&debounce_first(&token, rx, WINDOW)).await, Some(1));

    let (tx, rx) = channel::<usize>(1);
    tx.send(1).await.unwrap();
    assert_eq!(recv(&debounce_last(&token, rx, WINDOW)).await, Some(1));
}

// =============================================================================
// Fan-in
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fan_in_merges_every_source() {
    let token = CancellationToken::new();
    let mut sources = Vec::new();
    for value in 1..=3 {
        let (tx, rx) = channel::<i32>(0);
        tokio::spawn(async move { tx.send(value).await });
        sources.push(rx);
    }

    let group = FanIn::new(&token, sources);
    let merged = group.chan();

    let mut received = HashSet::new();
    for _ in 0..3 {
        match timeout(WAIT, read_one(&token, &merged)).await.unwrap() {
            Read::Value(value) => received.insert(value),
            other => panic!("unexpected outcome: {:?}", other),
        };
    }
    assert_eq!(received, HashSet::from([1, 2, 3]));

    // Every sender is gone, so every member is exhausted.
    assert_eq!(recv(&merged).await, None);
    assert!(group.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_fan_in_closes_on_token() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(1);
    tx.send(1).await.unwrap();

    let group = FanIn::new(&token, [rx]);
    let merged = group.chan();
    assert_eq!(recv(&merged).await, Some(1));

    token.cancel();
    assert_eq!(recv(&merged).await, None);
    assert!(group.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_fan_in_starts_lazily() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(1);
    tx.send(1).await.unwrap();

    let group = FanIn::new(&token, [rx]);
    sleep(WINDOW).await;
    assert_eq!(tx.len(), 1);

    let merged = group.chan();
    assert_eq!(recv(&merged).await, Some(1));
    assert_eq!(group.chan().id(), merged.id());
    group.close();
}

#[tokio::test(start_paused = true)]
async fn test_fan_in_adding_and_removing_sources() {
    let token = CancellationToken::new();
    let group = FanIn::<i32>::new(&token, std::iter::empty());

    let (tx, rx) = channel(1);
    tx.send(1).await.unwrap();
    let first = group.add(rx);
    let merged = group.chan();
    assert_eq!(recv(&merged).await, Some(1));

    let (new_tx, new_rx) = channel(1);
    group.add(new_rx.clone());
    // Adding the same source again does nothing.
    group.add(new_rx);
    assert_eq!(group.len(), 2);

    new_tx.send(2).await.unwrap();
    assert_eq!(recv(&merged).await, Some(2));

    assert!(group.remove(first));
    // Removing a removed source does nothing.
    assert!(!group.remove(first));
    assert!(!group.contains(first));

    new_tx.send(3).await.unwrap();
    assert_eq!(recv(&merged).await, Some(3));

    // The group held the only receiver of the removed source, so the source
    // closes once its relay stops.
    sleep(WINDOW).await;
    assert!(tx.is_closed());
    assert_eq!(tx.try_send(4), Err(TrySendError::Closed(4)));
    assert!(merged.try_recv().is_err());

    group.close();
    assert_eq!(recv(&merged).await, None);
    // Closing again does nothing.
    group.close();
    assert!(!group.remove(new_tx.id()));
}

#[tokio::test(start_paused = true)]
async fn test_fan_in_removed_source_is_ignored() {
    let token = CancellationToken::new();
    let (kept_tx, kept_rx) = channel::<i32>(4);
    let (gone_tx, gone_rx) = channel::<i32>(4);
    let group = FanIn::new(&token, [kept_rx, gone_rx]);
    let merged = group.chan();

    assert!(group.remove(gone_tx.id()));
    for i in 0..4 {
        let _ = gone_tx.try_send(-i);
        kept_tx.send(i).await.unwrap();
    }
    drop(kept_tx);

    let received: Vec<i32> = timeout(WAIT, merged.into_stream().collect()).await.unwrap();
    assert_eq!(received, vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_fan_in_preserves_order_within_source() {
    let token = CancellationToken::new();
    let (low_tx, low_rx) = channel::<i32>(2);
    let (high_tx, high_rx) = channel::<i32>(2);
    tokio::spawn(async move {
        for i in 0..50 {
            low_tx.send(i).await.unwrap();
        }
    });
    tokio::spawn(async move {
        for i in 100..150 {
            high_tx.send(i).await.unwrap();
        }
    });

    let group = FanIn::with_config(&token, [low_rx, high_rx], FanInConfig::buffered(4));
    let received: Vec<i32> = timeout(WAIT, group.chan().into_stream().collect()).await.unwrap();

    assert_eq!(received.len(), 100);
    let low: Vec<i32> = received.iter().copied().filter(|v| *v < 100).collect();
    let high: Vec<i32> = received.iter().copied().filter(|v| *v >= 100).collect();
    assert_eq!(low, (0..50).collect::<Vec<_>>());
    assert_eq!(high, (100..150).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_fan_in_add_after_close_is_noop() {
    let token = CancellationToken::new();
    let group = FanIn::<i32>::new(&token, std::iter::empty());
    let merged = group.chan();
    group.close();

    let (_tx, rx) = channel(1);
    let id = group.add(rx);
    assert!(!group.contains(id));
    assert!(group.is_empty());
    assert_eq!(recv(&merged).await, None);
}

#[tokio::test]
async fn test_fan_in_try_chan_after_close() {
    let token = CancellationToken::new();
    let group = FanIn::<i32>::new(&token, std::iter::empty());
    group.close();
    assert_eq!(group.try_chan().unwrap_err(), LifecycleError::Closed);
}

#[tokio::test]
#[should_panic(expected = "already closed")]
async fn test_fan_in_chan_after_close_panics() {
    let token = CancellationToken::new();
    let group = FanIn::<i32>::new(&token, std::iter::empty());
    group.close();
    let _ = group.chan();
}

// =============================================================================
// Fan-out
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fan_out_broadcast_add_remove() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(0);
    let producer = tx.clone();
    tokio::spawn(async move {
        for i in 1..=3 {
            producer.send(i).await.unwrap();
        }
    });

    let group = FanOut::new(&token, rx);
    let out1 = group.add(3);
    let out2 = group.add(3);
    group.start();

    assert_eq!(recv(&out1).await, Some(1));
    assert_eq!(recv(&out2).await, Some(1));
    assert_eq!(recv(&out1).await, Some(2));
    assert_eq!(recv(&out2).await, Some(2));

    assert!(group.remove(&out1));
    assert_eq!(recv(&out1).await, None);
    assert_eq!(recv(&out2).await, Some(3));

    let out3 = group.add(1);
    tx.send(4).await.unwrap();
    assert_eq!(recv(&out2).await, Some(4));
    assert_eq!(recv(&out3).await, Some(4));
    assert_eq!(group.sink_count(), 2);

    group.close();
    assert_eq!(recv(&out2).await, None);
    assert_eq!(recv(&out3).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_closes_sinks_when_input_ends() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    let first = group.add(3);
    let second = group.add(3);
    group.start();

    for i in 1..=3 {
        tx.send(i).await.unwrap();
    }
    drop(tx);

    let first: Vec<i32> = timeout(WAIT, first.into_stream().collect()).await.unwrap();
    let second: Vec<i32> = timeout(WAIT, second.into_stream().collect()).await.unwrap();
    assert_eq!(first, vec![1, 2, 3]);
    assert_eq!(second, vec![1, 2, 3]);
    assert!(group.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_slow_sink_does_not_block_others() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    let stalled = group.add(0);
    let fast = group.add(8);
    group.start();

    for i in 1..=5 {
        tx.send(i).await.unwrap();
    }
    for i in 1..=5 {
        assert_eq!(recv(&fast).await, Some(i));
    }

    // Values for the stalled sink were handed to detached senders.
    let mut late = Vec::new();
    for _ in 0..5 {
        late.push(recv(&stalled).await.unwrap());
    }
    late.sort_unstable();
    assert_eq!(late, vec![1, 2, 3, 4, 5]);
    group.close();
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_remove_discards_queued_values() {
    let token = CancellationToken::new();
    let (tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    let kept = group.add(4);
    let removed = group.add(4);
    group.start();

    for i in 1..=3 {
        tx.send(i).await.unwrap();
    }
    for i in 1..=3 {
        assert_eq!(recv(&kept).await, Some(i));
    }
    assert_eq!(removed.len(), 3);

    assert!(group.remove(&removed));
    assert!(removed.is_empty());
    assert_eq!(removed.try_recv(), Err(TryRecvError::Closed));
    assert_eq!(recv(&removed).await, None);
    assert_eq!(group.sink_count(), 1);

    tx.send(4).await.unwrap();
    assert_eq!(recv(&kept).await, Some(4));
    group.close();
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_closes_on_token() {
    let token = CancellationToken::new();
    let (_tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    let sink = group.add(1);
    group.start();

    token.cancel();
    assert_eq!(recv(&sink).await, None);
    assert!(group.is_closed());
    assert_eq!(group.try_add(1).unwrap_err(), LifecycleError::Closed);
}

#[tokio::test]
async fn test_fan_out_cancelled_before_start() {
    let token = CancellationToken::new();
    let (_tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    let sink = group.add(1);

    token.cancel();
    assert_eq!(group.try_start(), Err(LifecycleError::Closed));
    assert!(sink.is_closed());
}

#[tokio::test]
async fn test_fan_out_remove_unknown_sink() {
    let token = CancellationToken::new();
    let (_tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    let (_other_tx, other) = channel::<i32>(1);

    assert!(!group.remove(&other));
    let sink = group.add(1);
    assert!(group.remove(&sink));
    assert!(!group.remove(&sink));
    assert_eq!(group.sink_count(), 0);
}

#[tokio::test]
async fn test_fan_out_start_is_idempotent() {
    let token = CancellationToken::new();
    let (_tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    group.start();
    group.start();
    assert!(group.is_started());
    group.close();
    group.close();
    assert!(group.is_closed());
}

#[tokio::test]
#[should_panic(expected = "already closed")]
async fn test_fan_out_start_after_close_panics() {
    let token = CancellationToken::new();
    let (_tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    group.start();
    group.close();
    group.start();
}

#[tokio::test]
#[should_panic(expected = "already closed")]
async fn test_fan_out_add_after_close_panics() {
    let token = CancellationToken::new();
    let (_tx, rx) = channel::<i32>(0);
    let group = FanOut::new(&token, rx);
    group.close();
    let _ = group.add(1);
}
