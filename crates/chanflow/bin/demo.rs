//! Demonstration of chanflow features.
//!
//! Run with: `RUST_LOG=chanflow=debug cargo run -p chanflow --features demo --bin demo`

use chanflow::{
    cancel_after, channel, close_and_drain, debounce_all, debounce_last, read_one, CancellationToken,
    FanIn, FanInConfig, FanOut, Read, StreamExt,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== chanflow Demo ===\n");

    demo_debounce().await?;
    demo_fan_in().await?;
    demo_fan_out().await?;
    demo_deadline().await?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

/// Demo 1: Bursts separated by silence become batches
async fn demo_debounce() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 1: Debounce ---");

    let token = CancellationToken::new();
    let window = Duration::from_millis(20);
    let (tx, rx) = channel::<u32>(8);
    let batches = debounce_all(&token, rx, window);

    let producer = tokio::spawn(async move {
        for burst in [3u32, 5, 2] {
            for i in 0..burst {
                tx.send(i).await.expect("send failed");
            }
            tokio::time::sleep(window * 2).await;
        }
    });

    for _ in 0..3 {
        if let Some(batch) = batches.recv().await {
            println!("  Batch of {}: {:?}", batch.len(), batch);
        }
    }
    producer.await?;
    token.cancel();

    let (tx, rx) = channel::<&str>(8);
    let token = CancellationToken::new();
    let last = debounce_last(&token, rx, window);
    for word in ["s", "se", "sea", "search"] {
        tx.send(word).await?;
    }
    println!("  Settled query: {:?}", last.recv().await);
    token.cancel();

    println!("  ✓ Debounce complete\n");
    Ok(())
}

/// Demo 2: Merge sources, add and remove while running
async fn demo_fan_in() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 2: Fan-In ---");

    let token = CancellationToken::new();
    let (tx_a, rx_a) = channel::<String>(4);
    let (tx_b, rx_b) = channel::<String>(4);
    let group = FanIn::with_config(&token, [rx_a], FanInConfig::buffered(8));
    let merged = group.chan();

    tx_a.send("a1".into()).await?;
    group.add(rx_b);
    tx_b.send("b1".into()).await?;

    for _ in 0..2 {
        if let Read::Value(value) = read_one(&token, &merged).await {
            println!("  Merged: {}", value);
        }
    }

    group.remove(tx_b.id());
    println!("  Removed source b, {} source(s) left", group.len());

    group.close();
    let leftover = close_and_drain(&merged).await;
    println!("  Drained {} leftover value(s)", leftover);
    println!("  ✓ Fan-in complete\n");
    Ok(())
}

/// Demo 3: Broadcast to several sinks
async fn demo_fan_out() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 3: Fan-Out ---");

    let token = CancellationToken::new();
    let (tx, rx) = channel::<u64>(0);
    let group = FanOut::new(&token, rx);
    let first = group.add(4);
    let second = group.add(4);
    group.start();

    for i in 1..=3 {
        tx.send(i).await?;
    }
    drop(tx);

    let first: Vec<u64> = first.into_stream().collect().await;
    let second: Vec<u64> = second.into_stream().collect().await;
    println!("  Sink 1 saw {:?}", first);
    println!("  Sink 2 saw {:?}", second);
    println!("  ✓ Fan-out complete\n");
    Ok(())
}

/// Demo 4: A deadline derived from a caller token
async fn demo_deadline() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 4: Deadline ---");

    let token = CancellationToken::new();
    let deadline = cancel_after(&token, Duration::from_millis(30));
    let (_tx, rx) = channel::<u8>(1);

    match read_one(&deadline, &rx).await {
        Read::Cancelled => println!("  Read gave up at the deadline"),
        other => println!("  Unexpected outcome: {:?}", other),
    }
    println!("  Caller token still alive: {}", !token.is_cancelled());
    println!("  ✓ Deadline complete");
    Ok(())
}
