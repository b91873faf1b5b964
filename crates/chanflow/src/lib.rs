//! Stream-composition primitives for concurrent pipelines
//!
//! This crate provides small building blocks for wiring Tokio tasks
//! together through bounded channels, with cooperative cancellation
//! throughout.
//!
//! # Features
//!
//! - **Channels**: bounded MPMC [`channel`]s with a rendezvous mode
//!   (capacity `0`), explicit close, and a stable [`ChanId`]
//! - **Cancellable ops**: [`read_one`], [`write_one`], [`read_while`],
//!   [`drain`], [`close_and_drain`]; cancellation is an outcome, not an error
//! - **Debounce**: [`debounce_all`], [`debounce_first`], [`debounce_last`]
//!   group a stream into batches separated by a quiet window
//! - **Fan-in**: [`FanIn`] merges a mutable set of sources into one output
//! - **Fan-out**: [`FanOut`] broadcasts one input to a mutable set of sinks
//!
//! Every wait is a single `select!` over the channel, a private close signal
//! where one exists, and a [`CancellationToken`]. Group state sits behind one
//! mutex that is never held across an `.await`.
//!
//! # Example
//!
//! ```ignore
//! use chanflow::{channel, debounce_all, CancellationToken};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let token = CancellationToken::new();
//!     let (tx, rx) = channel::<u32>(16);
//!     let batches = debounce_all(&token, rx, Duration::from_millis(10));
//!
//!     for i in 0..3 {
//!         tx.send(i).await.unwrap();
//!     }
//!
//!     assert_eq!(batches.recv().await, Some(vec![0, 1, 2]));
//!     token.cancel();
//! }
//! ```

mod channel;
mod config;
mod debounce;
mod error;
mod fan_in;
mod fan_out;
mod invariants;
mod lifecycle;
mod ops;
mod receiver;
mod sender;

pub use channel::{channel, ChanId};
pub use config::FanInConfig;
pub use debounce::{debounce_all, debounce_first, debounce_last};
pub use error::{LifecycleError, SendError, TryRecvError, TrySendError};
pub use fan_in::FanIn;
pub use fan_out::FanOut;
pub use ops::{cancel_after, close_and_drain, drain, read_one, read_while, write_one, Read, Write};
pub use receiver::Receiver;
pub use sender::Sender;

// Re-export the token type every operation takes, and stream combinators
// for `Receiver::into_stream`.
pub use tokio_stream::StreamExt;
pub use tokio_util::sync::CancellationToken;
