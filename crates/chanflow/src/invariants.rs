//! Debug assertion macros for pipeline invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so release
//! builds pay nothing for them.

// =============================================================================
// INV-CHAN-01: Bounded Queue
// =============================================================================

/// Assert that a queue never holds more than its capacity plus one value per
/// parked receiver.
///
/// **Invariant**: `queue.len() <= capacity + parked_receivers`
///
/// Used in: `Shared::try_push()` after enqueueing
macro_rules! debug_assert_within_capacity {
    ($len:expr, $capacity:expr, $parked:expr) => {
        debug_assert!(
            $len <= $capacity.saturating_add($parked),
            "INV-CHAN-01 violated: {} values queued with capacity {} and {} parked receivers",
            $len,
            $capacity,
            $parked
        )
    };
}

// =============================================================================
// INV-DEB-01: Non-Empty Batches
// =============================================================================

/// Assert that a debounced batch holds at least one value before emission.
///
/// **Invariant**: `emit(batch) → !batch.is_empty()`
///
/// Used in: `debounce_all()` before writing a settled batch
macro_rules! debug_assert_batch_nonempty {
    ($batch:expr) => {
        debug_assert!(
            !$batch.is_empty(),
            "INV-DEB-01 violated: settled batch is empty"
        )
    };
}

// =============================================================================
// INV-GRP-01: Monotonic Lifecycle
// =============================================================================

/// Assert that a closed group is never started again.
///
/// **Invariant**: `closed → !started_now`
///
/// Used in: `Lifecycle::start()`
macro_rules! debug_assert_not_resurrected {
    ($closed:expr, $starting:expr) => {
        debug_assert!(
            !($closed && $starting),
            "INV-GRP-01 violated: closed group is being started"
        )
    };
}

// =============================================================================
// INV-GRP-02: Detached After Removal
// =============================================================================

/// Assert that a removed member is no longer registered.
///
/// **Invariant**: `remove(id) → !members.contains(id)`
///
/// Used in: `FanIn::remove()`, `FanOut::remove()`
macro_rules! debug_assert_member_detached {
    ($members:expr, $id:expr) => {
        debug_assert!(
            !$members.contains_key($id),
            "INV-GRP-02 violated: {} still registered after removal",
            $id
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_batch_nonempty;
pub(crate) use debug_assert_member_detached;
pub(crate) use debug_assert_not_resurrected;
pub(crate) use debug_assert_within_capacity;
