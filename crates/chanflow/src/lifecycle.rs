//! Group lifecycle shared by fan-in and fan-out.

use crate::error::LifecycleError;
#[cfg(debug_assertions)]
use crate::invariants::debug_assert_not_resurrected;

/// Lifecycle flags of a group: `unstarted → started → closed`.
///
/// Always mutated under the owning group's lock.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    started: bool,
    closed: bool,
}

impl Lifecycle {
    /// Marks the group started.
    ///
    /// Returns `Ok(true)` if this call started it and `Ok(false)` if it was
    /// already started, closed or not. Starting a group that was closed
    /// before it ever started is an error.
    pub(crate) fn start(&mut self) -> Result<bool, LifecycleError> {
        if self.started {
            return Ok(false);
        }
        if self.closed {
            return Err(LifecycleError::Closed);
        }

        // INV-GRP-01: closed is terminal
        #[cfg(debug_assertions)]
        debug_assert_not_resurrected!(self.closed, true);

        self.started = true;
        Ok(true)
    }

    /// Marks the group closed. Returns `true` if this call closed it.
    pub(crate) fn close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    #[inline]
    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}
