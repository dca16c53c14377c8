//! The in-flight conversion latch.
//!
//! `PipelineGate` is a two-state latch, not a mutex. Closing it on behalf of
//! one batch yields a `GateHold`, from which the dispatch loop mints one
//! `GateLease` per conversion it starts. The gate reopens once the last lease
//! is gone:
//!
//! - `GateLease::complete` schedules the release `release_delay` after the
//!   completion time;
//! - `GateLease::fail`, or dropping a lease without completing it, forces an
//!   immediate release;
//! - a hold dropped without minting any lease reopens the gate on the spot.
//!
//! Because every release is tied to a `Drop`, a batch or conversion that is
//! abandoned mid-way can never leave the gate closed.

use log::{debug, warn};
use web_time::{Duration, Instant};

use crate::core::StResource;

/// Identifies the batch currently holding the gate.
pub type BatchId = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Release {
    /// Conversions still outstanding
    Pending,
    /// Reopen once this instant has passed
    At(Instant),
    /// Reopen on the next refresh
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GateState {
    Open,
    Closed {
        owner: BatchId,
        outstanding: usize,
        forced: bool,
        release: Release,
    },
}

/// The process-wide in-flight conversion latch.
#[derive(Clone)]
pub struct PipelineGate {
    state: StResource<GateState>,
    release_delay: Duration,
}

impl PipelineGate {
    /// Creates an open gate that reopens `release_delay` after the last
    /// conversion of a batch completes.
    pub fn new(release_delay: Duration) -> Self {
        PipelineGate {
            state: StResource::new(GateState::Open),
            release_delay,
        }
    }

    pub fn is_open(&self) -> bool {
        *self.state.get() == GateState::Open
    }

    /// The batch holding the gate, if it is closed.
    pub fn owner(&self) -> Option<BatchId> {
        match *self.state.get() {
            GateState::Open => None,
            GateState::Closed { owner, .. } => Some(owner),
        }
    }

    /// Closes the gate for `owner`.
    ///
    /// # Returns
    /// The hold that issues the batch's leases, or `None`, leaving the gate
    /// untouched, if it was already closed
    pub fn close(&self, owner: BatchId) -> Option<GateHold> {
        let mut state = self.state.get_mut();
        if *state != GateState::Open {
            return None;
        }
        *state = GateState::Closed {
            owner,
            outstanding: 0,
            forced: false,
            release: Release::Pending,
        };
        Some(GateHold {
            state: self.state.clone(),
            owner,
            release_delay: self.release_delay,
            issued: 0,
        })
    }

    /// Fires a scheduled release whose time has come.
    ///
    /// # Returns
    /// `true` if this call reopened the gate
    pub fn refresh(&self, now: Instant) -> bool {
        let mut state = self.state.get_mut();
        let GateState::Closed { owner, release, .. } = *state else {
            return false;
        };

        let due = match release {
            Release::Pending => false,
            Release::Immediate => true,
            Release::At(deadline) => now >= deadline,
        };
        if due {
            *state = GateState::Open;
            debug!("Gate released by batch {}.", owner);
        }
        due
    }
}

/// A batch's ownership of the closed gate, alive while its conversions are
/// being set up.
pub struct GateHold {
    state: StResource<GateState>,
    owner: BatchId,
    release_delay: Duration,
    issued: usize,
}

impl GateHold {
    pub fn owner(&self) -> BatchId {
        self.owner
    }

    /// Issues a lease for one more conversion of this batch.
    pub fn lease(&mut self) -> GateLease {
        if let GateState::Closed {
            owner,
            outstanding,
            release,
            ..
        } = &mut *self.state.get_mut()
        {
            if *owner == self.owner {
                *outstanding += 1;
                *release = Release::Pending;
            }
        }
        self.issued += 1;
        GateLease {
            state: self.state.clone(),
            owner: self.owner,
            release_delay: self.release_delay,
            released: false,
        }
    }
}

impl Drop for GateHold {
    fn drop(&mut self) {
        if self.issued > 0 {
            return;
        }
        let mut state = self.state.get_mut();
        if matches!(*state, GateState::Closed { owner, .. } if owner == self.owner) {
            *state = GateState::Open;
            debug!("Batch {} started no conversion, gate reopened.", self.owner);
        }
    }
}

/// One conversion's hold on a closed gate.
///
/// Must be settled with `complete` or `fail`; a lease dropped unsettled
/// counts as a failure.
pub struct GateLease {
    state: StResource<GateState>,
    owner: BatchId,
    release_delay: Duration,
    released: bool,
}

impl GateLease {
    /// Settles the lease after a successful commit at `now`.
    pub fn complete(mut self, now: Instant) {
        self.settle(false, Some(now));
    }

    /// Settles the lease after a failed conversion; the gate will reopen
    /// without delay once the batch's other conversions are done.
    pub fn fail(mut self) {
        self.settle(true, None);
    }

    fn settle(&mut self, failed: bool, now: Option<Instant>) {
        if self.released {
            return;
        }
        self.released = true;

        let mut state = self.state.get_mut();
        let GateState::Closed {
            owner,
            outstanding,
            forced,
            release,
        } = &mut *state
        else {
            return;
        };
        // The gate already reopened and a later batch owns it.
        if *owner != self.owner {
            return;
        }

        *outstanding = outstanding.saturating_sub(1);
        *forced |= failed;
        if *outstanding > 0 {
            return;
        }

        *release = match (*forced, now) {
            (false, Some(now)) => Release::At(now + self.release_delay),
            _ => Release::Immediate,
        };
    }
}

impl Drop for GateLease {
    fn drop(&mut self) {
        if !self.released {
            warn!("Conversion for batch {} ended without settling its gate lease.", self.owner);
            self.settle(true, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(100);

    #[test]
    fn test_gate_starts_open() {
        let gate = PipelineGate::new(DELAY);
        assert!(gate.is_open());
        assert_eq!(gate.owner(), None);
        assert!(!gate.refresh(Instant::now()));
    }

    #[test]
    fn test_close_is_exclusive() {
        let gate = PipelineGate::new(DELAY);
        let mut hold = gate.close(1).unwrap();
        let _lease = hold.lease();

        assert!(gate.close(2).is_none());
        assert_eq!(gate.owner(), Some(1));
        assert_eq!(hold.owner(), 1);
    }

    #[test]
    fn test_hold_without_leases_reopens_on_drop() {
        let gate = PipelineGate::new(DELAY);
        let hold = gate.close(1).unwrap();
        assert!(!gate.is_open());

        drop(hold);
        assert!(gate.is_open());
    }

    #[test]
    fn test_hold_with_leases_keeps_gate_closed() {
        let gate = PipelineGate::new(DELAY);
        let mut hold = gate.close(1).unwrap();
        let lease = hold.lease();
        drop(hold);

        assert!(!gate.is_open());
        assert!(!gate.refresh(Instant::now() + Duration::from_secs(10)));
        lease.fail();
        assert!(gate.refresh(Instant::now()));
    }

    #[test]
    fn test_release_fires_after_delay_from_completion() {
        let gate = PipelineGate::new(DELAY);
        let t0 = Instant::now();
        let lease = gate.close(1).unwrap().lease();

        assert!(!gate.refresh(t0 + Duration::from_secs(10)));

        let completed_at = t0 + Duration::from_millis(50);
        lease.complete(completed_at);
        assert!(!gate.refresh(completed_at + Duration::from_millis(99)));
        assert!(!gate.is_open());
        assert!(gate.refresh(completed_at + DELAY));
        assert!(gate.is_open());
    }

    #[test]
    fn test_waits_for_last_lease() {
        let gate = PipelineGate::new(DELAY);
        let t0 = Instant::now();
        let mut hold = gate.close(1).unwrap();
        let first = hold.lease();
        let second = hold.lease();
        drop(hold);

        first.complete(t0);
        assert!(!gate.refresh(t0 + DELAY));

        let later = t0 + Duration::from_secs(1);
        second.complete(later);
        assert!(!gate.refresh(later));
        assert!(gate.refresh(later + DELAY));
    }

    #[test]
    fn test_failure_forces_immediate_release() {
        let gate = PipelineGate::new(DELAY);
        let t0 = Instant::now();
        let mut hold = gate.close(1).unwrap();
        let ok = hold.lease();
        let failing = hold.lease();

        failing.fail();
        ok.complete(t0);
        assert!(gate.refresh(t0));
    }

    #[test]
    fn test_dropped_lease_releases_gate() {
        let gate = PipelineGate::new(DELAY);
        drop(gate.close(1).unwrap().lease());

        assert!(gate.refresh(Instant::now()));
        assert!(gate.is_open());
    }
}
