//! Deterministic one-shot timers on simulation time.
//!
//! Components never own a clock or a thread. They ask a [`Scheduler`] for a
//! callback at some simulation time and remember the returned handle so they
//! can cancel it; the owner of the [`TimerQueue`] pops due timers and routes
//! each one to the component named by its [`TimerTarget`].

use crate::facts::ShapeId;

/// Handle of a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Which callback a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerTarget {
    /// Delayed flush of pending grasp-channel ends of a shape.
    GraspFlush(ShapeId),
    /// Delayed flush of pending contact-channel ends of a shape.
    ContactFlush(ShapeId),
    /// Fixed-rate update of the pick-and-place classifier.
    PickAndPlaceUpdate,
}

pub trait Scheduler {
    /// Schedules `target` to fire once `now >= fire_at`.
    fn schedule(&mut self, target: TimerTarget, fire_at: f64) -> TimerHandle;

    /// Cancels a pending timer. Returns `false` if it already fired or was
    /// never scheduled.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    fn is_active(&self, handle: TimerHandle) -> bool;
}

/// A timer whose deadline has passed. Callbacks run as of `fire_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueTimer {
    pub handle: TimerHandle,
    pub target: TimerTarget,
    pub fire_at: f64,
}

/// Pending timers ordered by deadline, ties broken by scheduling order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    pending: Vec<DueTimer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the earliest timer due at `now`, if any.
    pub fn pop_due(&mut self, now: f64) -> Option<DueTimer> {
        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, t)| t.fire_at <= now)
            .min_by(|(_, a), (_, b)| {
                a.fire_at
                    .total_cmp(&b.fire_at)
                    .then(a.handle.cmp(&b.handle))
            })
            .map(|(idx, _)| idx)?;
        Some(self.pending.remove(idx))
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<f64> {
        self.pending
            .iter()
            .map(|t| t.fire_at)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Scheduler for TimerQueue {
    fn schedule(&mut self, target: TimerTarget, fire_at: f64) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.push(DueTimer {
            handle,
            target,
            fire_at,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|t| t.handle != handle);
        self.pending.len() != before
    }

    fn is_active(&self, handle: TimerHandle) -> bool {
        self.pending.iter().any(|t| t.handle == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order_then_schedule_order() {
        let mut q = TimerQueue::new();
        let late = q.schedule(TimerTarget::PickAndPlaceUpdate, 2.0);
        let first = q.schedule(TimerTarget::GraspFlush(ShapeId(0)), 1.0);
        let tie = q.schedule(TimerTarget::ContactFlush(ShapeId(0)), 1.0);

        assert_eq!(q.next_deadline(), Some(1.0));
        assert_eq!(q.pop_due(0.5), None);
        assert_eq!(q.pop_due(5.0).map(|t| t.handle), Some(first));
        assert_eq!(q.pop_due(5.0).map(|t| t.handle), Some(tie));
        let last = q.pop_due(5.0).expect("late timer due");
        assert_eq!((last.handle, last.fire_at), (late, 2.0));
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut q = TimerQueue::new();
        let h = q.schedule(TimerTarget::PickAndPlaceUpdate, 1.0);
        assert!(q.is_active(h));
        assert!(q.cancel(h));
        assert!(!q.is_active(h));
        assert!(!q.cancel(h));
        assert_eq!(q.pop_due(10.0), None);
    }
}
