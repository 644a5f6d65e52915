//! Overlap debouncing.
//!
//! Physics broad-phases report jittery overlaps: an object resting against a
//! finger produces bursts of begin/end pairs as it wobbles across the
//! collision margin. [`OverlapDebouncer`] hides that jitter behind one clean
//! begin/end stream per entity:
//!
//! * a raw end is held back as a pending end instead of being forwarded;
//! * a raw begin for the same entity within `max_overlap_event_time_gap` of
//!   its pending end cancels that end, and no new begin is emitted;
//! * one shared flush timer per channel confirms pending ends once they are
//!   older than the gap. Confirmed ends carry the original end timestamp,
//!   not the flush time.
//!
//! An entity is either in the active set or has a pending end, never both.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::config::OverlapConfig;
use crate::facts::EntityId;
use crate::timer::{Scheduler, TimerHandle, TimerTarget};

/// A debounced notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactSignal {
    Begin { other: EntityId, time: f64 },
    End { other: EntityId, time: f64 },
}

impl ContactSignal {
    pub fn other(&self) -> EntityId {
        match self {
            Self::Begin { other, .. } | Self::End { other, .. } => *other,
        }
    }
}

/// An end notification waiting to be confirmed or cancelled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentlyEnded {
    pub other: EntityId,
    pub time: f64,
}

/// Debounce state of one channel (grasp or contact) of one sensor shape.
#[derive(Debug)]
pub struct OverlapDebouncer {
    target: TimerTarget,
    max_gap: f64,
    flush_delay: f64,
    active: BTreeSet<EntityId>,
    recently_ended: Vec<RecentlyEnded>,
    flush_timer: Option<TimerHandle>,
}

impl OverlapDebouncer {
    /// `target` is what the flush timer of this channel fires; the owner
    /// routes it back to [`OverlapDebouncer::on_flush`].
    pub fn new(target: TimerTarget, config: &OverlapConfig) -> Self {
        Self {
            target,
            max_gap: config.max_overlap_event_time_gap,
            flush_delay: config.flush_delay(),
            active: BTreeSet::new(),
            recently_ended: Vec::new(),
            flush_timer: None,
        }
    }

    pub fn is_active(&self, other: EntityId) -> bool {
        self.active.contains(&other)
    }

    pub fn is_pending_end(&self, other: EntityId) -> bool {
        self.recently_ended.iter().any(|ev| ev.other == other)
    }

    pub fn active_contacts(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.active.iter().copied()
    }

    pub fn pending_ends(&self) -> &[RecentlyEnded] {
        &self.recently_ended
    }

    pub fn flush_timer(&self) -> Option<TimerHandle> {
        self.flush_timer
    }

    /// Handles a raw begin that already passed the owner's filters.
    pub fn on_raw_begin(
        &mut self,
        other: EntityId,
        time: f64,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<ContactSignal> {
        let mut out = Vec::new();

        if let Some(idx) = self.recently_ended.iter().position(|ev| ev.other == other) {
            let pending = self.recently_ended.remove(idx);
            if time - pending.time < self.max_gap {
                debug!(%other, gap = time - pending.time, "overlap renewed within gap, contact is continuous");
                self.active.insert(other);
                if self.recently_ended.is_empty() {
                    self.cancel_flush(scheduler);
                }
                return out;
            }
            // Old enough to be confirmed, the flush just has not run yet.
            // Confirm it here so the end precedes the new begin.
            out.push(ContactSignal::End {
                other,
                time: pending.time,
            });
            if self.recently_ended.is_empty() {
                self.cancel_flush(scheduler);
            }
        }

        if !self.active.insert(other) {
            trace!(%other, "duplicate overlap begin ignored");
            return out;
        }
        out.push(ContactSignal::Begin { other, time });
        out
    }

    /// Handles a raw end that already passed the owner's filters. Nothing is
    /// emitted immediately; the end waits for the flush timer.
    pub fn on_raw_end(&mut self, other: EntityId, time: f64, scheduler: &mut dyn Scheduler) {
        if !self.active.remove(&other) {
            trace!(%other, "overlap end for an inactive entity ignored");
            return;
        }
        self.recently_ended.push(RecentlyEnded { other, time });

        let timer_running = self.flush_timer.is_some_and(|h| scheduler.is_active(h));
        if !timer_running {
            self.flush_timer = Some(scheduler.schedule(self.target, time + self.flush_delay));
        }
    }

    /// Flush timer callback: confirms every pending end older than the gap
    /// and re-arms the timer while younger ones remain.
    pub fn on_flush(&mut self, now: f64, scheduler: &mut dyn Scheduler) -> Vec<ContactSignal> {
        self.flush_timer = None;

        let max_gap = self.max_gap;
        let mut confirmed = Vec::new();
        self.recently_ended.retain(|ev| {
            if now - ev.time > max_gap {
                confirmed.push(ContactSignal::End {
                    other: ev.other,
                    time: ev.time,
                });
                false
            } else {
                true
            }
        });

        if !self.recently_ended.is_empty() {
            self.flush_timer = Some(scheduler.schedule(self.target, now + self.flush_delay));
        }
        confirmed
    }

    /// Ends every active contact right away, bypassing the debounce. Pending
    /// ends are left to the flush timer.
    pub fn force_end_active(&mut self, now: f64) -> Vec<ContactSignal> {
        std::mem::take(&mut self.active)
            .into_iter()
            .map(|other| ContactSignal::End { other, time: now })
            .collect()
    }

    /// Confirms every pending end immediately and cancels the flush timer.
    pub fn flush_all(&mut self, scheduler: &mut dyn Scheduler) -> Vec<ContactSignal> {
        self.cancel_flush(scheduler);
        self.recently_ended
            .drain(..)
            .map(|ev| ContactSignal::End {
                other: ev.other,
                time: ev.time,
            })
            .collect()
    }

    fn cancel_flush(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(handle) = self.flush_timer.take() {
            scheduler.cancel(handle);
        }
    }
}
