//! Pick-and-place classification of a grasped object's motion.
//!
//! While an object is grasped the listener samples its location at a fixed
//! rate and walks a four-state classifier:
//!
//! ```text
//!            lifted above MinPickUpHeight
//!   None ─────────────────────────────────▶ PickUp ──(still lifted)──▶ TransportOrPutDown
//!    │ ▲                                      │                                │
//!    │ └──────(fell back before confirmed)────┘                                │
//!    │ └──────────────(put-down found by backtrace)────────────────────────────┘
//!    │ moved MinSlideDistXY on the support
//!    ▼
//!   Slide ──(stopped or lifted)──▶ None
//! ```
//!
//! Heights are relative to the last relevant anchor (the grasp location, or
//! where the previous slide or put-down ended). Reported intervals describe
//! when things physically happened: a put-down is confirmed only after the
//! object stayed low and still for the backtrack duration, but is reported
//! with the time it first came down.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::PickAndPlaceConfig;
use crate::error::{ConfigError, InitError};
use crate::facts::{EntityId, Location, ManipulatorEvent, SubEvent};
use crate::motion::MotionBuffer;
use crate::timer::{Scheduler, TimerHandle, TimerTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickAndPlaceState {
    None,
    Slide,
    PickUp,
    TransportOrPutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Inactive,
    Initialized,
    Started,
    Finished,
}

#[derive(Debug)]
pub struct PickAndPlaceListener {
    owner: EntityId,
    config: PickAndPlaceConfig,
    lifecycle: Lifecycle,

    grasped: Option<EntityId>,
    state: PickAndPlaceState,
    prev_relevant_location: Location,
    prev_relevant_time: f64,

    lift_off_happened: bool,
    lift_off_location: Location,
    transport_start: f64,

    slide_last_location: Location,
    slide_last_time: f64,

    recent_movement: MotionBuffer,
    update_timer: Option<TimerHandle>,
}

impl PickAndPlaceListener {
    pub fn new(owner: EntityId, config: PickAndPlaceConfig) -> Self {
        let recent_movement = MotionBuffer::new(
            config.recent_movement_buffer_size,
            config.recent_movement_buffer_duration,
        );
        Self {
            owner,
            config,
            lifecycle: Lifecycle::Inactive,
            grasped: None,
            state: PickAndPlaceState::None,
            prev_relevant_location: Location::default(),
            prev_relevant_time: 0.0,
            lift_off_happened: false,
            lift_off_location: Location::default(),
            transport_start: 0.0,
            slide_last_location: Location::default(),
            slide_last_time: 0.0,
            recent_movement,
            update_timer: None,
        }
    }

    pub fn state(&self) -> PickAndPlaceState {
        self.state
    }

    pub fn grasped(&self) -> Option<EntityId> {
        self.grasped
    }

    pub fn lift_off_happened(&self) -> bool {
        self.lift_off_happened
    }

    /// Where the current pick-up left the anchor height, if it did.
    pub fn lift_off_location(&self) -> Option<Location> {
        self.lift_off_happened.then_some(self.lift_off_location)
    }

    pub fn update_timer(&self) -> Option<TimerHandle> {
        self.update_timer
    }

    pub fn recent_movement(&self) -> &MotionBuffer {
        &self.recent_movement
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle == Lifecycle::Started
    }

    pub fn init(&mut self) -> Result<(), InitError> {
        if self.lifecycle != Lifecycle::Inactive {
            return Ok(());
        }
        if self.config.update_rate <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "update_rate",
                value: self.config.update_rate,
            }
            .into());
        }
        if self.config.recent_movement_buffer_size == 0 {
            return Err(ConfigError::EmptyMotionBuffer.into());
        }
        self.lifecycle = Lifecycle::Initialized;
        Ok(())
    }

    pub fn start(&mut self) {
        if self.lifecycle == Lifecycle::Initialized {
            self.lifecycle = Lifecycle::Started;
            info!(owner = %self.owner, "pick-and-place listener started");
        }
    }

    /// Terminates whatever is in progress, as if the grasp ended at `now`,
    /// and stops listening. Idempotent.
    pub fn finish(
        &mut self,
        now: f64,
        forced: bool,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<ManipulatorEvent> {
        if matches!(self.lifecycle, Lifecycle::Finished | Lifecycle::Inactive) {
            return Vec::new();
        }
        let events = match self.grasped {
            Some(other) => self.on_grasp_end(other, now, scheduler),
            None => Vec::new(),
        };
        self.cancel_update(scheduler);
        self.lifecycle = Lifecycle::Finished;
        info!(owner = %self.owner, forced, "pick-and-place listener finished");
        events
    }

    /// Starts tracking `other`. Only one object is tracked at a time; grasps
    /// of further objects are ignored until it is released.
    #[instrument(skip(self, scheduler), fields(owner = %self.owner))]
    pub fn on_grasp_begin(
        &mut self,
        other: EntityId,
        time: f64,
        location: Location,
        scheduler: &mut dyn Scheduler,
    ) {
        if !self.is_started() {
            return;
        }
        if let Some(current) = self.grasped {
            debug!(%current, "already tracking a grasped object, ignoring");
            return;
        }
        self.grasped = Some(other);
        self.reset(location, time);
        self.update_timer = Some(scheduler.schedule(
            TimerTarget::PickAndPlaceUpdate,
            time + self.config.update_rate,
        ));
        debug!("tracking grasped object");
    }

    /// Stops tracking `other`, reporting whatever sub-event was in progress.
    #[instrument(skip(self, scheduler), fields(owner = %self.owner))]
    pub fn on_grasp_end(
        &mut self,
        other: EntityId,
        time: f64,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<ManipulatorEvent> {
        if self.grasped != Some(other) {
            return Vec::new();
        }
        self.cancel_update(scheduler);

        let mut out = Vec::new();
        self.finish_active_event(other, time, &mut out);

        self.grasped = None;
        self.reset(self.prev_relevant_location, time);
        debug!(emitted = out.len(), "grasped object released");
        out
    }

    /// Update timer callback. `location` is the grasped object's current
    /// location; `supported` whether it rests on something, when known.
    pub fn on_update(
        &mut self,
        now: f64,
        location: Option<Location>,
        supported: Option<bool>,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<ManipulatorEvent> {
        self.update_timer = None;
        let Some(other) = self.grasped else {
            return Vec::new();
        };

        let events = match location {
            Some(location) => self.step(other, now, location, supported),
            None => {
                warn!(owner = %self.owner, %other, "grasped object has no location, skipping update");
                Vec::new()
            }
        };

        self.update_timer = Some(scheduler.schedule(
            TimerTarget::PickAndPlaceUpdate,
            now + self.config.update_rate,
        ));
        events
    }

    fn step(
        &mut self,
        other: EntityId,
        now: f64,
        location: Location,
        supported: Option<bool>,
    ) -> Vec<ManipulatorEvent> {
        let mut out = Vec::new();
        match self.state {
            PickAndPlaceState::None => self.update_none(now, location, supported),
            PickAndPlaceState::Slide => {
                self.update_slide(other, now, location, supported, &mut out)
            }
            PickAndPlaceState::PickUp => self.update_pick_up(other, now, location, &mut out),
            PickAndPlaceState::TransportOrPutDown => {
                self.update_transport_or_put_down(other, now, location, supported, &mut out)
            }
        }
        out
    }

    fn update_none(&mut self, now: f64, location: Location, supported: Option<bool>) {
        let height = location.height_above(&self.prev_relevant_location);
        let dist_xy = location.dist_xy(&self.prev_relevant_location);
        let c = &self.config;

        if dist_xy < c.slide_stop_dist_xy && height.abs() < c.slide_stop_dist_xy {
            // Not moved off the anchor yet: a later slide or lift starts now.
            self.prev_relevant_time = now;
            return;
        }

        if !self.lift_off_happened
            && height > c.min_pick_up_height
            && height <= c.max_pick_up_height
            && dist_xy <= c.max_pick_up_dist_xy
        {
            self.lift_off_happened = true;
            self.lift_off_location = location;
            self.set_state(PickAndPlaceState::PickUp, now);
            return;
        }

        if supported.unwrap_or(true)
            && dist_xy >= c.min_slide_dist_xy
            && height.abs() <= c.min_pick_up_height
        {
            self.slide_last_location = location;
            self.slide_last_time = now;
            self.set_state(PickAndPlaceState::Slide, now);
        }
    }

    fn update_slide(
        &mut self,
        other: EntityId,
        now: f64,
        location: Location,
        supported: Option<bool>,
        out: &mut Vec<ManipulatorEvent>,
    ) {
        let height = location.height_above(&self.prev_relevant_location);
        let lifted = height > self.config.min_pick_up_height || supported == Some(false);
        let moved = location.dist_xy(&self.slide_last_location) >= self.config.slide_stop_dist_xy;

        if !lifted && moved {
            self.slide_last_location = location;
            self.slide_last_time = now;
            return;
        }

        let (end, end_location) = (self.slide_last_time, self.slide_last_location);
        self.emit_slide(other, end, out);
        self.reset(end_location, end);
        if lifted {
            // Same sample may already be a lift-off from the slide's end.
            self.update_none(now, location, supported);
        }
    }

    fn update_pick_up(
        &mut self,
        other: EntityId,
        now: f64,
        location: Location,
        out: &mut Vec<ManipulatorEvent>,
    ) {
        let height = location.height_above(&self.prev_relevant_location);
        if height <= self.config.min_pick_up_height {
            debug!(owner = %self.owner, %other, height, "lift-off not sustained, back to none");
            self.lift_off_happened = false;
            self.set_state(PickAndPlaceState::None, now);
            return;
        }

        out.push(ManipulatorEvent::PickUp(
            self.sub_event(other, self.prev_relevant_time, now),
        ));
        self.transport_start = now;
        self.recent_movement.clear();
        self.recent_movement.push(now, location);
        debug!(
            owner = %self.owner,
            %other,
            drift_xy = location.dist_xy(&self.lift_off_location),
            "pick-up confirmed"
        );
        self.set_state(PickAndPlaceState::TransportOrPutDown, now);
    }

    fn update_transport_or_put_down(
        &mut self,
        other: EntityId,
        now: f64,
        location: Location,
        supported: Option<bool>,
        out: &mut Vec<ManipulatorEvent>,
    ) {
        self.recent_movement.push(now, location);
        if supported == Some(false) {
            return;
        }
        let Some(put_down_time) = self.has_put_down_event_happened(now, location) else {
            return;
        };

        out.push(ManipulatorEvent::Transport(
            self.sub_event(other, self.transport_start, put_down_time),
        ));
        out.push(ManipulatorEvent::PutDown(
            self.sub_event(other, put_down_time, now),
        ));
        self.reset(location, now);
    }

    /// Backtrace: confirms a put-down once the object has stayed low and
    /// still for the backtrack duration, returning when it came down.
    fn has_put_down_event_happened(&self, now: f64, location: Location) -> Option<f64> {
        let height = location.height_above(&self.prev_relevant_location);
        if height > self.config.max_put_down_height {
            return None;
        }
        let run_start = self.low_and_still_since(location)?;
        (now - run_start >= self.config.put_down_movement_backtrack_duration).then_some(run_start)
    }

    /// Earliest sample of the newest run of samples that are below the
    /// put-down height and within the put-down drift of `location`.
    fn low_and_still_since(&self, location: Location) -> Option<f64> {
        let anchor = self.prev_relevant_location;
        let c = &self.config;
        self.recent_movement
            .iter_newest_first()
            .take_while(|s| {
                s.location.height_above(&anchor) <= c.min_put_down_height
                    && s.location.dist_xy(&location) <= c.max_put_down_dist_xy
            })
            .last()
            .map(|s| s.time)
    }

    /// Reports the sub-event in progress when the grasp ends at `now`.
    ///
    /// The release is only confirmed once the debounce gap has passed, so
    /// updates may have run after `now`. Their samples are dropped and no
    /// reported time lies past `now`.
    fn finish_active_event(&mut self, other: EntityId, now: f64, out: &mut Vec<ManipulatorEvent>) {
        self.recent_movement.truncate_after(now);
        match self.state {
            PickAndPlaceState::None => {}
            PickAndPlaceState::Slide => self.emit_slide(other, now, out),
            PickAndPlaceState::PickUp => {
                let start = self.prev_relevant_time.min(now);
                out.push(ManipulatorEvent::PickUp(self.sub_event(other, start, now)));
                out.push(ManipulatorEvent::Transport(self.sub_event(other, now, now)));
                out.push(ManipulatorEvent::PutDown(self.sub_event(other, now, now)));
            }
            PickAndPlaceState::TransportOrPutDown => {
                let put_down_time = self
                    .recent_movement
                    .newest()
                    .and_then(|newest| self.low_and_still_since(newest.location))
                    .map_or(now, |t| t.min(now));
                let transport_start = self.transport_start.min(put_down_time);
                out.push(ManipulatorEvent::Transport(
                    self.sub_event(other, transport_start, put_down_time),
                ));
                out.push(ManipulatorEvent::PutDown(
                    self.sub_event(other, put_down_time, now),
                ));
            }
        }
    }

    /// Emits the slide that started at the anchor time, unless it was too
    /// short to count.
    fn emit_slide(&self, other: EntityId, end: f64, out: &mut Vec<ManipulatorEvent>) {
        let start = self.prev_relevant_time;
        if end - start >= self.config.min_slide_duration {
            out.push(ManipulatorEvent::Slide(self.sub_event(other, start, end)));
        } else {
            debug!(owner = %self.owner, %other, duration = end - start, "slide too short, discarded");
        }
    }

    /// Back to `None` with fresh anchors and cleared pick-up bookkeeping.
    fn reset(&mut self, location: Location, time: f64) {
        self.prev_relevant_location = location;
        self.prev_relevant_time = time;
        self.lift_off_happened = false;
        self.lift_off_location = Location::default();
        self.recent_movement.clear();
        self.set_state(PickAndPlaceState::None, time);
    }

    fn set_state(&mut self, state: PickAndPlaceState, now: f64) {
        if self.state != state {
            debug!(owner = %self.owner, from = ?self.state, to = ?state, now, "pick-and-place state change");
            self.state = state;
        }
    }

    fn cancel_update(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(handle) = self.update_timer.take() {
            scheduler.cancel(handle);
        }
    }

    fn sub_event(&self, other: EntityId, start: f64, end: f64) -> SubEvent {
        SubEvent {
            manipulator: self.owner,
            other,
            start,
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerQueue;

    const HAND: EntityId = EntityId(1);
    const CUP: EntityId = EntityId(10);
    const EPS: f64 = 1e-6;

    /// Drives one listener through its own update timer along a scripted
    /// trajectory.
    struct Rig {
        pap: PickAndPlaceListener,
        q: TimerQueue,
        events: Vec<ManipulatorEvent>,
    }

    impl Rig {
        fn grasp_at(t0: f64, start: Location) -> Self {
            let mut pap = PickAndPlaceListener::new(HAND, PickAndPlaceConfig::default());
            pap.init().expect("default config");
            pap.start();
            let mut q = TimerQueue::new();
            pap.on_grasp_begin(CUP, t0, start, &mut q);
            Self {
                pap,
                q,
                events: Vec::new(),
            }
        }

        fn run(&mut self, until: f64, path: impl Fn(f64) -> Location) {
            self.run_supported(until, path, |_| None);
        }

        fn run_supported(
            &mut self,
            until: f64,
            path: impl Fn(f64) -> Location,
            supported: impl Fn(f64) -> Option<bool>,
        ) {
            while let Some(due) = self.q.pop_due(until) {
                assert_eq!(due.target, TimerTarget::PickAndPlaceUpdate);
                let t = due.fire_at;
                let evs = self.pap.on_update(t, Some(path(t)), supported(t), &mut self.q);
                self.events.extend(evs);
            }
        }

        fn release(&mut self, t: f64) {
            let evs = self.pap.on_grasp_end(CUP, t, &mut self.q);
            self.events.extend(evs);
        }

        fn names(&self) -> Vec<&'static str> {
            self.events.iter().map(|e| e.name()).collect()
        }

        fn interval(&self, name: &str) -> (f64, f64) {
            self.events
                .iter()
                .find(|e| e.name() == name)
                .and_then(|e| e.interval())
                .unwrap_or_else(|| panic!("no {name} event in {:?}", self.names()))
        }
    }

    /// Rises to height 5 by t=0.2, then holds.
    fn lift(t: f64) -> Location {
        Location::new(0.0, 0.0, (25.0 * t.min(0.2)) as f32)
    }

    #[test]
    fn lift_becomes_pick_up_then_transport() {
        let mut rig = Rig::grasp_at(0.0, lift(0.0));

        rig.run(0.16, lift);
        assert_eq!(rig.pap.state(), PickAndPlaceState::PickUp);
        assert!(rig.pap.lift_off_happened());
        assert!(rig
            .pap
            .lift_off_location()
            .is_some_and(|at| at.height_above(&lift(0.0)) > 3.0));
        assert!(rig.events.is_empty(), "pick-up waits for confirmation");

        rig.run(0.21, lift);
        assert_eq!(rig.pap.state(), PickAndPlaceState::TransportOrPutDown);
        let (start, end) = rig.interval("pick-up");
        assert!(start.abs() < EPS);
        assert!((end - 0.2).abs() < EPS);
    }

    #[test]
    fn lift_from_rest_starts_when_motion_starts() {
        let late_lift = |t: f64| lift((t - 1.0).max(0.0));
        let mut rig = Rig::grasp_at(0.0, late_lift(0.0));
        rig.run(1.5, late_lift);

        assert_eq!(rig.names(), vec!["pick-up"]);
        let (start, end) = rig.interval("pick-up");
        assert!((start - 1.0).abs() < EPS, "lift began at t=1, got {start}");
        assert!((end - 1.2).abs() < EPS);
    }

    #[test]
    fn release_during_lift_closes_all_three() {
        let mut rig = Rig::grasp_at(0.0, lift(0.0));
        rig.run(0.16, lift);
        assert_eq!(rig.pap.state(), PickAndPlaceState::PickUp);

        rig.release(0.17);
        assert_eq!(rig.names(), vec!["pick-up", "transport", "put-down"]);
        assert!(rig.interval("pick-up").0.abs() < EPS);
        assert_eq!(rig.interval("pick-up").1, 0.17);
        assert_eq!(rig.interval("transport"), (0.17, 0.17));
        assert_eq!(rig.interval("put-down"), (0.17, 0.17));
        assert_eq!(rig.pap.lift_off_location(), None);
        assert_eq!(rig.pap.update_timer(), None);
    }

    #[test]
    fn samples_after_the_release_are_ignored() {
        // Held at height 5, then dropped right as the fingers open.
        let dropped = |t: f64| if t > 0.45 { Location::default() } else { lift(t) };
        let mut rig = Rig::grasp_at(0.0, dropped(0.0));
        rig.run(0.6, dropped);
        assert_eq!(rig.names(), vec!["pick-up"]);

        rig.release(0.45);
        assert_eq!(rig.names(), vec!["pick-up", "transport", "put-down"]);
        for event in &rig.events {
            let (start, end) = event.interval().expect("sub-event");
            assert!(start <= end && end <= 0.45, "{}: {start}..{end}", event.name());
        }
        assert_eq!(rig.interval("put-down"), (0.45, 0.45));
        assert!((rig.interval("transport").0 - 0.2).abs() < EPS);
    }

    /// Lift, carry 2 units sideways at height 5 for 1.5s, lower to height 1
    /// and hold there.
    fn carry(t: f64) -> Location {
        if t < 0.2 {
            return lift(t);
        }
        if t < 1.7 {
            let x = 2.0 * (t - 0.2) / 1.5;
            return Location::new(x as f32, 0.0, 5.0);
        }
        let z = (5.0 - 4.0 * (t - 1.7) / 0.3).max(1.0);
        Location::new(2.0, 0.0, z as f32)
    }

    #[test]
    fn put_down_is_reported_when_it_happened() {
        let mut rig = Rig::grasp_at(0.0, carry(0.0));
        rig.run(3.0, carry);
        assert_eq!(rig.names(), vec!["pick-up"], "not yet stable long enough");

        rig.run(4.0, carry);
        assert_eq!(rig.names(), vec!["pick-up", "transport", "put-down"]);

        // Height first drops below 2 on the tick after t=1.925.
        let (_, pick_up_end) = rig.interval("pick-up");
        let (transport_start, transport_end) = rig.interval("transport");
        let (put_down_start, put_down_end) = rig.interval("put-down");
        assert!((transport_start - pick_up_end).abs() < EPS);
        assert!(put_down_start > 1.925 && put_down_start < 1.975 + EPS);
        assert!((transport_end - put_down_start).abs() < EPS);
        let confirmation_delay = put_down_end - put_down_start;
        assert!(confirmation_delay >= 1.5 - EPS && confirmation_delay < 1.5 + 0.05 + EPS);

        assert_eq!(rig.pap.state(), PickAndPlaceState::None);
        assert!(!rig.pap.lift_off_happened());
    }

    /// 10 units along X over one second, then rest.
    fn slide(t: f64) -> Location {
        Location::new((10.0 * t.min(1.0)) as f32, 0.0, 0.0)
    }

    #[test]
    fn horizontal_push_is_one_slide() {
        let mut rig = Rig::grasp_at(0.0, slide(0.0));
        rig.run(0.99, slide);
        assert_eq!(rig.pap.state(), PickAndPlaceState::Slide);

        rig.run(1.5, slide);
        assert_eq!(rig.names(), vec!["slide"]);
        let (start, end) = rig.interval("slide");
        assert!(start.abs() < EPS);
        assert!((end - 1.0).abs() < EPS);
        assert_eq!(rig.pap.state(), PickAndPlaceState::None);

        rig.release(2.0);
        assert_eq!(rig.names(), vec!["slide"]);
    }

    #[test]
    fn flick_after_resting_is_too_short_to_slide() {
        // Untouched for 2s, then pushed 10 units in 0.3s.
        let flick = |t: f64| {
            let x = (10.0 * (t - 2.0) / 0.3).clamp(0.0, 10.0);
            Location::new(x as f32, 0.0, 0.0)
        };
        let mut rig = Rig::grasp_at(0.0, flick(0.0));
        rig.run(4.0, flick);

        assert!(rig.events.is_empty(), "{:?}", rig.names());
        assert_eq!(rig.pap.state(), PickAndPlaceState::None);
    }

    #[test]
    fn short_slide_cut_by_release_is_discarded() {
        // 10 units in 0.5s: far enough, not long enough.
        let fast = |t: f64| Location::new((20.0 * t) as f32, 0.0, 0.0);
        let mut rig = Rig::grasp_at(0.0, fast(0.0));
        rig.run(0.51, fast);
        assert_eq!(rig.pap.state(), PickAndPlaceState::Slide);

        rig.release(0.52);
        assert!(rig.events.is_empty());
        assert_eq!(rig.pap.state(), PickAndPlaceState::None);
        assert!(rig.q.is_empty(), "update timer cancelled on release");
    }

    #[test]
    fn slide_requires_support_when_known() {
        let mut rig = Rig::grasp_at(0.0, slide(0.0));
        rig.run_supported(1.5, slide, |_| Some(false));
        assert_eq!(rig.pap.state(), PickAndPlaceState::None);
        assert!(rig.events.is_empty());
    }

    #[test]
    fn put_down_is_held_back_while_unsupported() {
        let mut rig = Rig::grasp_at(0.0, carry(0.0));
        rig.run_supported(3.0, carry, |_| Some(false));
        assert_eq!(rig.names(), vec!["pick-up"], "low and still, but not resting on anything");

        rig.run_supported(3.2, carry, |_| Some(true));
        assert_eq!(rig.names(), vec!["pick-up", "transport", "put-down"]);
        let (put_down_start, put_down_end) = rig.interval("put-down");
        assert!(put_down_start > 1.925 && put_down_start < 1.975 + EPS);
        assert!(put_down_end > 2.95 && put_down_end < 3.1);
    }

    #[test]
    fn hop_below_confirmation_is_abandoned() {
        let hop = |t: f64| {
            let z = if (0.1..0.15).contains(&t) { 4.0 } else { 0.0 };
            Location::new(0.0, 0.0, z)
        };
        let mut rig = Rig::grasp_at(0.0, hop(0.0));
        rig.run(0.12, hop);
        assert_eq!(rig.pap.state(), PickAndPlaceState::PickUp);
        rig.run(0.3, hop);
        assert_eq!(rig.pap.state(), PickAndPlaceState::None);
        assert!(!rig.pap.lift_off_happened());
        assert!(rig.events.is_empty());
    }

    #[test]
    fn release_mid_transport_falls_back_to_release_time() {
        let mut rig = Rig::grasp_at(0.0, carry(0.0));
        rig.run(1.0, carry);
        rig.release(1.02);

        assert_eq!(rig.names(), vec!["pick-up", "transport", "put-down"]);
        assert_eq!(rig.interval("put-down"), (1.02, 1.02));
        assert!((rig.interval("transport").1 - 1.02).abs() < EPS);
        assert_eq!(rig.pap.state(), PickAndPlaceState::None);
        assert!(!rig.pap.lift_off_happened());
    }

    #[test]
    fn release_after_touchdown_uses_the_touchdown() {
        let mut rig = Rig::grasp_at(0.0, carry(0.0));
        rig.run(2.3, carry);
        assert_eq!(rig.names(), vec!["pick-up"]);
        rig.release(2.31);

        let (put_down_start, put_down_end) = rig.interval("put-down");
        assert!(put_down_start > 1.925 && put_down_start < 1.975 + EPS);
        assert_eq!(put_down_end, 2.31);
    }

    #[test]
    fn release_always_resets() {
        for until in [0.0, 0.12, 0.3, 1.0, 2.2, 4.0] {
            let mut rig = Rig::grasp_at(0.0, carry(0.0));
            rig.run(until, carry);
            rig.release(until + 0.01);
            assert_eq!(rig.pap.state(), PickAndPlaceState::None);
            assert!(!rig.pap.lift_off_happened());
            assert_eq!(rig.pap.grasped(), None);
            assert!(rig.pap.recent_movement().is_empty());
        }
    }

    #[test]
    fn second_object_is_ignored_while_one_is_held() {
        let mut rig = Rig::grasp_at(0.0, lift(0.0));
        rig.pap
            .on_grasp_begin(EntityId(11), 0.01, Location::default(), &mut rig.q);
        assert_eq!(rig.pap.grasped(), Some(CUP));
        assert_eq!(rig.q.len(), 1);
        assert!(rig.pap.on_grasp_end(EntityId(11), 0.02, &mut rig.q).is_empty());
        assert_eq!(rig.pap.grasped(), Some(CUP));
    }

    #[test]
    fn finish_terminates_and_is_idempotent() {
        let mut rig = Rig::grasp_at(0.0, lift(0.0));
        rig.run(0.3, lift);
        let evs = rig.pap.finish(0.4, true, &mut rig.q);
        assert_eq!(evs.len(), 2, "transport and put-down closed at finish");
        assert!(rig.q.is_empty());
        assert!(rig.pap.finish(0.5, true, &mut rig.q).is_empty());
    }
}
