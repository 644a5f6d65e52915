//! One manipulator: its sensor shapes, the grasp listener on top of them and
//! the pick-and-place classifier fed by grasps.
//!
//! The monitor owns the [`TimerQueue`] all of its components schedule on and
//! collects everything they report in an outbox, drained by whoever ships
//! events to the episode logger.

use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::InitError;
use crate::facts::{EntityId, ManipulatorEvent, ShapeId};
use crate::grasp::{GraspListener, GraspSignal};
use crate::overlap::ContactSignal;
use crate::pick_and_place::PickAndPlaceListener;
use crate::shape::{Channel, OverlapGroup, OverlapShape, ShapeConfig, ShapeSignal};
use crate::timer::{TimerQueue, TimerTarget};
use crate::world::{EntityRegistry, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Inactive,
    Initialized,
    Started,
    Finished,
    /// Initialization failed; every later call is a no-op.
    Failed,
}

pub struct ManipulatorMonitor<W: World> {
    owner: EntityId,
    world: W,
    registry: EntityRegistry,
    config: MonitorConfig,
    detect_grasps: bool,
    detect_contacts: bool,
    state: MonitorState,

    shapes: Vec<OverlapShape>,
    grasp: GraspListener,
    pick_and_place: PickAndPlaceListener,
    timers: TimerQueue,
    outbox: Vec<ManipulatorEvent>,
}

impl<W: World> std::fmt::Debug for ManipulatorMonitor<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManipulatorMonitor")
            .field("owner", &self.owner)
            .field("state", &self.state)
            .field("shapes", &self.shapes.len())
            .field("pending_timers", &self.timers.len())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

impl<W: World> Drop for ManipulatorMonitor<W> {
    fn drop(&mut self) {
        if matches!(self.state, MonitorState::Initialized | MonitorState::Started) {
            self.finish(true);
            if !self.outbox.is_empty() {
                warn!(
                    owner = %self.owner,
                    undelivered = self.outbox.len(),
                    "monitor dropped with undelivered events"
                );
            }
        }
    }
}

impl<W: World> ManipulatorMonitor<W> {
    pub fn new(owner: EntityId, world: W, registry: EntityRegistry, config: MonitorConfig) -> Self {
        let grasp = GraspListener::new(owner, &config.grasp, []);
        let pick_and_place = PickAndPlaceListener::new(owner, config.pick_and_place.clone());
        Self {
            owner,
            world,
            registry,
            config,
            detect_grasps: true,
            detect_contacts: true,
            state: MonitorState::Inactive,
            shapes: Vec::new(),
            grasp,
            pick_and_place,
            timers: TimerQueue::new(),
            outbox: Vec::new(),
        }
    }

    pub fn with_shape(mut self, shape: ShapeConfig) -> Self {
        self.shapes
            .push(OverlapShape::new(self.owner, shape, &self.config.overlap));
        self
    }

    /// Entities never reported as grasped by this manipulator.
    pub fn ignoring(mut self, entities: impl IntoIterator<Item = EntityId>) -> Self {
        self.grasp = GraspListener::new(self.owner, &self.config.grasp, entities);
        self
    }

    pub fn detecting(mut self, grasps: bool, contacts: bool) -> Self {
        self.detect_grasps = grasps;
        self.detect_contacts = contacts;
        self
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_init(&self) -> bool {
        matches!(self.state, MonitorState::Initialized | MonitorState::Started)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn shape(&self, id: ShapeId) -> Option<&OverlapShape> {
        self.shapes.iter().find(|s| s.id() == id)
    }

    pub fn grasp_listener(&self) -> &GraspListener {
        &self.grasp
    }

    pub fn pick_and_place(&self) -> &PickAndPlaceListener {
        &self.pick_and_place
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// Validates the configuration and initializes every component. On
    /// failure the monitor stays inert for the rest of its life.
    pub fn init(&mut self) -> Result<(), InitError> {
        if self.state != MonitorState::Inactive {
            return Ok(());
        }
        match self.try_init() {
            Ok(()) => {
                self.state = MonitorState::Initialized;
                info!(owner = %self.owner, shapes = self.shapes.len(), "manipulator monitor initialized");
                Ok(())
            }
            Err(e) => {
                error!(owner = %self.owner, error = %e, "manipulator monitor failed to initialize");
                self.state = MonitorState::Failed;
                Err(e)
            }
        }
    }

    fn try_init(&mut self) -> Result<(), InitError> {
        self.config.validate()?;

        if self.detect_grasps {
            let has = |group| self.shapes.iter().any(|s| s.group() == group);
            let sourced = if self.config.grasp.require_opposing_groups {
                has(OverlapGroup::A) && has(OverlapGroup::B)
            } else {
                !self.shapes.is_empty()
            };
            if !sourced {
                return Err(InitError::MissingGraspSource(self.owner));
            }
            self.pick_and_place.init()?;
        }

        for shape in &mut self.shapes {
            shape.init(self.detect_grasps, self.detect_contacts, &self.world)?;
        }
        Ok(())
    }

    /// Starts listening. Objects already touching a shape are announced
    /// right away.
    pub fn start(&mut self) {
        if self.state != MonitorState::Initialized {
            return;
        }
        self.state = MonitorState::Started;
        self.pick_and_place.start();

        let mut signals = Vec::new();
        for shape in &mut self.shapes {
            signals.extend(shape.start(&self.world, &self.registry, &mut self.timers));
        }
        self.route(signals);
        info!(owner = %self.owner, "manipulator monitor started");
    }

    pub fn on_overlap_begin(&mut self, shape: ShapeId, other: EntityId) {
        let now = self.world.now();
        self.on_overlap_begin_at(shape, other, now);
    }

    pub fn on_overlap_end(&mut self, shape: ShapeId, other: EntityId) {
        let now = self.world.now();
        self.on_overlap_end_at(shape, other, now);
    }

    /// Raw broad-phase begin between `shape` and `other` at `time`.
    pub fn on_overlap_begin_at(&mut self, shape: ShapeId, other: EntityId, time: f64) {
        if self.state != MonitorState::Started {
            return;
        }
        let Some(idx) = self.shape_index(shape) else {
            return;
        };
        let signals =
            self.shapes[idx].on_overlap_begin(other, time, &self.registry, &mut self.timers);
        self.route(signals);
    }

    /// Raw broad-phase end between `shape` and `other` at `time`.
    pub fn on_overlap_end_at(&mut self, shape: ShapeId, other: EntityId, time: f64) {
        if self.state != MonitorState::Started {
            return;
        }
        if let Some(idx) = self.shape_index(shape) {
            self.shapes[idx].on_overlap_end(other, time, &self.registry, &mut self.timers);
        }
    }

    /// Pauses or resumes grasp detection on every shape. Contacts keep being
    /// reported while paused.
    pub fn pause_grasp(&mut self, pause: bool) {
        if self.state != MonitorState::Started {
            return;
        }
        let mut signals = Vec::new();
        for shape in &mut self.shapes {
            signals.extend(shape.pause_grasp(pause, &self.world, &self.registry, &mut self.timers));
        }
        self.route(signals);
    }

    /// Fires every timer due at the world's current time.
    pub fn advance(&mut self) {
        if self.state != MonitorState::Started {
            return;
        }
        let now = self.world.now();
        while let Some(due) = self.timers.pop_due(now) {
            match due.target {
                TimerTarget::GraspFlush(id) => self.flush(id, Channel::Grasp, due.fire_at),
                TimerTarget::ContactFlush(id) => self.flush(id, Channel::Contact, due.fire_at),
                TimerTarget::PickAndPlaceUpdate => {
                    let Some(other) = self.pick_and_place.grasped() else {
                        continue;
                    };
                    let location = self.world.location(other);
                    let supported = self.world.is_supported(other);
                    let events = self.pick_and_place.on_update(
                        due.fire_at,
                        location,
                        supported,
                        &mut self.timers,
                    );
                    self.outbox.extend(events);
                }
            }
        }
    }

    /// Stops the monitor: pick-and-place first, then every shape, then any
    /// grasp still held. Idempotent.
    pub fn finish(&mut self, forced: bool) {
        match self.state {
            MonitorState::Finished => return,
            MonitorState::Inactive | MonitorState::Failed => {
                self.state = MonitorState::Finished;
                return;
            }
            MonitorState::Initialized | MonitorState::Started => {}
        }
        let now = self.world.now();

        let events = self.pick_and_place.finish(now, forced, &mut self.timers);
        self.outbox.extend(events);

        let mut signals = Vec::new();
        for shape in &mut self.shapes {
            signals.extend(shape.finish(forced, &mut self.timers));
        }
        self.route(signals);

        for signal in self.grasp.finish(now) {
            if let GraspSignal::End { other, time } = signal {
                self.outbox.push(ManipulatorEvent::GraspEnd {
                    manipulator: self.owner,
                    other,
                    time,
                });
            }
        }

        self.timers.clear();
        self.state = MonitorState::Finished;
        info!(owner = %self.owner, forced, "manipulator monitor finished");
    }

    /// Takes every event reported since the last drain, in order.
    pub fn drain_events(&mut self) -> Vec<ManipulatorEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn shape_index(&self, id: ShapeId) -> Option<usize> {
        let idx = self.shapes.iter().position(|s| s.id() == id);
        if idx.is_none() {
            warn!(owner = %self.owner, shape = %id, "notification for unknown shape");
        }
        idx
    }

    fn flush(&mut self, id: ShapeId, channel: Channel, now: f64) {
        let Some(idx) = self.shape_index(id) else {
            return;
        };
        let signals = self.shapes[idx].on_flush(channel, now, &mut self.timers);
        self.route(signals);
    }

    /// Turns clean shape signals into events: contacts directly, grasp
    /// contacts through the grasp listener and on into pick-and-place.
    fn route(&mut self, signals: Vec<ShapeSignal>) {
        for signal in signals {
            match signal.channel {
                Channel::Contact => {
                    let event = match signal.signal {
                        ContactSignal::Begin { other, time } => ManipulatorEvent::ContactBegin {
                            manipulator: self.owner,
                            other,
                            time,
                        },
                        ContactSignal::End { other, time } => ManipulatorEvent::ContactEnd {
                            manipulator: self.owner,
                            other,
                            time,
                        },
                    };
                    self.outbox.push(event);
                }
                Channel::Grasp => match self.grasp.on_signal(&signal) {
                    Some(GraspSignal::Begin {
                        other,
                        time,
                        grasp_type,
                    }) => {
                        debug!(
                            owner = %self.owner,
                            %other,
                            label = self.registry.label(other).unwrap_or("?"),
                            time,
                            "grasp begin"
                        );
                        self.outbox.push(ManipulatorEvent::GraspBegin {
                            manipulator: self.owner,
                            other,
                            time,
                            grasp_type,
                        });
                        match self.world.location(other) {
                            Some(location) => self.pick_and_place.on_grasp_begin(
                                other,
                                time,
                                location,
                                &mut self.timers,
                            ),
                            None => {
                                warn!(owner = %self.owner, %other, "grasped object has no location")
                            }
                        }
                    }
                    Some(GraspSignal::End { other, time }) => {
                        self.outbox.push(ManipulatorEvent::GraspEnd {
                            manipulator: self.owner,
                            other,
                            time,
                        });
                        let events = self
                            .pick_and_place
                            .on_grasp_end(other, time, &mut self.timers);
                        self.outbox.extend(events);
                    }
                    None => {}
                },
            }
        }
    }
}
