//! A manipulator sensor shape (one per finger tip or palm) with its two
//! independent debounced channels.
//!
//! Lifecycle: `Inactive -> Initialized -> Started <-> Paused -> Finished`.
//! "Subscribing" to broad-phase notifications is modelled by the state:
//! raw notifications are only routed to a channel while it listens.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace};

use crate::config::OverlapConfig;
use crate::error::InitError;
use crate::facts::{EntityId, ShapeId};
use crate::overlap::{ContactSignal, OverlapDebouncer};
use crate::timer::{Scheduler, TimerTarget};
use crate::world::{EntityRegistry, World};

/// Finger group of a shape. Grasps need both groups to touch the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlapGroup {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeState {
    Inactive,
    Initialized,
    Started,
    /// Started, with the grasp channel paused.
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Grasp,
    Contact,
}

/// Static description of a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeConfig {
    pub id: ShapeId,
    pub group: OverlapGroup,
    /// Bone the shape is attached to. `None` for shapes on non-skeletal
    /// manipulators, which need no attachment.
    #[serde(default)]
    pub bone: Option<String>,
    /// Entities never considered contact partners (e.g. the other fingers of
    /// a non-skeletal hand).
    #[serde(default)]
    pub ignore: Vec<EntityId>,
}

impl ShapeConfig {
    pub fn new(id: ShapeId, group: OverlapGroup) -> Self {
        Self {
            id,
            group,
            bone: None,
            ignore: Vec::new(),
        }
    }

    pub fn on_bone(mut self, bone: impl Into<String>) -> Self {
        self.bone = Some(bone.into());
        self
    }

    pub fn ignoring(mut self, entities: impl IntoIterator<Item = EntityId>) -> Self {
        self.ignore.extend(entities);
        self
    }
}

/// A clean notification from one channel of one shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeSignal {
    pub shape: ShapeId,
    pub group: OverlapGroup,
    pub channel: Channel,
    pub signal: ContactSignal,
}

#[derive(Debug)]
pub struct OverlapShape {
    owner: EntityId,
    config: ShapeConfig,
    state: ShapeState,
    detect_grasps: bool,
    detect_contacts: bool,
    grasp: OverlapDebouncer,
    contact: OverlapDebouncer,
}

impl OverlapShape {
    pub fn new(owner: EntityId, mut config: ShapeConfig, overlap: &OverlapConfig) -> Self {
        config.ignore.sort_unstable();
        config.ignore.dedup();
        Self {
            owner,
            grasp: OverlapDebouncer::new(TimerTarget::GraspFlush(config.id), overlap),
            contact: OverlapDebouncer::new(TimerTarget::ContactFlush(config.id), overlap),
            config,
            state: ShapeState::Inactive,
            detect_grasps: false,
            detect_contacts: false,
        }
    }

    pub fn id(&self) -> ShapeId {
        self.config.id
    }

    pub fn group(&self) -> OverlapGroup {
        self.config.group
    }

    pub fn state(&self) -> ShapeState {
        self.state
    }

    pub fn is_init(&self) -> bool {
        matches!(
            self.state,
            ShapeState::Initialized | ShapeState::Started | ShapeState::Paused
        )
    }

    pub fn detects_grasps(&self) -> bool {
        self.detect_grasps
    }

    pub fn channel(&self, channel: Channel) -> &OverlapDebouncer {
        match channel {
            Channel::Grasp => &self.grasp,
            Channel::Contact => &self.contact,
        }
    }

    /// Validates the attachment and enables the requested channels.
    /// Idempotent: once initialized (or further), returns `Ok` untouched.
    #[instrument(skip(self, world), fields(shape = %self.config.id))]
    pub fn init(
        &mut self,
        detect_grasps: bool,
        detect_contacts: bool,
        world: &dyn World,
    ) -> Result<(), InitError> {
        if self.state != ShapeState::Inactive {
            return Ok(());
        }
        if !detect_grasps && !detect_contacts {
            error!("shape has nothing to detect");
            return Err(InitError::NothingToDetect {
                shape: self.config.id,
            });
        }
        if let Some(bone) = &self.config.bone {
            if !world.has_bone(self.owner, bone) {
                error!(owner = %self.owner, bone = %bone, "could not attach shape to bone");
                return Err(InitError::BoneAttachment {
                    shape: self.config.id,
                    owner: self.owner,
                    bone: bone.clone(),
                });
            }
        }

        self.detect_grasps = detect_grasps;
        self.detect_contacts = detect_contacts;
        self.state = ShapeState::Initialized;
        info!(detect_grasps, detect_contacts, "overlap shape initialized");
        Ok(())
    }

    /// Announces entities already overlapping, then starts listening.
    pub fn start(
        &mut self,
        world: &dyn World,
        registry: &EntityRegistry,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<ShapeSignal> {
        if self.state != ShapeState::Initialized {
            return Vec::new();
        }
        self.state = ShapeState::Started;
        info!(shape = %self.config.id, "overlap shape started");

        let now = world.now();
        let mut out = Vec::new();
        for other in world.overlapping(self.config.id) {
            out.extend(self.on_overlap_begin(other, now, registry, scheduler));
        }
        out
    }

    /// Pauses or resumes the grasp channel. Pausing ends every active grasp
    /// contact right away; resuming re-announces whatever still overlaps.
    pub fn pause_grasp(
        &mut self,
        pause: bool,
        world: &dyn World,
        registry: &EntityRegistry,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<ShapeSignal> {
        if !self.detect_grasps {
            return Vec::new();
        }
        let now = world.now();
        match (pause, self.state) {
            (true, ShapeState::Started) => {
                self.state = ShapeState::Paused;
                debug!(shape = %self.config.id, "grasp channel paused");
                let ended = self.grasp.force_end_active(now);
                self.tag(Channel::Grasp, ended)
            }
            (false, ShapeState::Paused) => {
                self.state = ShapeState::Started;
                debug!(shape = %self.config.id, "grasp channel resumed");
                let mut out = Vec::new();
                for other in world.overlapping(self.config.id) {
                    if self.accepts(other, registry) {
                        let signals = self.grasp.on_raw_begin(other, now, scheduler);
                        out.extend(self.tag(Channel::Grasp, signals));
                    }
                }
                out
            }
            _ => Vec::new(),
        }
    }

    /// Confirms all pending ends immediately and stops listening.
    /// Idempotent; safe to call from several teardown paths.
    pub fn finish(&mut self, forced: bool, scheduler: &mut dyn Scheduler) -> Vec<ShapeSignal> {
        if matches!(self.state, ShapeState::Finished | ShapeState::Inactive) {
            return Vec::new();
        }
        let grasp_ends = self.grasp.flush_all(scheduler);
        let contact_ends = self.contact.flush_all(scheduler);
        let mut out = self.tag(Channel::Grasp, grasp_ends);
        out.extend(self.tag(Channel::Contact, contact_ends));

        self.state = ShapeState::Finished;
        info!(shape = %self.config.id, forced, "overlap shape finished");
        out
    }

    pub fn on_overlap_begin(
        &mut self,
        other: EntityId,
        time: f64,
        registry: &EntityRegistry,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<ShapeSignal> {
        if !self.accepts(other, registry) {
            return Vec::new();
        }
        let mut out = Vec::new();
        if self.grasp_listening() {
            let signals = self.grasp.on_raw_begin(other, time, scheduler);
            out.extend(self.tag(Channel::Grasp, signals));
        }
        if self.contact_listening() {
            let signals = self.contact.on_raw_begin(other, time, scheduler);
            out.extend(self.tag(Channel::Contact, signals));
        }
        out
    }

    pub fn on_overlap_end(
        &mut self,
        other: EntityId,
        time: f64,
        registry: &EntityRegistry,
        scheduler: &mut dyn Scheduler,
    ) {
        if !self.accepts(other, registry) {
            return;
        }
        if self.grasp_listening() {
            self.grasp.on_raw_end(other, time, scheduler);
        }
        if self.contact_listening() {
            self.contact.on_raw_end(other, time, scheduler);
        }
    }

    /// Flush timer callback for one channel.
    pub fn on_flush(
        &mut self,
        channel: Channel,
        now: f64,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<ShapeSignal> {
        let signals = match channel {
            Channel::Grasp => self.grasp.on_flush(now, scheduler),
            Channel::Contact => self.contact.on_flush(now, scheduler),
        };
        self.tag(channel, signals)
    }

    fn grasp_listening(&self) -> bool {
        self.detect_grasps && self.state == ShapeState::Started
    }

    fn contact_listening(&self) -> bool {
        self.detect_contacts && matches!(self.state, ShapeState::Started | ShapeState::Paused)
    }

    /// Self, ignore-list and entity-type filter.
    fn accepts(&self, other: EntityId, registry: &EntityRegistry) -> bool {
        if other == self.owner {
            return false;
        }
        if self.config.ignore.binary_search(&other).is_ok() {
            trace!(shape = %self.config.id, %other, "ignored entity");
            return false;
        }
        registry.is_contact_partner(other)
    }

    fn tag(&self, channel: Channel, signals: Vec<ContactSignal>) -> Vec<ShapeSignal> {
        signals
            .into_iter()
            .map(|signal| ShapeSignal {
                shape: self.config.id,
                group: self.config.group,
                channel,
                signal,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::EntityKind;
    use crate::timer::TimerQueue;
    use crate::world::testing::ScriptedWorld;

    const HAND: EntityId = EntityId(1);
    const OTHER_FINGER: EntityId = EntityId(2);
    const CUP: EntityId = EntityId(10);
    const TABLE_HAND: EntityId = EntityId(11);

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .with(HAND, EntityKind::Skeletal, "hand")
            .with(OTHER_FINGER, EntityKind::StaticMesh, "finger")
            .with(CUP, EntityKind::StaticMesh, "cup")
            .with(TABLE_HAND, EntityKind::Other, "robot")
    }

    fn started_shape(world: &ScriptedWorld, q: &mut TimerQueue) -> (OverlapShape, Vec<ShapeSignal>) {
        let config = ShapeConfig::new(ShapeId(0), OverlapGroup::A)
            .on_bone("index_03")
            .ignoring([OTHER_FINGER]);
        let mut shape = OverlapShape::new(HAND, config, &OverlapConfig::default());
        world.add_bone(HAND, "index_03");
        shape.init(true, true, world).expect("init");
        let initial = shape.start(world, &registry(), q);
        (shape, initial)
    }

    #[test]
    fn missing_bone_leaves_shape_inert() {
        let world = ScriptedWorld::new();
        let mut q = TimerQueue::new();
        let config = ShapeConfig::new(ShapeId(3), OverlapGroup::B).on_bone("thumb_03");
        let mut shape = OverlapShape::new(HAND, config, &OverlapConfig::default());

        let err = shape.init(true, false, &world).unwrap_err();
        assert!(matches!(err, InitError::BoneAttachment { .. }));
        assert_eq!(shape.state(), ShapeState::Inactive);
        assert!(!shape.is_init());

        assert!(shape.start(&world, &registry(), &mut q).is_empty());
        assert!(shape
            .on_overlap_begin(CUP, 0.0, &registry(), &mut q)
            .is_empty());
        assert!(shape.finish(false, &mut q).is_empty());
    }

    #[test]
    fn start_announces_existing_overlaps_on_both_channels() {
        let world = ScriptedWorld::new();
        world.set_overlapping(ShapeId(0), vec![CUP, HAND, OTHER_FINGER, TABLE_HAND]);
        let mut q = TimerQueue::new();

        let (shape, initial) = started_shape(&world, &mut q);
        assert_eq!(shape.state(), ShapeState::Started);
        let channels: Vec<(Channel, EntityId)> = initial
            .iter()
            .map(|s| (s.channel, s.signal.other()))
            .collect();
        assert_eq!(channels, vec![(Channel::Grasp, CUP), (Channel::Contact, CUP)]);
    }

    #[test]
    fn pause_ends_grasps_but_keeps_contacts() {
        let world = ScriptedWorld::new();
        let mut q = TimerQueue::new();
        let (mut shape, _) = started_shape(&world, &mut q);
        let reg = registry();

        shape.on_overlap_begin(CUP, 0.1, &reg, &mut q);
        world.set_now(0.5);
        world.set_overlapping(ShapeId(0), vec![CUP]);
        let paused = shape.pause_grasp(true, &world, &reg, &mut q);
        assert_eq!(
            paused,
            vec![ShapeSignal {
                shape: ShapeId(0),
                group: OverlapGroup::A,
                channel: Channel::Grasp,
                signal: ContactSignal::End { other: CUP, time: 0.5 },
            }]
        );
        assert_eq!(shape.state(), ShapeState::Paused);
        assert!(shape.channel(Channel::Contact).is_active(CUP));

        // Paused grasp channel does not hear raw notifications.
        shape.on_overlap_end(CUP, 0.6, &reg, &mut q);
        assert!(!shape.channel(Channel::Grasp).is_pending_end(CUP));
        assert!(shape.channel(Channel::Contact).is_pending_end(CUP));

        world.set_now(0.7);
        let resumed = shape.pause_grasp(false, &world, &reg, &mut q);
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].channel, Channel::Grasp);
        assert_eq!(resumed[0].signal, ContactSignal::Begin { other: CUP, time: 0.7 });
    }

    #[test]
    fn finish_flushes_pending_ends_once() {
        let world = ScriptedWorld::new();
        let mut q = TimerQueue::new();
        let (mut shape, _) = started_shape(&world, &mut q);
        let reg = registry();

        shape.on_overlap_begin(CUP, 0.0, &reg, &mut q);
        shape.on_overlap_end(CUP, 1.0, &reg, &mut q);
        assert_eq!(q.len(), 2, "one flush timer per channel");

        let flushed = shape.finish(true, &mut q);
        assert_eq!(flushed.len(), 2);
        assert!(flushed
            .iter()
            .all(|s| s.signal == ContactSignal::End { other: CUP, time: 1.0 }));
        assert!(q.is_empty());
        assert_eq!(shape.state(), ShapeState::Finished);
        assert!(shape.finish(true, &mut q).is_empty());
        assert!(shape.on_overlap_begin(CUP, 2.0, &reg, &mut q).is_empty());
    }
}
