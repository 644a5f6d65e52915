//! Data primitives exchanged between the overlap channels, the pick-and-place
//! classifier and the external episode logger.
//!
//! These are plain values: nothing here holds a reference back into the
//! simulation, so events can be queued, sent across tasks and serialized by
//! whoever consumes them.

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Opaque identity of an actor in the simulated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one sensor shape within a manipulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(pub u32);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape-{}", self.0)
    }
}

/// Coarse actor category used to decide which actors can be contact partners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Manipulator,
    StaticMesh,
    Skeletal,
    Other,
}

/// A world-space location.
///
/// Internally uses [`nalgebra::Vector3<f32>`]; the classifier only ever needs
/// the horizontal (XY) distance and the vertical (Z) offset between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location(pub Vector3<f32>);

impl Location {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self(Vector3::new(x, y, z))
    }

    pub fn x(&self) -> f32 {
        self.0.x
    }

    pub fn y(&self) -> f32 {
        self.0.y
    }

    pub fn z(&self) -> f32 {
        self.0.z
    }

    /// Distance between the projections of both points on the XY plane.
    pub fn dist_xy(&self, other: &Location) -> f32 {
        (self.0.xy() - other.0.xy()).norm()
    }

    /// Signed height of `self` above `reference`.
    pub fn height_above(&self, reference: &Location) -> f32 {
        self.0.z - reference.0.z
    }
}

impl Default for Location {
    fn default() -> Self {
        Self(Vector3::zeros())
    }
}

/// A pick-and-place sub-event with the interval during which it physically
/// happened (not when it was confirmed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubEvent {
    pub manipulator: EntityId,
    pub other: EntityId,
    pub start: f64,
    pub end: f64,
}

/// Everything the engine reports to the episode logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ManipulatorEvent {
    ContactBegin {
        manipulator: EntityId,
        other: EntityId,
        time: f64,
    },
    ContactEnd {
        manipulator: EntityId,
        other: EntityId,
        time: f64,
    },
    GraspBegin {
        manipulator: EntityId,
        other: EntityId,
        time: f64,
        grasp_type: String,
    },
    GraspEnd {
        manipulator: EntityId,
        other: EntityId,
        time: f64,
    },
    Slide(SubEvent),
    PickUp(SubEvent),
    Transport(SubEvent),
    PutDown(SubEvent),
}

impl ManipulatorEvent {
    /// Short lowercase name, handy for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContactBegin { .. } => "contact-begin",
            Self::ContactEnd { .. } => "contact-end",
            Self::GraspBegin { .. } => "grasp-begin",
            Self::GraspEnd { .. } => "grasp-end",
            Self::Slide(_) => "slide",
            Self::PickUp(_) => "pick-up",
            Self::Transport(_) => "transport",
            Self::PutDown(_) => "put-down",
        }
    }

    /// The entity the manipulator interacted with.
    pub fn other(&self) -> EntityId {
        match self {
            Self::ContactBegin { other, .. }
            | Self::ContactEnd { other, .. }
            | Self::GraspBegin { other, .. }
            | Self::GraspEnd { other, .. } => *other,
            Self::Slide(ev) | Self::PickUp(ev) | Self::Transport(ev) | Self::PutDown(ev) => ev.other,
        }
    }

    /// The `[start, end]` interval for pick-and-place sub-events, `None` for
    /// point events.
    pub fn interval(&self) -> Option<(f64, f64)> {
        match self {
            Self::Slide(ev) | Self::PickUp(ev) | Self::Transport(ev) | Self::PutDown(ev) => {
                Some((ev.start, ev.end))
            }
            _ => None,
        }
    }
}
