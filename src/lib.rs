//! Manipulator interaction events for simulated hands.
//!
//! This crate turns the raw, jittery overlap notifications of a physics
//! engine into a clean semantic stream for an episode logger:
//! - [`OverlapDebouncer`]: hides begin/end jitter behind one contact per entity.
//! - [`OverlapShape`]: a finger or palm sensor with independent grasp and contact channels.
//! - [`GraspListener`]: combines the grasp channels of all shapes into grasp begin/end.
//! - [`PickAndPlaceListener`]: classifies a grasped object's motion into slide,
//!   pick-up, transport and put-down intervals.
//! - [`ManipulatorMonitor`]: owns all of the above for one manipulator.
//! - [`EpisodeDriver`]: runs a monitor as a tokio task feeding an [`EpisodeLogger`].
//!
//! Time is simulation time in seconds throughout. Components never read a
//! clock themselves: they get `now` from the [`World`] or from the
//! [`TimerQueue`] that fires their callbacks.

pub mod config;
pub mod driver;
pub mod error;
pub mod facts;
pub mod grasp;
pub mod monitor;
pub mod motion;
pub mod overlap;
pub mod pick_and_place;
pub mod shape;
pub mod timer;
pub mod world;

pub use config::{GraspConfig, MonitorConfig, OverlapConfig, PickAndPlaceConfig};
pub use driver::{EpisodeDriver, EpisodeLogger, PhysicsSignal};
pub use error::{ConfigError, DriverError, InitError};
pub use facts::{EntityId, EntityKind, Location, ManipulatorEvent, ShapeId, SubEvent};
pub use grasp::{GraspListener, GraspSignal};
pub use monitor::{ManipulatorMonitor, MonitorState};
pub use motion::{MotionBuffer, MotionSample};
pub use overlap::{ContactSignal, OverlapDebouncer};
pub use pick_and_place::{PickAndPlaceListener, PickAndPlaceState};
pub use shape::{Channel, OverlapGroup, OverlapShape, ShapeConfig, ShapeSignal, ShapeState};
pub use timer::{Scheduler, TimerHandle, TimerQueue, TimerTarget};
pub use world::{EntityInfo, EntityRegistry, World};
