use thiserror::Error;

use crate::facts::{EntityId, ShapeId};

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to parse monitor config: {0}")]
    Parse(String),
    #[error("`{name}` must be positive (got {value})")]
    NotPositive { name: &'static str, value: f64 },
    #[error("`{min_name}` ({min}) must not exceed `{max_name}` ({max})")]
    InvertedBounds {
        min_name: &'static str,
        min: f64,
        max_name: &'static str,
        max: f64,
    },
    #[error("flush delay factor {0} would flush before the debounce gap elapses")]
    FlushBeforeGap(f64),
    #[error("motion buffer capacity must be non-zero")]
    EmptyMotionBuffer,
}

/// Reasons a component refuses to initialize. A component that failed to
/// initialize stays inert: every later call on it is a no-op.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InitError {
    #[error("{shape} could not be attached to bone `{bone}` of {owner}")]
    BoneAttachment {
        shape: ShapeId,
        owner: EntityId,
        bone: String,
    },
    #[error("{shape} has neither grasp nor contact detection enabled")]
    NothingToDetect { shape: ShapeId },
    #[error("manipulator {0} has no grasp source (no shape detects grasps)")]
    MissingGraspSource(EntityId),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why an episode driver stopped early.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    #[error("monitor failed to initialize: {0}")]
    Init(#[from] InitError),
    #[error("episode logger is closed")]
    LoggerClosed,
}
