//! Tunable thresholds. Defaults are the empirically tuned values the
//! classifier was developed against (distances in world units, times in
//! seconds).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Debounce settings shared by every overlap channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    /// Longest gap between an end and a renewed begin that still counts as
    /// one continuous contact.
    pub max_overlap_event_time_gap: f64,
    /// The shared flush timer fires this many gaps after the first pending end.
    pub flush_delay_factor: f64,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            max_overlap_event_time_gap: 0.12,
            flush_delay_factor: 1.1,
        }
    }
}

impl OverlapConfig {
    pub fn flush_delay(&self) -> f64 {
        self.max_overlap_event_time_gap * self.flush_delay_factor
    }
}

/// How clean grasp-channel contacts are combined into grasps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraspConfig {
    /// Require contact from both finger groups (A and B) before an object
    /// counts as grasped.
    pub require_opposing_groups: bool,
    /// Label attached to every grasp-begin notification.
    pub grasp_type: String,
}

impl Default for GraspConfig {
    fn default() -> Self {
        Self {
            require_opposing_groups: true,
            grasp_type: "Default".to_string(),
        }
    }
}

/// Thresholds of the pick-and-place classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickAndPlaceConfig {
    pub update_rate: f64,

    pub min_slide_dist_xy: f32,
    pub min_slide_duration: f64,
    /// Per-tick horizontal movement below which an ongoing slide is over.
    pub slide_stop_dist_xy: f32,

    pub max_pick_up_dist_xy: f32,
    pub min_pick_up_height: f32,
    pub max_pick_up_height: f32,

    pub recent_movement_buffer_size: usize,
    pub recent_movement_buffer_duration: f64,
    pub put_down_movement_backtrack_duration: f64,
    pub min_put_down_height: f32,
    pub max_put_down_height: f32,
    pub max_put_down_dist_xy: f32,
}

impl Default for PickAndPlaceConfig {
    fn default() -> Self {
        Self {
            update_rate: 0.05,
            min_slide_dist_xy: 9.0,
            min_slide_duration: 0.9,
            slide_stop_dist_xy: 0.1,
            max_pick_up_dist_xy: 9.0,
            min_pick_up_height: 3.0,
            max_pick_up_height: 12.0,
            recent_movement_buffer_size: 256,
            recent_movement_buffer_duration: 3.3,
            put_down_movement_backtrack_duration: 1.5,
            min_put_down_height: 2.0,
            max_put_down_height: 8.0,
            max_put_down_dist_xy: 9.0,
        }
    }
}

/// Complete configuration of one manipulator monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub overlap: OverlapConfig,
    pub grasp: GraspConfig,
    pub pick_and_place: PickAndPlaceConfig,
}

impl MonitorConfig {
    /// Parses a JSON document; omitted fields keep their defaults. The result
    /// is validated before it is returned.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.overlap;
        let p = &self.pick_and_place;

        positive("max_overlap_event_time_gap", o.max_overlap_event_time_gap)?;
        positive("flush_delay_factor", o.flush_delay_factor)?;
        if o.flush_delay_factor < 1.0 {
            return Err(ConfigError::FlushBeforeGap(o.flush_delay_factor));
        }

        positive("update_rate", p.update_rate)?;
        positive("min_slide_duration", p.min_slide_duration)?;
        positive("recent_movement_buffer_duration", p.recent_movement_buffer_duration)?;
        positive(
            "put_down_movement_backtrack_duration",
            p.put_down_movement_backtrack_duration,
        )?;
        positive("min_pick_up_height", f64::from(p.min_pick_up_height))?;

        ordered(
            ("min_pick_up_height", p.min_pick_up_height.into()),
            ("max_pick_up_height", p.max_pick_up_height.into()),
        )?;
        ordered(
            ("min_put_down_height", p.min_put_down_height.into()),
            ("max_put_down_height", p.max_put_down_height.into()),
        )?;
        ordered(
            (
                "put_down_movement_backtrack_duration",
                p.put_down_movement_backtrack_duration,
            ),
            (
                "recent_movement_buffer_duration",
                p.recent_movement_buffer_duration,
            ),
        )?;

        if p.recent_movement_buffer_size == 0 {
            return Err(ConfigError::EmptyMotionBuffer);
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn ordered(min: (&'static str, f64), max: (&'static str, f64)) -> Result<(), ConfigError> {
    if min.1 <= max.1 {
        Ok(())
    } else {
        Err(ConfigError::InvertedBounds {
            min_name: min.0,
            min: min.1,
            max_name: max.0,
            max: max.1,
        })
    }
}
