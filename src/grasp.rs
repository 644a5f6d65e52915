//! Turns clean grasp-channel contacts of a manipulator's shapes into grasp
//! begin/end notifications.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::GraspConfig;
use crate::facts::{EntityId, ShapeId};
use crate::overlap::ContactSignal;
use crate::shape::{Channel, OverlapGroup, ShapeSignal};

#[derive(Debug, Clone, PartialEq)]
pub enum GraspSignal {
    Begin {
        other: EntityId,
        time: f64,
        grasp_type: String,
    },
    End {
        other: EntityId,
        time: f64,
    },
}

/// Shapes currently touching one entity, per group.
#[derive(Debug, Default)]
struct Touch {
    group_a: BTreeSet<ShapeId>,
    group_b: BTreeSet<ShapeId>,
}

impl Touch {
    fn shapes(&mut self, group: OverlapGroup) -> &mut BTreeSet<ShapeId> {
        match group {
            OverlapGroup::A => &mut self.group_a,
            OverlapGroup::B => &mut self.group_b,
        }
    }

    fn is_empty(&self) -> bool {
        self.group_a.is_empty() && self.group_b.is_empty()
    }
}

#[derive(Debug)]
pub struct GraspListener {
    owner: EntityId,
    require_opposing_groups: bool,
    grasp_type: String,
    ignore: BTreeSet<EntityId>,
    touching: BTreeMap<EntityId, Touch>,
    grasped: BTreeSet<EntityId>,
}

impl GraspListener {
    pub fn new(
        owner: EntityId,
        config: &GraspConfig,
        ignore: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        Self {
            owner,
            require_opposing_groups: config.require_opposing_groups,
            grasp_type: config.grasp_type.clone(),
            ignore: ignore.into_iter().collect(),
            touching: BTreeMap::new(),
            grasped: BTreeSet::new(),
        }
    }

    pub fn is_grasped(&self, other: EntityId) -> bool {
        self.grasped.contains(&other)
    }

    pub fn grasped(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.grasped.iter().copied()
    }

    /// Feeds one clean shape notification. Contact-channel signals are not
    /// grasp evidence and are ignored.
    pub fn on_signal(&mut self, signal: &ShapeSignal) -> Option<GraspSignal> {
        if signal.channel != Channel::Grasp {
            return None;
        }
        let other = signal.signal.other();
        if other == self.owner || self.ignore.contains(&other) {
            return None;
        }

        match signal.signal {
            ContactSignal::Begin { time, .. } => {
                let touch = self.touching.entry(other).or_default();
                touch.shapes(signal.group).insert(signal.shape);
                if self.holds(other) && self.grasped.insert(other) {
                    debug!(owner = %self.owner, %other, time, "grasp begins");
                    return Some(GraspSignal::Begin {
                        other,
                        time,
                        grasp_type: self.grasp_type.clone(),
                    });
                }
                None
            }
            ContactSignal::End { time, .. } => {
                let touch = self.touching.get_mut(&other)?;
                touch.shapes(signal.group).remove(&signal.shape);
                if touch.is_empty() {
                    self.touching.remove(&other);
                }
                if !self.holds(other) && self.grasped.remove(&other) {
                    debug!(owner = %self.owner, %other, time, "grasp ends");
                    return Some(GraspSignal::End { other, time });
                }
                None
            }
        }
    }

    /// Ends every grasp still held, e.g. at teardown.
    pub fn finish(&mut self, now: f64) -> Vec<GraspSignal> {
        self.touching.clear();
        std::mem::take(&mut self.grasped)
            .into_iter()
            .map(|other| GraspSignal::End { other, time: now })
            .collect()
    }

    fn holds(&self, other: EntityId) -> bool {
        let Some(touch) = self.touching.get(&other) else {
            return false;
        };
        if self.require_opposing_groups {
            !touch.group_a.is_empty() && !touch.group_b.is_empty()
        } else {
            !touch.is_empty()
        }
    }
}
