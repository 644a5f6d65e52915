//! Collaborators the engine reads from: the simulated world and the entity
//! lookup context.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::facts::{EntityId, EntityKind, Location, ShapeId};

/// Read-only view of the simulation.
///
/// Everything the engine needs from physics and the scene graph goes through
/// here, so the engine itself can be driven by any scheduler or replayed from
/// a recording.
pub trait World {
    /// Current simulation time in seconds.
    fn now(&self) -> f64;

    fn location(&self, entity: EntityId) -> Option<Location>;

    /// Entities currently overlapping a sensor shape. Used for the manual
    /// scan at start and on resume, since objects already touching never
    /// produce a begin notification of their own.
    fn overlapping(&self, shape: ShapeId) -> Vec<EntityId>;

    /// Whether `owner` has a skeleton bone named `bone` to attach a shape to.
    fn has_bone(&self, owner: EntityId, bone: &str) -> bool;

    /// Whether `entity` currently rests on a support. `None` when the entity
    /// exposes no such capability.
    fn is_supported(&self, _entity: EntityId) -> Option<bool> {
        None
    }
}

impl<W: World + ?Sized> World for Arc<W> {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn location(&self, entity: EntityId) -> Option<Location> {
        (**self).location(entity)
    }

    fn overlapping(&self, shape: ShapeId) -> Vec<EntityId> {
        (**self).overlapping(shape)
    }

    fn has_bone(&self, owner: EntityId, bone: &str) -> bool {
        (**self).has_bone(owner, bone)
    }

    fn is_supported(&self, entity: EntityId) -> Option<bool> {
        (**self).is_supported(entity)
    }
}

/// What the registry knows about an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub kind: EntityKind,
    pub label: String,
}

/// Explicit lookup context for entity metadata, handed to each monitor at
/// construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistry {
    entries: HashMap<EntityId, EntityInfo>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: EntityId, kind: EntityKind, label: impl Into<String>) {
        self.entries.insert(
            id,
            EntityInfo {
                kind,
                label: label.into(),
            },
        );
    }

    /// Builder-style [`EntityRegistry::register`].
    pub fn with(mut self, id: EntityId, kind: EntityKind, label: impl Into<String>) -> Self {
        self.register(id, kind, label);
        self
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.entries.get(&id).map(|info| info.kind)
    }

    pub fn label(&self, id: EntityId) -> Option<&str> {
        self.entries.get(&id).map(|info| info.label.as_str())
    }

    /// Only static-mesh entities can be contact or grasp partners. Unknown
    /// entities are not.
    pub fn is_contact_partner(&self, id: EntityId) -> bool {
        self.kind(id) == Some(EntityKind::StaticMesh)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
