//! Entity collaborator interface
//!
//! The collision core does not own entities. It requires two things from
//! whatever does: a way to nudge an entity's world position (for impulse
//! resolution) and a slot storing the entity's collider back-reference (so
//! swap-removal can repair the relocated element's owner). [`EntityStore`]
//! captures exactly that surface; [`EntityWorld`] is a minimal arena-backed
//! implementation for hosts that have no entity system of their own.

use slotmap::{new_key_type, SlotMap};

use crate::colliders::ColliderHandle;
use crate::foundation::math::Vec3;

new_key_type! {
    /// Handle into the entity arena
    pub struct EntityKey;
}

/// The surface the collision engine requires from an entity system
pub trait EntityStore {
    /// Move an entity's world position by `delta`
    fn translate(&mut self, entity: EntityKey, delta: Vec3);
    /// Store the entity's collider back-reference
    fn set_collider(&mut self, entity: EntityKey, collider: Option<ColliderHandle>);
}

/// Entity record stored in [`EntityWorld`]
#[derive(Debug, Clone, Copy)]
pub struct EntityData {
    /// World position
    pub position: Vec3,
    /// Back-reference to the entity's collider, if any
    pub collider: Option<ColliderHandle>,
}

/// Minimal arena of entities implementing [`EntityStore`]
#[derive(Debug, Default)]
pub struct EntityWorld {
    entities: SlotMap<EntityKey, EntityData>,
}

impl EntityWorld {
    /// Create an empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an entity at the given position
    pub fn spawn(&mut self, position: Vec3) -> EntityKey {
        self.entities.insert(EntityData {
            position,
            collider: None,
        })
    }

    /// Despawn an entity
    pub fn despawn(&mut self, entity: EntityKey) {
        self.entities.remove(entity);
    }

    /// Get an entity's record
    pub fn get(&self, entity: EntityKey) -> Option<&EntityData> {
        self.entities.get(entity)
    }

    /// Get an entity's world position
    pub fn position(&self, entity: EntityKey) -> Option<Vec3> {
        self.entities.get(entity).map(|e| e.position)
    }

    /// Get an entity's collider back-reference
    pub fn collider(&self, entity: EntityKey) -> Option<ColliderHandle> {
        self.entities.get(entity).and_then(|e| e.collider)
    }
}

impl EntityStore for EntityWorld {
    fn translate(&mut self, entity: EntityKey, delta: Vec3) {
        if let Some(e) = self.entities.get_mut(entity) {
            e.position += delta;
        }
    }

    fn set_collider(&mut self, entity: EntityKey, collider: Option<ColliderHandle>) {
        if let Some(e) = self.entities.get_mut(entity) {
            e.collider = collider;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_moves_position() {
        let mut world = EntityWorld::new();
        let e = world.spawn(Vec3::new(1.0, 2.0, 3.0));
        world.translate(e, Vec3::new(0.5, 0.0, -1.0));
        assert_eq!(world.position(e), Some(Vec3::new(1.5, 2.0, 2.0)));
    }

    #[test]
    fn translate_ignores_dead_entities() {
        let mut world = EntityWorld::new();
        let e = world.spawn(Vec3::zeros());
        world.despawn(e);
        world.translate(e, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(world.position(e), None);
    }
}
