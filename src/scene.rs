use bevy_ecs::prelude::*;
use rand::Rng;
use std::fmt;

use crate::scripting::ScriptEngine;

/// Stable 64-bit identifier scripting keys its per-entity maps by. Survives
/// scene reloads and serialization, unlike the entity-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub fn generate() -> Self {
        Self(rand::thread_rng().gen())
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Component, Clone, Copy)]
pub struct SceneId(pub EntityId);

/// Marks an entity as carrying one named script class.
#[derive(Component, Clone)]
pub struct ScriptBehaviour {
    pub class_name: String,
}

impl ScriptBehaviour {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self { class_name: class_name.into() }
    }
}

/// Thin entity-component scene collaborator. The scripting engine only
/// requires stable entity identity and a component query from it; this
/// wrapper also drives the lifecycle calls the way a play-mode loop would.
pub struct Scene {
    pub world: World,
}

impl Scene {
    pub fn new() -> Self {
        Self { world: World::new() }
    }

    pub fn spawn_scripted(&mut self, class_name: impl Into<String>) -> (Entity, EntityId) {
        let id = EntityId::generate();
        let entity = self.world.spawn((SceneId(id), ScriptBehaviour::new(class_name))).id();
        (entity, id)
    }

    pub fn despawn(&mut self, entity: Entity, scripts: &mut ScriptEngine) {
        if let Some((id, class_name)) = self.script_binding(entity) {
            scripts.invoke_on_destroy(id, &class_name);
            scripts.remove_instance(id, &class_name);
        }
        self.world.despawn(entity);
    }

    /// Ensure every scripted entity has a live instance in the engine's
    /// active map. Unknown class names are reported by the engine and the
    /// binding stays inert until a reload provides the class.
    pub fn bind_scripts(&mut self, scripts: &mut ScriptEngine) {
        for (id, class_name) in self.scripted_entities() {
            if scripts.get_instance(id, &class_name).is_none() {
                scripts.create_instance(id, &class_name);
            }
        }
    }

    /// Enter play mode: switch the engine to its runtime map and fire the
    /// creation callbacks on the fresh copies.
    pub fn on_runtime_start(&mut self, scripts: &mut ScriptEngine) {
        scripts.on_runtime_begin();
        for (id, class_name) in self.scripted_entities() {
            scripts.invoke_on_create(id, &class_name);
        }
    }

    pub fn update(&mut self, scripts: &ScriptEngine, dt: f32) {
        for (id, class_name) in self.scripted_entities() {
            scripts.invoke_on_update(id, &class_name, dt);
        }
    }

    pub fn on_runtime_stop(&mut self, scripts: &mut ScriptEngine) {
        for (id, class_name) in self.scripted_entities() {
            scripts.invoke_on_destroy(id, &class_name);
        }
        scripts.on_runtime_end();
    }

    fn script_binding(&self, entity: Entity) -> Option<(EntityId, String)> {
        let id = self.world.get::<SceneId>(entity)?.0;
        let class_name = self.world.get::<ScriptBehaviour>(entity)?.class_name.clone();
        Some((id, class_name))
    }

    fn scripted_entities(&mut self) -> Vec<(EntityId, String)> {
        let mut query = self.world.query::<(&SceneId, &ScriptBehaviour)>();
        query
            .iter(&self.world)
            .map(|(id, behaviour)| (id.0, behaviour.class_name.clone()))
            .collect()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
