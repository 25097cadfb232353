pub mod class;
pub mod domain;
pub mod gc;
pub mod instance;
pub mod reflection;

use anyhow::{anyhow, Context, Result};
use rhai::Dynamic;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::config::ScriptConfig;
use crate::scene::EntityId;

use class::{PropertyHandle, ScriptClass};
use domain::{type_meta, ScriptDomain};
use gc::{GcManager, ManagedHandle};
use instance::ScriptInstance;
use reflection::{Field, FieldValue};

/// Namespace and short name of the base scripting type; a client class
/// qualifies for discovery iff its immediate parent resolves to this type.
pub const ENTITY_NAMESPACE: &str = "Ember";
pub const ENTITY_CLASS: &str = "Entity";

pub type InstanceMap = HashMap<EntityId, HashMap<String, ScriptInstance>>;

/// Which of the two parallel instance maps is active. Edit-mode instances
/// carry the authored field state; runtime-mode instances are disposable
/// copies that exist only between `on_runtime_begin` and `on_runtime_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Edit,
    Runtime,
}

/// Owner of the embedded scripting runtime: the live domain, the class
/// table, the GC pin table, and both instance maps. One per engine context;
/// all operations run on the thread that owns it.
pub struct ScriptEngine {
    config: ScriptConfig,
    gc: GcManager,
    domain: Option<ScriptDomain>,
    generation: u64,
    entity_class: Option<Rc<ScriptClass>>,
    classes: HashMap<String, Rc<ScriptClass>>,
    edit_instances: InstanceMap,
    runtime_instances: InstanceMap,
    mode: ExecutionMode,
}

impl ScriptEngine {
    /// Bring up the runtime and load both assemblies. Failure here is
    /// domain-fatal: without a working scripting domain there is nothing to
    /// degrade to.
    pub fn new(config: ScriptConfig) -> Result<Self> {
        let mut engine = Self {
            config,
            gc: GcManager::new(),
            domain: None,
            generation: 0,
            entity_class: None,
            classes: HashMap::new(),
            edit_instances: InstanceMap::new(),
            runtime_instances: InstanceMap::new(),
            mode: ExecutionMode::Edit,
        };
        engine.reload_domain().context("initializing script domain")?;
        Ok(engine)
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Tear down instances (both maps), the class table, and finally the
    /// domain, in that order. The engine is unusable afterwards.
    pub fn shutdown(&mut self) {
        for (_, scripts) in self.edit_instances.drain() {
            for (_, mut instance) in scripts {
                instance.destroy(&mut self.gc);
            }
        }
        for (_, scripts) in self.runtime_instances.drain() {
            for (_, mut instance) in scripts {
                instance.destroy(&mut self.gc);
            }
        }
        self.classes.clear();
        self.entity_class = None;
        self.domain = None;
        self.gc.collect_garbage();
    }

    /// The central recovery/update operation: drop the old domain, load
    /// fresh assemblies, rebuild the class table, and reconcile every
    /// previously-tracked (entity, class) binding against it. Bindings whose
    /// class vanished are dropped; everything else keeps compatible field
    /// values. Idempotent when sources are unchanged.
    pub fn reload_domain(&mut self) -> Result<()> {
        // Runtime-mode copies are disposable; edit-mode records stay alive
        // with their snapshots, only their managed pins go.
        for (_, scripts) in self.runtime_instances.drain() {
            for (_, mut instance) in scripts {
                instance.destroy(&mut self.gc);
            }
        }
        for scripts in self.edit_instances.values_mut() {
            for instance in scripts.values_mut() {
                instance.release_handle(&mut self.gc);
            }
        }

        self.domain = None;
        self.classes.clear();
        self.entity_class = None;

        self.generation += 1;
        let mut domain = ScriptDomain::new(self.generation);
        self.load_core_assembly(&mut domain)?;
        self.load_client_assembly(&mut domain)?;

        let Some(base) = self.entity_class.clone() else {
            return Err(anyhow!("core assembly did not define {ENTITY_NAMESPACE}.{ENTITY_CLASS}"));
        };

        let mut retained = InstanceMap::new();
        for (entity, scripts) in self.edit_instances.drain() {
            for (name, mut instance) in scripts {
                let Some(class) = self.classes.get(&name) else {
                    // Class no longer exists; the binding detaches.
                    continue;
                };
                instance.invalidate(class.clone(), entity, &domain, &base, &mut self.gc);
                retained.entry(entity).or_default().insert(name, instance);
            }
        }
        self.edit_instances = retained;
        self.mode = ExecutionMode::Edit;
        self.domain = Some(domain);
        Ok(())
    }

    fn load_core_assembly(&mut self, domain: &mut ScriptDomain) -> Result<()> {
        let assembly = domain.load_assembly(&self.config.core_assembly)?;
        domain.install_core(assembly);
        let base = ScriptClass::load(domain, ENTITY_NAMESPACE, ENTITY_CLASS)
            .context("resolving base scripting type")?;
        self.entity_class = Some(Rc::new(base));
        self.gc.collect_garbage();
        Ok(())
    }

    fn load_client_assembly(&mut self, domain: &mut ScriptDomain) -> Result<()> {
        let assembly = domain.load_assembly(&self.config.client_assembly)?;
        domain.install_client(assembly);
        self.gc.collect_garbage();
        self.load_assembly_classes(domain);
        Ok(())
    }

    /// Walk the client assembly's type table and register every type whose
    /// immediate parent is the designated base scripting type. Types with no
    /// resolvable parent are skipped without error.
    fn load_assembly_classes(&mut self, domain: &ScriptDomain) {
        self.classes.clear();
        let mut short_names: HashMap<String, String> = HashMap::new();
        for (_, value) in domain.client_types() {
            let Some(map) = value.clone().try_cast::<rhai::Map>() else {
                continue;
            };
            let (Some(namespace), Some(name)) =
                (type_meta(&map, "_namespace"), type_meta(&map, "_name"))
            else {
                continue;
            };
            let Some(parent) = type_meta(&map, "_parent") else {
                continue;
            };
            let Some((parent_ns, parent_name)) = domain.resolve_type(&parent) else {
                continue;
            };
            if parent_name != ENTITY_CLASS || parent_ns != ENTITY_NAMESPACE {
                continue;
            }

            let qualified = format!("{namespace}.{name}");
            match ScriptClass::load(domain, &namespace, &name) {
                Ok(class) => {
                    if let Some(other) = short_names.insert(name.clone(), qualified.clone()) {
                        // Method mangling keys on the short name.
                        eprintln!("[script] duplicate short class name '{name}' ({other} vs {qualified})");
                    }
                    println!("[script] discovered {qualified}");
                    self.classes.insert(qualified, Rc::new(class));
                }
                Err(err) => eprintln!("[script] failed to load class {qualified}: {err}"),
            }
        }
    }

    /// Switch to a freshly populated runtime-mode map, copy-constructed from
    /// every edit-mode instance, so play-mode scripting starts from the
    /// edited field state but runs on independent managed objects.
    pub fn on_runtime_begin(&mut self) {
        // Stale runtime copies (a second begin without an end) release their
        // pins before the map is rebuilt.
        for (_, scripts) in self.runtime_instances.drain() {
            for (_, mut instance) in scripts {
                instance.destroy(&mut self.gc);
            }
        }
        let (Some(domain), Some(base)) = (&self.domain, &self.entity_class) else {
            return;
        };
        let mut runtime = InstanceMap::new();
        for (entity, scripts) in &self.edit_instances {
            for (name, instance) in scripts {
                let copy = ScriptInstance::copy_of(instance, *entity, domain, base, &mut self.gc);
                runtime.entry(*entity).or_default().insert(name.clone(), copy);
            }
        }
        self.runtime_instances = runtime;
        self.mode = ExecutionMode::Runtime;
    }

    /// Destroy every runtime-mode instance and fall back to the untouched
    /// edit-mode map.
    pub fn on_runtime_end(&mut self) {
        self.mode = ExecutionMode::Edit;
        for (_, scripts) in self.runtime_instances.drain() {
            for (_, mut instance) in scripts {
                instance.destroy(&mut self.gc);
            }
        }
    }

    pub fn has_class(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    pub fn classes(&self) -> &HashMap<String, Rc<ScriptClass>> {
        &self.classes
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Create an instance of `class_name` bound to `entity` in the active
    /// map. An unknown class is a reflection miss: logged, `None`.
    pub fn create_instance(&mut self, entity: EntityId, class_name: &str) -> Option<&mut ScriptInstance> {
        let Some(class) = self.classes.get(class_name).cloned() else {
            eprintln!("[script] cannot instantiate unknown class '{class_name}'");
            return None;
        };
        let base = self.entity_class.clone()?;
        let domain = self.domain.as_ref()?;
        let instance = ScriptInstance::new(class, entity, domain, &base, &mut self.gc);
        let gc = &mut self.gc;
        let map = match self.mode {
            ExecutionMode::Edit => &mut self.edit_instances,
            ExecutionMode::Runtime => &mut self.runtime_instances,
        };
        let scripts = map.entry(entity).or_default();
        // A displaced instance must give its pin back; every pin has exactly
        // one release point.
        if let Some(mut displaced) = scripts.insert(class_name.to_string(), instance) {
            displaced.destroy(gc);
        }
        scripts.get_mut(class_name)
    }

    pub fn get_instance(&self, entity: EntityId, class_name: &str) -> Option<&ScriptInstance> {
        self.active_map().get(&entity)?.get(class_name)
    }

    pub fn get_instance_mut(&mut self, entity: EntityId, class_name: &str) -> Option<&mut ScriptInstance> {
        self.active_map_mut().get_mut(&entity)?.get_mut(class_name)
    }

    /// Destroy the managed pin, then drop the entry from the active map.
    pub fn remove_instance(&mut self, entity: EntityId, class_name: &str) {
        let gc = &mut self.gc;
        let map = match self.mode {
            ExecutionMode::Edit => &mut self.edit_instances,
            ExecutionMode::Runtime => &mut self.runtime_instances,
        };
        let Some(scripts) = map.get_mut(&entity) else {
            return;
        };
        if let Some(mut instance) = scripts.remove(class_name) {
            instance.destroy(gc);
        }
        if scripts.is_empty() {
            map.remove(&entity);
        }
    }

    /// Live field snapshot for display and editing.
    pub fn fields(&self, entity: EntityId, class_name: &str) -> Option<&BTreeMap<String, Field>> {
        self.get_instance(entity, class_name).map(|instance| instance.fields())
    }

    /// Editor write path: mutate one field, writing through to the live
    /// managed object.
    pub fn set_field(
        &mut self,
        entity: EntityId,
        class_name: &str,
        field_name: &str,
        value: FieldValue,
    ) -> bool {
        let gc = &self.gc;
        let map = match self.mode {
            ExecutionMode::Edit => &mut self.edit_instances,
            ExecutionMode::Runtime => &mut self.runtime_instances,
        };
        map.get_mut(&entity)
            .and_then(|scripts| scripts.get_mut(class_name))
            .and_then(|instance| instance.fields_mut().get_mut(field_name))
            .map(|field| field.write(gc, value))
            .unwrap_or(false)
    }

    /// Field value as currently held by the managed object, falling back to
    /// the native snapshot when the pin is gone.
    pub fn field_value(&self, entity: EntityId, class_name: &str, field_name: &str) -> Option<FieldValue> {
        let field = self.fields(entity, class_name)?.get(field_name)?;
        field.live_value(&self.gc).or_else(|| Some(field.value().clone()))
    }

    /// Cached property accessor lookup keyed by class and property name.
    pub fn get_property(&self, class_name: &str, property: &str) -> Option<Rc<PropertyHandle>> {
        let domain = self.domain.as_ref()?;
        self.classes.get(class_name)?.property(domain, property)
    }

    /// Invoke a property setter against the object behind `handle` with a
    /// positional argument list.
    pub fn set_property(&self, handle: ManagedHandle, property: &PropertyHandle, args: Vec<Dynamic>) {
        let (Some(domain), Some(setter)) = (self.domain.as_ref(), &property.setter) else {
            return;
        };
        domain.invoke(&self.gc, handle, setter, args);
    }

    /// Invoke a property getter against the object behind `handle`.
    pub fn invoke_getter(&self, handle: ManagedHandle, property: &PropertyHandle) -> Option<Dynamic> {
        let getter = property.getter.as_ref()?;
        self.domain.as_ref()?.invoke(&self.gc, handle, getter, Vec::new())
    }

    pub fn invoke_on_create(&self, entity: EntityId, class_name: &str) {
        let Some(domain) = self.domain.as_ref() else { return };
        if let Some(instance) = self.get_instance(entity, class_name) {
            instance.invoke_on_create(domain, &self.gc);
        }
    }

    pub fn invoke_on_update(&self, entity: EntityId, class_name: &str, dt: f32) {
        let Some(domain) = self.domain.as_ref() else { return };
        if let Some(instance) = self.get_instance(entity, class_name) {
            instance.invoke_on_update(domain, &self.gc, dt);
        }
    }

    pub fn invoke_on_destroy(&self, entity: EntityId, class_name: &str) {
        let Some(domain) = self.domain.as_ref() else { return };
        if let Some(instance) = self.get_instance(entity, class_name) {
            instance.invoke_on_destroy(domain, &self.gc);
        }
    }

    /// Route an update tick through every instance in the active map.
    pub fn update(&self, dt: f32) {
        let Some(domain) = self.domain.as_ref() else { return };
        for scripts in self.active_map().values() {
            for instance in scripts.values() {
                instance.invoke_on_update(domain, &self.gc, dt);
            }
        }
    }

    pub fn live_handles(&self) -> usize {
        self.gc.live_handles()
    }

    // The mode selector is dereferenced at call time, never cached across
    // calls, so a mode switch between two calls is observed by the next one.
    fn active_map(&self) -> &InstanceMap {
        match self.mode {
            ExecutionMode::Edit => &self.edit_instances,
            ExecutionMode::Runtime => &self.runtime_instances,
        }
    }

    fn active_map_mut(&mut self) -> &mut InstanceMap {
        match self.mode {
            ExecutionMode::Edit => &mut self.edit_instances,
            ExecutionMode::Runtime => &mut self.runtime_instances,
        }
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
