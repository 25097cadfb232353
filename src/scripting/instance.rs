use rhai::Dynamic;
use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;

use crate::scene::EntityId;

use super::class::{MethodHandle, ScriptClass};
use super::domain::ScriptDomain;
use super::gc::{GcManager, ManagedHandle};
use super::reflection::{Field, FieldMeta};

/// One scripted behaviour bound to one entity: a pinned managed object, the
/// native field snapshot mirrored off it, and the cached lifecycle handles.
///
/// States: constructing -> live -> destroyed. Between a reload's handle
/// release and the matching `invalidate` the instance is handle-less but
/// keeps its field snapshot, which is exactly what reconciliation feeds on.
pub struct ScriptInstance {
    class: Rc<ScriptClass>,
    handle: Option<ManagedHandle>,
    fields: BTreeMap<String, Field>,
    on_create: Option<MethodHandle>,
    on_update: Option<MethodHandle>,
    on_destroy: Option<MethodHandle>,
    destroyed: bool,
}

impl ScriptInstance {
    /// Construct a fresh instance: allocate the managed object, run the base
    /// entity binding with the entity id, and snapshot the class defaults.
    pub fn new(
        class: Rc<ScriptClass>,
        entity: EntityId,
        domain: &ScriptDomain,
        base: &ScriptClass,
        gc: &mut GcManager,
    ) -> Self {
        let mut instance = Self {
            class,
            handle: None,
            fields: BTreeMap::new(),
            on_create: None,
            on_update: None,
            on_destroy: None,
            destroyed: false,
        };
        instance.construct(entity, domain, base, gc, None);
        instance
    }

    /// Construct from a live source instance: clone its managed object
    /// so the copy starts from the source's current field state but mutates
    /// independently. Used when entering runtime mode.
    pub fn copy_of(
        source: &ScriptInstance,
        entity: EntityId,
        domain: &ScriptDomain,
        base: &ScriptClass,
        gc: &mut GcManager,
    ) -> Self {
        let mut instance = Self {
            class: source.class.clone(),
            handle: None,
            fields: BTreeMap::new(),
            on_create: None,
            on_update: None,
            on_destroy: None,
            destroyed: false,
        };

        let clone = source
            .handle
            .and_then(|handle| gc.resolve(handle))
            .and_then(|object| object.clone_object());
        match clone {
            Some(object) => {
                let handle = gc.create(object, false);
                instance.handle = Some(handle);
                instance.bind_entity(entity, domain, base, gc);
                instance.cache_lifecycle(domain);
                instance.fields = reconcile_fields(
                    instance.class.fields(),
                    Some(&source.fields),
                    handle,
                    gc,
                );
            }
            // Source object already gone; fall back to plain construction.
            None => instance.construct(entity, domain, base, gc, Some(&source.fields)),
        }
        instance
    }

    /// Re-run full construction against a post-reload descriptor. A field
    /// survives with its previous value only when both name and type tag
    /// are unchanged; everything else resets to the new class default. The
    /// instance stays live.
    pub fn invalidate(
        &mut self,
        class: Rc<ScriptClass>,
        entity: EntityId,
        domain: &ScriptDomain,
        base: &ScriptClass,
        gc: &mut GcManager,
    ) {
        self.release_handle(gc);
        self.class = class;
        let previous = mem::take(&mut self.fields);
        self.construct(entity, domain, base, gc, Some(&previous));
    }

    fn construct(
        &mut self,
        entity: EntityId,
        domain: &ScriptDomain,
        base: &ScriptClass,
        gc: &mut GcManager,
        previous: Option<&BTreeMap<String, Field>>,
    ) {
        let handle = self.class.instantiate(domain, gc, false);
        self.handle = Some(handle);
        self.bind_entity(entity, domain, base, gc);
        self.cache_lifecycle(domain);
        self.fields = reconcile_fields(self.class.fields(), previous, handle, gc);
    }

    fn bind_entity(&self, entity: EntityId, domain: &ScriptDomain, base: &ScriptClass, gc: &GcManager) {
        let (Some(handle), Some(ctor)) = (self.handle, base.method(domain, "init", 2)) else {
            return;
        };
        domain.invoke(gc, handle, &ctor, vec![Dynamic::from(entity.to_bits() as rhai::INT)]);
    }

    fn cache_lifecycle(&mut self, domain: &ScriptDomain) {
        self.on_create = self.class.method(domain, "on_create", 1);
        self.on_update = self.class.method(domain, "on_update", 2);
        self.on_destroy = self.class.method(domain, "on_destroy", 1);
    }

    pub fn class(&self) -> &Rc<ScriptClass> {
        &self.class
    }

    pub fn handle(&self) -> Option<ManagedHandle> {
        self.handle
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some() && !self.destroyed
    }

    pub fn fields(&self) -> &BTreeMap<String, Field> {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut BTreeMap<String, Field> {
        &mut self.fields
    }

    pub fn invoke_on_create(&self, domain: &ScriptDomain, gc: &GcManager) {
        if let (Some(handle), Some(method)) = (self.handle, &self.on_create) {
            domain.invoke(gc, handle, method, Vec::new());
        }
    }

    pub fn invoke_on_update(&self, domain: &ScriptDomain, gc: &GcManager, dt: f32) {
        if let (Some(handle), Some(method)) = (self.handle, &self.on_update) {
            domain.invoke(gc, handle, method, vec![Dynamic::from(dt as rhai::FLOAT)]);
        }
    }

    pub fn invoke_on_destroy(&self, domain: &ScriptDomain, gc: &GcManager) {
        if let (Some(handle), Some(method)) = (self.handle, &self.on_destroy) {
            domain.invoke(gc, handle, method, Vec::new());
        }
    }

    /// Drop the managed pin but keep the native record and field snapshot.
    /// Reload calls this before tearing the domain down.
    pub fn release_handle(&mut self, gc: &mut GcManager) {
        if let Some(handle) = self.handle.take() {
            gc.release(handle);
        }
    }

    /// Terminal transition; the instance is not reused afterwards.
    pub fn destroy(&mut self, gc: &mut GcManager) {
        self.release_handle(gc);
        self.destroyed = true;
    }
}

/// Rebuild a field snapshot against a class's current field list. Surviving
/// values (same name, same type tag) move into the new fields and are
/// written through into the fresh managed object; the rest snapshot the
/// class defaults already present on it.
fn reconcile_fields(
    metas: &[FieldMeta],
    previous: Option<&BTreeMap<String, Field>>,
    owner: ManagedHandle,
    gc: &GcManager,
) -> BTreeMap<String, Field> {
    let mut next = BTreeMap::new();
    for meta in metas {
        let mut field = Field::new(meta, owner);
        let carried = previous
            .and_then(|fields| fields.get(&meta.name))
            .filter(|prev| prev.ty() == meta.ty)
            .map(|prev| prev.value().clone());
        match carried {
            Some(value) => {
                field.write(gc, value);
            }
            None => {
                field.read_live(gc);
            }
        }
        next.insert(meta.name.clone(), field);
    }
    next
}
