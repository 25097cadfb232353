use anyhow::{anyhow, Result};
use rhai::Map;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::domain::ScriptDomain;
use super::gc::{GcManager, ManagedHandle, ScriptObject};
use super::reflection::{extract_fields, FieldMeta};

/// Resolved, signature-matched script method: the mangled free-function name
/// plus its parameter count (object parameter included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandle {
    pub fn_name: String,
    pub arity: usize,
}

/// Cached getter/setter pair for one class property. Either side may be
/// absent; callers treat a missing side as "accessor not exposed".
#[derive(Debug, Clone)]
pub struct PropertyHandle {
    pub getter: Option<MethodHandle>,
    pub setter: Option<MethodHandle>,
}

/// Cached reflection state for one scripting class: the prototype, its
/// public field list, and memoized method/property lookups. Descriptors are
/// built per domain generation and discarded wholesale on reload; a handle
/// cached here must never outlive its domain.
pub struct ScriptClass {
    namespace: String,
    name: String,
    generation: u64,
    prototype: Map,
    fields: Vec<FieldMeta>,
    methods: RefCell<HashMap<String, Option<MethodHandle>>>,
    properties: RefCell<HashMap<String, Option<Rc<PropertyHandle>>>>,
}

impl ScriptClass {
    /// Resolve the class prototype in the loaded assemblies and reflect its
    /// fields once.
    pub fn load(domain: &ScriptDomain, namespace: &str, name: &str) -> Result<Self> {
        let prototype = domain
            .find_prototype(namespace, name)
            .ok_or_else(|| anyhow!("class {namespace}.{name} not found in loaded assemblies"))?;
        let fields = extract_fields(&prototype);
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            generation: domain.generation(),
            prototype,
            fields,
            methods: RefCell::new(HashMap::new()),
            properties: RefCell::new(HashMap::new()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// Allocate a fresh managed object of this class: deep-copy the
    /// prototype, pin it, and run the class's default constructor when one
    /// is defined. Entity-owned instances take a strong pin.
    pub fn instantiate(&self, domain: &ScriptDomain, gc: &mut GcManager, weak: bool) -> ManagedHandle {
        let object = ScriptObject::from_map(self.prototype.clone());
        let handle = gc.create(object, weak);
        if let Some(ctor) = self.lookup(domain, "init", 1) {
            domain.invoke(gc, handle, &ctor, Vec::new());
        }
        handle
    }

    /// Signature-matched method lookup, memoized including misses so the
    /// "callback absent" case is logged once and then free.
    pub fn method(&self, domain: &ScriptDomain, name: &str, arity: usize) -> Option<MethodHandle> {
        let key = format!("{name}/{arity}");
        if let Some(cached) = self.methods.borrow().get(&key) {
            return cached.clone();
        }
        let found = self.lookup(domain, name, arity);
        if found.is_none() {
            eprintln!("[script] method not found: {}::{name} ({arity} args)", self.qualified_name());
        }
        self.methods.borrow_mut().insert(key, found.clone());
        found
    }

    /// Property accessor lookup, cached per (class, property) pair. A
    /// property with neither getter nor setter logs an error and caches the
    /// miss.
    pub fn property(&self, domain: &ScriptDomain, name: &str) -> Option<Rc<PropertyHandle>> {
        if let Some(cached) = self.properties.borrow().get(name) {
            return cached.clone();
        }
        let getter = self.lookup(domain, &format!("get_{name}"), 1);
        let setter = self.lookup(domain, &format!("set_{name}"), 2);
        let found = if getter.is_some() || setter.is_some() {
            Some(Rc::new(PropertyHandle { getter, setter }))
        } else {
            eprintln!("[script] property '{name}' not found in class {}", self.qualified_name());
            None
        };
        self.properties.borrow_mut().insert(name.to_string(), found.clone());
        found
    }

    /// Raw signature probe without logging; method names are mangled with
    /// the class short name.
    fn lookup(&self, domain: &ScriptDomain, name: &str, arity: usize) -> Option<MethodHandle> {
        let fn_name = format!("{}_{name}", self.name);
        domain
            .find_function(&fn_name, arity)
            .then_some(MethodHandle { fn_name, arity })
    }
}
