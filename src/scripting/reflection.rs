use glam::Vec2;
use rhai::{Dynamic, Map};

use super::gc::{GcManager, ManagedHandle, ScriptObject};

/// Semantic type tag of one scripting-visible field. Closed set; anything a
/// class prototype declares outside of it is invisible to reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Str,
    Vec2,
    Object,
}

impl FieldType {
    pub fn label(self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Str => "string",
            FieldType::Vec2 => "vec2",
            FieldType::Object => "object",
        }
    }
}

/// Typed payload of a field. Owning the data outright means reconciliation
/// moves values instead of copying through transient buffers.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Bool(bool),
    Int(rhai::INT),
    Float(rhai::FLOAT),
    Str(String),
    Vec2(Vec2),
    Object(ScriptObject),
}

impl FieldValue {
    pub fn from_dynamic(value: Dynamic) -> Option<FieldValue> {
        if let Ok(flag) = value.as_bool() {
            return Some(FieldValue::Bool(flag));
        }
        if let Ok(int) = value.as_int() {
            return Some(FieldValue::Int(int));
        }
        if let Ok(float) = value.as_float() {
            return Some(FieldValue::Float(float));
        }
        if value.is::<Vec2>() {
            return value.try_cast::<Vec2>().map(FieldValue::Vec2);
        }
        if let Ok(text) = value.clone().into_string() {
            return Some(FieldValue::Str(text));
        }
        if value.is::<Map>() || value.is_shared() {
            return Some(FieldValue::Object(ScriptObject::from_dynamic(value)));
        }
        None
    }

    pub fn to_dynamic(&self) -> Dynamic {
        match self {
            FieldValue::Bool(flag) => Dynamic::from(*flag),
            FieldValue::Int(int) => Dynamic::from(*int),
            FieldValue::Float(float) => Dynamic::from(*float),
            FieldValue::Str(text) => Dynamic::from(text.clone()),
            FieldValue::Vec2(vec) => Dynamic::from(*vec),
            FieldValue::Object(object) => object.as_dynamic(),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Str(_) => FieldType::Str,
            FieldValue::Vec2(_) => FieldType::Vec2,
            FieldValue::Object(_) => FieldType::Object,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<rhai::INT> {
        match self {
            FieldValue::Int(int) => Some(*int),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<rhai::FLOAT> {
        match self {
            FieldValue::Float(float) => Some(*float),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            FieldValue::Vec2(vec) => Some(*vec),
            _ => None,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a == b,
            (FieldValue::Str(a), FieldValue::Str(b)) => a == b,
            (FieldValue::Vec2(a), FieldValue::Vec2(b)) => a == b,
            // Object identity is not observable through the handle table.
            _ => false,
        }
    }
}

/// Reflected metadata for one public field of a class prototype.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub name: String,
    pub ty: FieldType,
    pub default: FieldValue,
}

/// Enumerate the publicly visible fields of a class prototype, in the
/// runtime's iteration order. Keys starting with `_` are non-public (that
/// includes the `_namespace`/`_name`/`_parent` class metadata) and values
/// outside the closed type set are skipped. The result is cached per class
/// descriptor.
pub fn extract_fields(prototype: &Map) -> Vec<FieldMeta> {
    let mut fields = Vec::new();
    for (key, value) in prototype.iter() {
        if key.starts_with('_') {
            continue;
        }
        if let Some(default) = FieldValue::from_dynamic(value.clone()) {
            fields.push(FieldMeta { name: key.to_string(), ty: default.field_type(), default });
        }
    }
    fields
}

/// One named, typed value exposed for inspection, bound to the managed
/// object that owns it. The snapshot mirrors the last value seen natively;
/// reads and writes round-trip through the handle table.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    ty: FieldType,
    value: FieldValue,
    owner: ManagedHandle,
}

impl Field {
    pub fn new(meta: &FieldMeta, owner: ManagedHandle) -> Self {
        Self { name: meta.name.clone(), ty: meta.ty, value: meta.default.clone(), owner }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> FieldType {
        self.ty
    }

    /// Last snapshotted value.
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn owner(&self) -> ManagedHandle {
        self.owner
    }

    /// Current value inside the live managed object, if it still resolves.
    pub fn live_value(&self, gc: &GcManager) -> Option<FieldValue> {
        let object = gc.resolve(self.owner)?;
        FieldValue::from_dynamic(object.get(&self.name)?)
    }

    /// Refresh the snapshot from the live object.
    pub fn read_live(&mut self, gc: &GcManager) -> Option<&FieldValue> {
        let value = self.live_value(gc)?;
        self.value = value;
        Some(&self.value)
    }

    /// Write through to the live object and update the snapshot. A value of
    /// the wrong type tag, or a dead owner handle, is recovered locally.
    pub fn write(&mut self, gc: &GcManager, value: FieldValue) -> bool {
        if value.field_type() != self.ty {
            eprintln!(
                "[script] field '{}' expects {}, got {}",
                self.name,
                self.ty.label(),
                value.field_type().label()
            );
            return false;
        }
        let Some(object) = gc.resolve(self.owner) else {
            return false;
        };
        object.set(&self.name, value.to_dynamic());
        self.value = value;
        true
    }
}
