use rhai::{Dynamic, Map};
use std::collections::HashMap;
use std::num::NonZeroU64;

/// Opaque reference to one managed object pinned in the [`GcManager`] table.
///
/// Native code never holds a raw script value across a domain teardown; it
/// holds one of these and resolves it at call time. A handle that has been
/// released (or reclaimed by a collection pass) resolves to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagedHandle(NonZeroU64);

/// One live object inside the scripting runtime: a shared object map.
///
/// Cloning shares the underlying storage, so a `ScriptObject` passed into a
/// script call observes and exposes mutations made on the managed side.
#[derive(Debug, Clone)]
pub struct ScriptObject(Dynamic);

impl ScriptObject {
    pub fn from_map(map: Map) -> Self {
        Self(Dynamic::from(map).into_shared())
    }

    pub fn from_dynamic(value: Dynamic) -> Self {
        if value.is_shared() {
            Self(value)
        } else {
            Self(value.into_shared())
        }
    }

    /// Shared alias suitable for passing as a script-call argument.
    pub fn as_dynamic(&self) -> Dynamic {
        self.0.clone()
    }

    pub fn get(&self, key: &str) -> Option<Dynamic> {
        let map = self.0.read_lock::<Map>()?;
        map.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Dynamic) -> bool {
        // A clone of a shared value aliases the same storage, so locking the
        // clone writes through to every holder.
        let mut cell = self.0.clone();
        let written = match cell.write_lock::<Map>() {
            Some(mut map) => {
                map.insert(key.into(), value);
                true
            }
            None => false,
        };
        written
    }

    /// Shallow clone of the whole object with fresh top-level storage.
    /// Nested shared values keep sharing with the source.
    pub fn clone_object(&self) -> Option<ScriptObject> {
        let map = self.0.read_lock::<Map>()?.clone();
        Some(Self::from_map(map))
    }
}

struct Slot {
    object: ScriptObject,
    weak: bool,
}

/// Pin table between native code and the managed heap.
///
/// Every cross-boundary object reference goes through here, which makes
/// "the domain was torn down" representable as a failed resolve instead of
/// undefined behaviour.
pub struct GcManager {
    slots: HashMap<ManagedHandle, Slot>,
    next: NonZeroU64,
}

impl GcManager {
    pub fn new() -> Self {
        Self { slots: HashMap::new(), next: NonZeroU64::MIN }
    }

    /// Pin `object` and return a stable handle. Weak pins do not keep the
    /// object alive across [`collect_garbage`](Self::collect_garbage).
    pub fn create(&mut self, object: ScriptObject, weak: bool) -> ManagedHandle {
        let handle = ManagedHandle(self.next);
        self.next = self.next.checked_add(1).unwrap_or(NonZeroU64::MIN);
        self.slots.insert(handle, Slot { object, weak });
        handle
    }

    pub fn resolve(&self, handle: ManagedHandle) -> Option<ScriptObject> {
        self.slots.get(&handle).map(|slot| slot.object.clone())
    }

    /// Unpin and invalidate. Releasing an unknown or already-released handle
    /// is a no-op, so the single-release-point rule stays cheap to uphold.
    pub fn release(&mut self, handle: ManagedHandle) {
        self.slots.remove(&handle);
    }

    /// Full collection pass: reclaims every weakly pinned object. Run after
    /// bulk teardown so memory is returned before a reload proceeds.
    pub fn collect_garbage(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.weak);
        self.slots.shrink_to_fit();
        before - self.slots.len()
    }

    pub fn live_handles(&self) -> usize {
        self.slots.len()
    }
}

impl Default for GcManager {
    fn default() -> Self {
        Self::new()
    }
}
