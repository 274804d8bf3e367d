//! Proxy identity deduplication.
//!
//! One host allocation maps to at most one live proxy: wrapping the same
//! handle twice yields the same script object, so reference equality on the
//! script side mirrors pointer identity on the host side. Entries hold weak
//! references; a proxy the script no longer reaches is reclaimed by ordinary
//! `Rc` drop semantics, and its stale entry is pruned on the next lookup.

use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use super::array::DynamicArray;
use super::object::DynamicObject;

/// Weak table from host allocation address to live proxy.
#[derive(Default)]
pub struct IdentityStore {
    objects: FxHashMap<usize, Weak<DynamicObject>>,
    arrays: FxHashMap<usize, Weak<DynamicArray>>,
}

impl IdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The still-alive object proxy for `key`, if any.
    ///
    /// A dead entry is pruned; the caller then creates a fresh proxy and
    /// stores it, so a proxy is only ever recreated after the previous one
    /// has actually been collected.
    pub fn load_object(&mut self, key: usize) -> Option<Rc<DynamicObject>> {
        match self.objects.get(&key).and_then(Weak::upgrade) {
            Some(live) => Some(live),
            None => {
                self.objects.remove(&key);
                None
            }
        }
    }

    /// Record the object proxy for `key`, replacing any previous entry.
    pub fn store_object(&mut self, key: usize, proxy: &Rc<DynamicObject>) {
        self.objects.insert(key, Rc::downgrade(proxy));
    }

    /// The still-alive array proxy for `key`, if any.
    pub fn load_array(&mut self, key: usize) -> Option<Rc<DynamicArray>> {
        match self.arrays.get(&key).and_then(Weak::upgrade) {
            Some(live) => Some(live),
            None => {
                self.arrays.remove(&key);
                None
            }
        }
    }

    /// Record the array proxy for `key`, replacing any previous entry.
    pub fn store_array(&mut self, key: usize, proxy: &Rc<DynamicArray>) {
        self.arrays.insert(key, Rc::downgrade(proxy));
    }

    /// Number of tracked entries, live or not yet pruned.
    pub fn len(&self) -> usize {
        self.objects.len() + self.arrays.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.arrays.is_empty()
    }
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore")
            .field("objects", &self.objects.len())
            .field("arrays", &self.arrays.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NullEngine;
    use crate::ffi::handle::Handle;
    use crate::ffi::marshal::IntoValue;
    use crate::ffi::value::Value;
    use crate::registry::RegistryBuilder;
    use crate::runtime::Runtime;

    #[derive(Default)]
    struct Node {
        id: i64,
    }

    crate::host_type! {
        impl Node {
            fields { id: i64 }
        }
    }

    fn runtime() -> Runtime {
        let mut builder = RegistryBuilder::new();
        builder.register_type::<Node>().fields(["id"]);
        Runtime::new(builder, Box::new(NullEngine)).unwrap()
    }

    #[test]
    fn wrapping_twice_yields_the_same_proxy() {
        let rt = runtime();
        let cx = rt.ctx();
        let handle = Handle::new(Node { id: 1 });

        let a = handle.clone().into_value(&cx).unwrap();
        let b = handle.clone().into_value(&cx).unwrap();
        assert_eq!(a, b);

        let (Value::HostObject(pa), Value::HostObject(pb)) = (&a, &b) else {
            panic!("expected host objects");
        };
        assert!(Rc::ptr_eq(pa, pb));
    }

    #[test]
    fn distinct_instances_get_distinct_proxies() {
        let rt = runtime();
        let cx = rt.ctx();
        let a = Handle::new(Node { id: 1 }).into_value(&cx).unwrap();
        let b = Handle::new(Node { id: 1 }).into_value(&cx).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn collected_proxy_is_replaced_by_a_fresh_one() {
        let rt = runtime();
        let cx = rt.ctx();
        let handle = Handle::new(Node { id: 7 });

        let first = handle.clone().into_value(&cx).unwrap();
        drop(first);

        // The only strong reference is gone; rewrapping the still-live host
        // instance must produce a fresh, fully functional proxy.
        let second = handle.clone().into_value(&cx).unwrap();
        let Value::HostObject(p) = &second else {
            panic!("expected a host object");
        };
        assert_eq!(p.get("id").unwrap(), Value::Int(7));
    }

    #[test]
    fn store_replaces_existing_entries() {
        let rt = runtime();
        let cx = rt.ctx();
        let handle = Handle::new(Node { id: 1 });
        let value = handle.clone().into_value(&cx).unwrap();

        let key = handle.erase().key();
        {
            let mut store = cx.core().identity.borrow_mut();
            let live = store.load_object(key).expect("proxy should be live");
            store.store_object(key, &live);
            assert!(store.load_object(key).is_some());
        }
        drop(value);

        let mut store = cx.core().identity.borrow_mut();
        assert!(store.load_object(key).is_none());
    }
}
