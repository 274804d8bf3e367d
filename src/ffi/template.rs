//! Materialized per-type metadata.
//!
//! A [`Template`] is the runnable form of one type registration, built
//! exactly once when the runtime seals its builder: the exposed-name to
//! host-name mapping in both directions (one exposed name may map to several
//! host fields, enabling overloaded accessors), the shared prototype of
//! dispatchable function groups, the set of names hidden while empty, and
//! the capability hooks the type opted into.

use std::any::TypeId;
use std::rc::Rc;

use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};

use super::dispatch::FunctionGroup;
use super::handle::HostHandle;
use super::reflect::{AccessorHooks, FieldDef, IterHook};

bitflags! {
    /// Behavior switches collected from a type registration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u8 {
        /// Skip automatic struct-shape mapping for this type.
        const DISABLE_OBJECT_MAPPING = 1;
        /// The type implements [`PropertyAccess`](super::reflect::PropertyAccess).
        const CUSTOM_ACCESSORS = 1 << 1;
        /// The type implements [`ScriptIterate`](super::reflect::ScriptIterate).
        const ITERABLE = 1 << 2;
    }
}

/// Runnable metadata for one registered host type.
pub struct Template {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) js_name: String,
    pub(crate) flags: TypeFlags,
    /// Exposed name -> host fields sharing it, in registration order.
    pub(crate) fields: FxHashMap<String, Vec<&'static FieldDef>>,
    /// Host field name -> exposed name.
    pub(crate) exposed_names: FxHashMap<&'static str, String>,
    /// Exposed names hidden from enumeration while their value is nullish.
    pub(crate) hide_when_empty: FxHashSet<String>,
    /// Shared prototype: dispatchable function groups by exposed name.
    pub(crate) prototype: FxHashMap<String, Rc<FunctionGroup>>,
    /// Custom get/set capability, if the type opted in.
    pub(crate) accessors: Option<AccessorHooks>,
    /// Native iteration capability, if the type opted in.
    pub(crate) iter: Option<IterHook>,
    /// Allocate a default instance, when the type carries a descriptor.
    pub(crate) create: Option<fn() -> HostHandle>,
}

impl Template {
    /// `TypeId` of the host type this template describes.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Host type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Script-side type name.
    pub fn js_name(&self) -> &str {
        &self.js_name
    }

    /// Host fields mapped under an exposed name.
    pub(crate) fn field_group(&self, exposed: &str) -> Option<&[&'static FieldDef]> {
        self.fields.get(exposed).map(Vec::as_slice)
    }

    /// The exposed name of a host field.
    pub fn exposed_name(&self, host: &str) -> Option<&str> {
        self.exposed_names.get(host).map(String::as_str)
    }

    /// Prototype function group under an exposed name.
    pub(crate) fn proto(&self, exposed: &str) -> Option<&Rc<FunctionGroup>> {
        self.prototype.get(exposed)
    }

    /// All exposed field names, sorted for deterministic traversal.
    pub(crate) fn exposed_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("type_name", &self.type_name)
            .field("js_name", &self.js_name)
            .field("fields", &self.fields.len())
            .field("prototype", &self.prototype.len())
            .field("flags", &self.flags)
            .finish()
    }
}
