//! The live object proxy.
//!
//! A [`DynamicObject`] makes one host struct instance observable and mutable
//! as if it were native script data, without copying. Property traffic is
//! resolved through the type's [`Template`]:
//!
//! - get: mapped host fields first (first successfully marshalled non-null
//!   value wins; a null result is kept as fallback), then the custom-getter
//!   capability, then the overflow store, then the shared prototype, then
//!   `undefined`.
//! - set: the first mapped host field whose type accepts the value, then the
//!   custom-setter capability, then the overflow store. Writes that land in
//!   the overflow store never touch host memory.
//! - keys: mapped names (minus omit-empty names whose current value is
//!   nullish) plus overflow keys, sorted for determinism.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use super::error::ScriptError;
use super::handle::HostHandle;
use super::template::Template;
use super::value::Value;
use crate::runtime::{Ctx, RuntimeCore};

/// Live proxy over one host struct instance.
pub struct DynamicObject {
    core: Weak<RuntimeCore>,
    template: Rc<Template>,
    target: HostHandle,
    /// Script-only properties with no backing host field.
    overflow: RefCell<BTreeMap<String, Value>>,
    self_ref: RefCell<Weak<DynamicObject>>,
}

impl DynamicObject {
    pub(crate) fn new(
        core: Weak<RuntimeCore>,
        template: Rc<Template>,
        target: HostHandle,
    ) -> Rc<Self> {
        let proxy = Rc::new(DynamicObject {
            core,
            template,
            target,
            overflow: RefCell::new(BTreeMap::new()),
            self_ref: RefCell::new(Weak::new()),
        });
        *proxy.self_ref.borrow_mut() = Rc::downgrade(&proxy);
        proxy
    }

    /// The wrapped host instance.
    pub fn target(&self) -> &HostHandle {
        &self.target
    }

    /// Host type name.
    pub fn type_name(&self) -> &'static str {
        self.template.type_name()
    }

    /// Script-side type name.
    pub fn js_name(&self) -> &str {
        self.template.js_name()
    }

    fn ctx(&self) -> Result<Ctx, ScriptError> {
        let core = self.core.upgrade().ok_or(ScriptError::RuntimeGone)?;
        Ok(Ctx::new(core))
    }

    /// Resolve a property read.
    pub fn get(&self, key: &str) -> Result<Value, ScriptError> {
        let cx = self.ctx()?;

        if let Some(group) = self.template.field_group(key) {
            let mut fallback: Option<Value> = None;
            let mut last_err = None;
            for field in group {
                match (field.get)(&self.target, &cx) {
                    Ok(value) if value.is_nullish() => {
                        if fallback.is_none() {
                            fallback = Some(value);
                        }
                    }
                    Ok(value) => return Ok(value),
                    Err(err) => last_err = Some(err),
                }
            }
            if let Some(value) = fallback {
                return Ok(value);
            }
            if let Some(err) = last_err {
                return Err(err.into());
            }
        }

        if let Some(hooks) = &self.template.accessors {
            if let Some(value) = (hooks.get)(&self.target, key, &cx) {
                return Ok(value);
            }
        }

        if let Some(value) = self.overflow.borrow().get(key) {
            return Ok(value.clone());
        }

        if let Some(group) = self.template.proto(key) {
            return Ok(self.bind(group));
        }

        Ok(Value::Undefined)
    }

    /// Resolve a property write.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ScriptError> {
        let cx = self.ctx()?;

        if let Some(group) = self.template.field_group(key) {
            for field in group {
                if (field.set)(&self.target, &value, &cx).is_ok() {
                    return Ok(());
                }
            }
        }

        if let Some(hooks) = &self.template.accessors {
            if (hooks.set)(&self.target, key, &value, &cx) {
                return Ok(());
            }
        }

        self.overflow.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    /// Own enumerable keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut out: BTreeSet<String> = BTreeSet::new();
        let cx = self.ctx().ok();

        for exposed in self.template.exposed_field_names() {
            if self.template.hide_when_empty.contains(&exposed) {
                if let Some(cx) = &cx {
                    if self.resolves_nullish(&exposed, cx) {
                        continue;
                    }
                }
            }
            out.insert(exposed);
        }
        out.extend(self.overflow.borrow().keys().cloned());
        out.into_iter().collect()
    }

    /// True when every mapped field under `exposed` currently reads nullish.
    fn resolves_nullish(&self, exposed: &str, cx: &Ctx) -> bool {
        let Some(group) = self.template.field_group(exposed) else {
            return false;
        };
        group.iter().all(|field| {
            matches!((field.get)(&self.target, cx), Ok(value) if value.is_nullish())
        })
    }

    /// Advance the native-iteration capability, if the type registered one.
    ///
    /// Engines call this to implement script iteration syntax over host
    /// values; `None` means the type is not iterable or is exhausted.
    pub fn iter_next(&self) -> Result<Option<Value>, ScriptError> {
        let Some(hook) = self.template.iter else {
            return Ok(None);
        };
        let cx = self.ctx()?;
        Ok(hook(&self.target, &cx))
    }

    /// Bind a prototype function group to this instance.
    fn bind(&self, group: &Rc<super::dispatch::FunctionGroup>) -> Value {
        let this = self
            .self_ref
            .borrow()
            .upgrade()
            .map(Value::HostObject);
        Value::HostFunction(Rc::new(super::dispatch::HostFunction::new(
            Rc::clone(group),
            this,
            self.core.clone(),
        )))
    }
}

impl std::fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicObject")
            .field("type_name", &self.type_name())
            .field("target", &self.target.key())
            .field("overflow", &self.overflow.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as StdBTreeMap;

    use crate::engine::NullEngine;
    use crate::ffi::handle::Handle;
    use crate::ffi::marshal::IntoValue;
    use crate::ffi::reflect::{HostType, PropertyAccess, ScriptIterate};
    use crate::registry::{field, RegistryBuilder};
    use crate::runtime::Runtime;

    #[derive(Default)]
    struct Container {
        name: String,
        image: Option<String>,
        replicas: i64,
    }

    impl Container {
        fn render(&self) -> String {
            format!("{}x{}", self.name, self.replicas)
        }

        fn scale(&mut self, replicas: i64) {
            self.replicas = replicas;
        }
    }

    crate::host_type! {
        impl Container {
            fields {
                name: String,
                image: Option<String> [omit_empty],
                replicas: i64,
            }
            methods {
                fn render(&self) -> String;
                fn scale(&mut self, replicas: i64);
            }
        }
    }

    fn setup() -> (Runtime, Handle<Container>, Rc<DynamicObject>) {
        let mut builder = RegistryBuilder::new();
        builder
            .register_type::<Container>()
            .fields(["name", "image", "replicas"])
            .methods(["render", "scale"]);
        let rt = Runtime::new(builder, Box::new(NullEngine)).unwrap();
        let handle = Handle::new(Container {
            name: "web".into(),
            image: None,
            replicas: 2,
        });
        let value = handle.clone().into_value(&rt.ctx()).unwrap();
        let Value::HostObject(proxy) = value else {
            panic!("expected a host object");
        };
        (rt, handle, proxy)
    }

    #[test]
    fn get_reads_host_fields() {
        let (_rt, _handle, proxy) = setup();
        assert_eq!(proxy.get("name").unwrap(), Value::string("web"));
        assert_eq!(proxy.get("replicas").unwrap(), Value::Int(2));
    }

    #[test]
    fn set_writes_through_to_host_memory() {
        let (_rt, handle, proxy) = setup();
        proxy.set("replicas", Value::Int(5)).unwrap();
        assert_eq!(handle.borrow().replicas, 5);
    }

    #[test]
    fn host_writes_are_visible_to_script_reads() {
        let (_rt, handle, proxy) = setup();
        handle.borrow_mut().name = "db".into();
        assert_eq!(proxy.get("name").unwrap(), Value::string("db"));
    }

    #[test]
    fn nil_pointer_field_round_trip() {
        let (_rt, handle, proxy) = setup();
        proxy.set("image", Value::string("nginx:1.27")).unwrap();
        assert_eq!(handle.borrow().image.as_deref(), Some("nginx:1.27"));

        proxy.set("image", Value::Null).unwrap();
        assert_eq!(handle.borrow().image, None);
        assert_eq!(proxy.get("image").unwrap(), Value::Null);
    }

    #[test]
    fn rejected_writes_land_in_the_overflow_store() {
        let (_rt, handle, proxy) = setup();
        // No field accepts a bool under "replicas"; the write must not touch
        // host memory.
        proxy.set("replicas", Value::Bool(true)).unwrap();
        assert_eq!(handle.borrow().replicas, 2);
        assert_eq!(proxy.get("replicas").unwrap(), Value::Int(2));

        proxy.set("annotations", Value::string("a=b")).unwrap();
        assert_eq!(proxy.get("annotations").unwrap(), Value::string("a=b"));
        assert_eq!(handle.borrow().replicas, 2);
    }

    #[test]
    fn unknown_key_is_undefined() {
        let (_rt, _handle, proxy) = setup();
        assert_eq!(proxy.get("missing").unwrap(), Value::Undefined);
    }

    #[test]
    fn keys_are_sorted_and_hide_empty_fields() {
        let (_rt, handle, proxy) = setup();
        assert_eq!(proxy.keys(), vec!["name".to_string(), "replicas".to_string()]);

        handle.borrow_mut().image = Some("nginx".into());
        assert_eq!(
            proxy.keys(),
            vec!["image".to_string(), "name".to_string(), "replicas".to_string()]
        );
    }

    #[test]
    fn keys_include_overflow_entries() {
        let (_rt, _handle, proxy) = setup();
        proxy.set("zebra", Value::Int(1)).unwrap();
        proxy.set("alpha", Value::Int(2)).unwrap();
        assert_eq!(
            proxy.keys(),
            vec![
                "alpha".to_string(),
                "name".to_string(),
                "replicas".to_string(),
                "zebra".to_string()
            ]
        );
    }

    #[test]
    fn prototype_methods_dispatch_against_the_instance() {
        let (_rt, handle, proxy) = setup();
        let Value::HostFunction(render) = proxy.get("render").unwrap() else {
            panic!("render should resolve to a host function");
        };
        assert_eq!(render.call(&[]).unwrap(), Value::string("webx2"));

        let Value::HostFunction(scale) = proxy.get("scale").unwrap() else {
            panic!("scale should resolve to a host function");
        };
        scale.call(&[Value::Int(7)]).unwrap();
        assert_eq!(handle.borrow().replicas, 7);
    }

    #[derive(Default)]
    struct Annotations {
        entries: StdBTreeMap<String, String>,
    }

    impl HostType for Annotations {
        const NAME: &'static str = "Annotations";
    }

    impl PropertyAccess for Annotations {
        fn get_property(&self, key: &str, _cx: &Ctx) -> Option<Value> {
            self.entries.get(key).map(Value::string)
        }

        fn set_property(&mut self, key: &str, value: Value, _cx: &Ctx) -> bool {
            match value {
                Value::String(s) => {
                    self.entries.insert(key.to_string(), s.to_string());
                    true
                }
                _ => false,
            }
        }
    }

    #[test]
    fn custom_accessors_replace_field_lookup() {
        let mut builder = RegistryBuilder::new();
        builder.register_type::<Annotations>().custom_accessors();
        let rt = Runtime::new(builder, Box::new(NullEngine)).unwrap();

        let handle = Handle::new(Annotations::default());
        let Value::HostObject(proxy) = handle.clone().into_value(&rt.ctx()).unwrap() else {
            panic!("expected a host object");
        };

        proxy.set("team", Value::string("infra")).unwrap();
        assert_eq!(handle.borrow().entries.get("team").map(String::as_str), Some("infra"));
        assert_eq!(proxy.get("team").unwrap(), Value::string("infra"));

        // The accessor declines non-strings; the write falls through to the
        // overflow store without touching the host map.
        proxy.set("count", Value::Int(3)).unwrap();
        assert!(handle.borrow().entries.get("count").is_none());
        assert_eq!(proxy.get("count").unwrap(), Value::Int(3));
    }

    #[derive(Default)]
    struct Countdown {
        remaining: i64,
    }

    impl HostType for Countdown {
        const NAME: &'static str = "Countdown";
    }

    impl ScriptIterate for Countdown {
        fn next_value(&mut self, _cx: &Ctx) -> Option<Value> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            Some(Value::Int(self.remaining))
        }
    }

    #[test]
    fn iteration_capability_drains_the_host_iterator() {
        let mut builder = RegistryBuilder::new();
        builder.register_type::<Countdown>().iterable();
        let rt = Runtime::new(builder, Box::new(NullEngine)).unwrap();

        let handle = Handle::new(Countdown { remaining: 2 });
        let Value::HostObject(proxy) = handle.into_value(&rt.ctx()).unwrap() else {
            panic!("expected a host object");
        };

        assert_eq!(proxy.iter_next().unwrap(), Some(Value::Int(1)));
        assert_eq!(proxy.iter_next().unwrap(), Some(Value::Int(0)));
        assert_eq!(proxy.iter_next().unwrap(), None);
    }

    #[test]
    fn proxy_without_runtime_reports_runtime_gone() {
        let (rt, _handle, proxy) = setup();
        drop(rt);
        assert!(matches!(proxy.get("name"), Err(ScriptError::RuntimeGone)));
    }

    #[test]
    fn field_decl_js_name_override() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_type::<Container>()
            .fields([field("name").js_name("containerName")]);
        let rt = Runtime::new(builder, Box::new(NullEngine)).unwrap();
        let handle = Handle::new(Container {
            name: "web".into(),
            ..Container::default()
        });
        let Value::HostObject(proxy) = handle.into_value(&rt.ctx()).unwrap() else {
            panic!("expected a host object");
        };
        assert_eq!(proxy.get("containerName").unwrap(), Value::string("web"));
        assert_eq!(proxy.get("name").unwrap(), Value::Undefined);
    }
}
