//! The fluent registration surface.
//!
//! All declarations are pure data accumulation: a [`RegistryBuilder`] collects
//! type, function and variable registrations, and is consumed exactly once by
//! [`Runtime::new`](crate::runtime::Runtime::new), which materializes them
//! into templates, prototypes and dispatch tables. Nothing can be registered
//! after that point, by construction.
//!
//! # Example
//!
//! ```ignore
//! let mut builder = RegistryBuilder::new();
//!
//! builder
//!     .register_type::<Point>()
//!     .js_namespace("geometry")
//!     .fields(["x", "y"])
//!     .methods(["sum"])
//!     .constructor(|x: i64, y: i64| Point { x, y, ..Point::default() });
//!
//! builder.register_fn("make_grid", make_grid).js_namespace("geometry");
//! builder.register_var("geometry", "origin", 0i64);
//!
//! let runtime = Runtime::new(builder, engine)?;
//! ```

use std::any::TypeId;
use std::marker::PhantomData;

use rustc_hash::FxHashMap;

use crate::ffi::{
    accessor_get, accessor_set, erase_converter, iter_next, AccessorHooks, ConvertError,
    ConvertOverride, HostFn, HostType, IntoHostCtor, IntoHostFn, IntoValue, IterHook,
    PropertyAccess, ScriptIterate, StructDescriptor, TypeFlags, Value,
};
use crate::runtime::Ctx;

/// Camel-case a host member name: `display_name` becomes `displayName`.
///
/// This is the default exposed name for fields, methods and functions;
/// explicit `js_name` overrides take precedence.
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// A field declaration: host name plus an optional exposed-name override.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub(crate) host: String,
    pub(crate) js: Option<String>,
}

impl FieldDecl {
    /// Override the exposed name.
    pub fn js_name(mut self, name: &str) -> Self {
        self.js = Some(name.to_string());
        self
    }
}

/// Declare a field by host name.
pub fn field(host: &str) -> FieldDecl {
    FieldDecl {
        host: host.to_string(),
        js: None,
    }
}

impl From<&str> for FieldDecl {
    fn from(host: &str) -> Self {
        field(host)
    }
}

/// A method declaration: host name plus an optional exposed-name override.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub(crate) host: String,
    pub(crate) js: Option<String>,
}

impl MethodDecl {
    /// Override the exposed name.
    pub fn js_name(mut self, name: &str) -> Self {
        self.js = Some(name.to_string());
        self
    }
}

/// Declare a method by host name.
pub fn method(host: &str) -> MethodDecl {
    MethodDecl {
        host: host.to_string(),
        js: None,
    }
}

impl From<&str> for MethodDecl {
    fn from(host: &str) -> Self {
        method(host)
    }
}

/// A constructor declaration for type `T`.
pub struct ConstructorDecl<T: HostType> {
    pub(crate) func: HostFn,
    _marker: PhantomData<fn() -> T>,
}

/// Declare a constructor from a host callable returning the instance.
pub fn ctor<F, Args, Ret>(f: F) -> ConstructorDecl<F::Host>
where
    F: IntoHostCtor<Args, Ret>,
{
    ConstructorDecl {
        func: HostFn::constructor(F::Host::NAME, f),
        _marker: PhantomData,
    }
}

/// An extension method declaration: a host callable whose first parameter is
/// the receiver, attached to a type the callable does not belong to.
pub struct ExtensionDecl {
    pub(crate) host: String,
    pub(crate) js: Option<String>,
    pub(crate) func: HostFn,
}

impl ExtensionDecl {
    /// Override the exposed name.
    pub fn js_name(mut self, name: &str) -> Self {
        self.js = Some(name.to_string());
        self
    }
}

/// Declare an extension method by host name and callable.
pub fn ext_method<F, Args, Ret>(host: &str, f: F) -> ExtensionDecl
where
    F: IntoHostFn<Args, Ret>,
{
    ExtensionDecl {
        host: host.to_string(),
        js: None,
        func: HostFn::method(host, f),
    }
}

/// Accumulated declarations for one host type.
pub struct TypeRegistration {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) descriptor: Option<&'static StructDescriptor>,
    pub(crate) namespace: String,
    pub(crate) js_name: String,
    pub(crate) fields: Vec<FieldDecl>,
    pub(crate) methods: Vec<MethodDecl>,
    pub(crate) constructors: Vec<HostFn>,
    pub(crate) extensions: Vec<(String, HostFn)>,
    pub(crate) converters: Vec<ConvertOverride>,
    pub(crate) flags: TypeFlags,
    pub(crate) accessors: Option<AccessorHooks>,
    pub(crate) iter: Option<IterHook>,
}

impl TypeRegistration {
    fn new<T: HostType>() -> Self {
        TypeRegistration {
            type_id: TypeId::of::<T>(),
            type_name: T::NAME,
            descriptor: T::descriptor(),
            namespace: String::new(),
            js_name: T::NAME.to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            extensions: Vec::new(),
            converters: Vec::new(),
            flags: TypeFlags::default(),
            accessors: None,
            iter: None,
        }
    }

    /// True when this registration carries anything beyond conversion hooks.
    pub(crate) fn has_members(&self) -> bool {
        !self.fields.is_empty()
            || !self.methods.is_empty()
            || !self.constructors.is_empty()
            || !self.extensions.is_empty()
            || self.accessors.is_some()
            || self.iter.is_some()
    }
}

/// Fluent view over one [`TypeRegistration`].
///
/// Created by [`RegistryBuilder::register_type`]; the type parameter ties the
/// typed chain methods (constructors, conversions, capabilities) to the host
/// type being registered.
pub struct TypeBuilder<'r, T: HostType> {
    reg: &'r mut TypeRegistration,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: HostType> TypeBuilder<'r, T> {
    /// Place the type under a dot-separated namespace path.
    pub fn js_namespace(self, path: &str) -> Self {
        self.reg.namespace = path.to_string();
        self
    }

    /// Override the exposed type name (default: the host type name).
    pub fn js_name(self, name: &str) -> Self {
        self.reg.js_name = name.to_string();
        self
    }

    /// Select host fields to expose.
    ///
    /// Accepts plain host names (`["x", "y"]`) or explicit declarations
    /// (`[field("x").js_name("posX")]`). Unknown names are reported when the
    /// runtime materializes.
    pub fn fields<I>(self, decls: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldDecl>,
    {
        self.reg.fields.extend(decls.into_iter().map(Into::into));
        self
    }

    /// Select host methods to expose.
    pub fn methods<I>(self, decls: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<MethodDecl>,
    {
        self.reg.methods.extend(decls.into_iter().map(Into::into));
        self
    }

    /// Register one constructor overload.
    pub fn constructor<F, Args, Ret>(self, f: F) -> Self
    where
        F: IntoHostCtor<Args, Ret, Host = T>,
    {
        self.reg.constructors.push(ctor(f).func);
        self
    }

    /// Register several constructor overloads at once.
    pub fn constructors<I>(self, decls: I) -> Self
    where
        I: IntoIterator<Item = ConstructorDecl<T>>,
    {
        self.reg
            .constructors
            .extend(decls.into_iter().map(|d| d.func));
        self
    }

    /// Attach one extension method.
    pub fn extension_method<F, Args, Ret>(self, host: &str, f: F) -> Self
    where
        F: IntoHostFn<Args, Ret>,
    {
        self.extension_methods([ext_method(host, f)])
    }

    /// Attach several extension methods at once.
    pub fn extension_methods<I>(self, decls: I) -> Self
    where
        I: IntoIterator<Item = ExtensionDecl>,
    {
        for decl in decls {
            let exposed = decl.js.unwrap_or_else(|| camel_case(&decl.host));
            self.reg.extensions.push((exposed, decl.func));
        }
        self
    }

    /// Register a conversion override for this type.
    ///
    /// Overrides run after proxy unwrapping and before structural conversion,
    /// in registration order. Returning `Ok(Some(..))` or `Err(..)` is
    /// authoritative; `Ok(None)` declines and falls through.
    pub fn type_conversion<F>(self, converter: F) -> Self
    where
        F: Fn(&Value, &Ctx) -> Result<Option<T>, ConvertError> + 'static,
    {
        self.reg.converters.push(erase_converter(converter));
        self
    }

    /// Skip automatic struct-shape mapping for this type; script objects no
    /// longer convert structurally, only through conversion overrides.
    pub fn disable_object_mapping(self) -> Self {
        self.reg.flags |= TypeFlags::DISABLE_OBJECT_MAPPING;
        self
    }

    /// Route unmatched property traffic through the type's
    /// [`PropertyAccess`] implementation instead of the overflow store.
    pub fn custom_accessors(self) -> Self
    where
        T: PropertyAccess,
    {
        self.reg.accessors = Some(AccessorHooks {
            get: accessor_get::<T>,
            set: accessor_set::<T>,
        });
        self.reg.flags |= TypeFlags::CUSTOM_ACCESSORS;
        self
    }

    /// Expose the type's [`ScriptIterate`] implementation to script
    /// iteration syntax.
    pub fn iterable(self) -> Self
    where
        T: ScriptIterate,
    {
        self.reg.iter = Some(iter_next::<T>);
        self.reg.flags |= TypeFlags::ITERABLE;
        self
    }
}

/// Accumulated declaration for one free function.
pub struct FunctionRegistration {
    pub(crate) host_name: String,
    pub(crate) js_name: Option<String>,
    pub(crate) namespace: String,
    pub(crate) func: HostFn,
}

impl FunctionRegistration {
    /// Place the function under a dot-separated namespace path.
    pub fn js_namespace(&mut self, path: &str) -> &mut Self {
        self.namespace = path.to_string();
        self
    }

    /// Override the exposed name (default: the camel-cased host name).
    pub fn js_name(&mut self, name: &str) -> &mut Self {
        self.js_name = Some(name.to_string());
        self
    }
}

/// Accumulated declaration for one namespace variable.
pub struct VariableRegistration {
    pub(crate) namespace: String,
    pub(crate) name: String,
    pub(crate) thunk: Box<dyn FnOnce(&Ctx) -> Result<Value, ConvertError>>,
}

/// Mutable collection of declarations, consumed once by the runtime.
#[derive(Default)]
pub struct RegistryBuilder {
    pub(crate) types: Vec<TypeRegistration>,
    index: FxHashMap<TypeId, usize>,
    pub(crate) functions: Vec<FunctionRegistration>,
    pub(crate) variables: Vec<VariableRegistration>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or resume) registering a host type.
    ///
    /// Re-registering the same type returns the existing registration
    /// unchanged rather than creating a duplicate.
    pub fn register_type<T: HostType>(&mut self) -> TypeBuilder<'_, T> {
        let index = match self.index.get(&TypeId::of::<T>()) {
            Some(&index) => index,
            None => {
                self.types.push(TypeRegistration::new::<T>());
                let index = self.types.len() - 1;
                self.index.insert(TypeId::of::<T>(), index);
                index
            }
        };
        TypeBuilder {
            reg: &mut self.types[index],
            _marker: PhantomData,
        }
    }

    /// Register a free function under its host name.
    ///
    /// Several registrations under one resolved exposed name form an
    /// overload group.
    pub fn register_fn<F, Args, Ret>(&mut self, host_name: &str, f: F) -> &mut FunctionRegistration
    where
        F: IntoHostFn<Args, Ret>,
    {
        self.functions.push(FunctionRegistration {
            host_name: host_name.to_string(),
            js_name: None,
            namespace: String::new(),
            func: HostFn::new(host_name, f),
        });
        let index = self.functions.len() - 1;
        &mut self.functions[index]
    }

    /// Register a constant value directly under a namespace.
    pub fn register_var<T>(&mut self, namespace: &str, name: &str, value: T)
    where
        T: IntoValue + 'static,
    {
        self.variables.push(VariableRegistration {
            namespace: namespace.to_string(),
            name: name.to_string(),
            thunk: Box::new(move |cx| value.into_value(cx)),
        });
    }

    /// Number of type registrations so far.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of function registrations so far.
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        value: i64,
    }

    impl Probe {
        fn double(&self) -> i64 {
            self.value * 2
        }
    }

    crate::host_type! {
        impl Probe {
            fields { value: i64 }
            methods {
                fn double(&self) -> i64;
            }
        }
    }

    #[test]
    fn camel_case_defaults() {
        assert_eq!(camel_case("x"), "x");
        assert_eq!(camel_case("display_name"), "displayName");
        assert_eq!(camel_case("image_pull_policy"), "imagePullPolicy");
        assert_eq!(camel_case("_hidden"), "hidden");
    }

    #[test]
    fn register_type_is_idempotent() {
        let mut builder = RegistryBuilder::new();
        builder.register_type::<Probe>().js_namespace("pkg");
        builder.register_type::<Probe>();
        assert_eq!(builder.type_count(), 1);
        // First registration wins; the second returned it unchanged.
        assert_eq!(builder.types[0].namespace, "pkg");
    }

    #[test]
    fn field_decl_override() {
        let decl = field("value").js_name("val");
        assert_eq!(decl.host, "value");
        assert_eq!(decl.js.as_deref(), Some("val"));
    }

    #[test]
    fn fields_accept_plain_names() {
        let mut builder = RegistryBuilder::new();
        builder.register_type::<Probe>().fields(["value"]);
        assert_eq!(builder.types[0].fields.len(), 1);
        assert_eq!(builder.types[0].fields[0].host, "value");
    }

    #[test]
    fn constructor_records_overloads() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_type::<Probe>()
            .constructor(|| Probe::default())
            .constructor(|value: i64| Probe { value });
        assert_eq!(builder.types[0].constructors.len(), 2);
    }

    #[test]
    fn register_fn_defaults_to_camel_case_later() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_fn("make_grid", |size: i64| size * size)
            .js_namespace("geometry");
        assert_eq!(builder.functions[0].namespace, "geometry");
        assert_eq!(builder.functions[0].js_name, None);
        assert_eq!(builder.functions[0].host_name, "make_grid");
    }

    #[test]
    fn extension_method_default_name_is_camel_cased() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_type::<Probe>()
            .extension_method("with_value", |this: crate::Handle<Probe>, v: i64| {
                this.borrow_mut().value = v;
            });
        assert_eq!(builder.types[0].extensions[0].0, "withValue");
    }

    #[test]
    fn disable_object_mapping_sets_flag() {
        let mut builder = RegistryBuilder::new();
        builder.register_type::<Probe>().disable_object_mapping();
        assert!(builder.types[0]
            .flags
            .contains(TypeFlags::DISABLE_OBJECT_MAPPING));
    }
}
