//! The execution-ready runtime.
//!
//! [`Runtime::new`] consumes a [`RegistryBuilder`] exactly once and
//! materializes every accumulated declaration: type registrations become
//! [`Template`]s with sealed prototype groups, constructors and free
//! functions become dispatchable values under lazily created namespace
//! objects, and variables are converted into the global scope. The result is
//! immutable; registration after materialization is unrepresentable.
//!
//! [`Runtime::run`] then hands the script source, the populated globals and
//! the call arguments to the host-supplied [`ScriptEngine`].
//!
//! A runtime instance is single-threaded and cooperative: every property
//! access and call is answered synchronously on the calling thread.

use std::any::TypeId;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::{Execution, ScriptEngine};
use crate::ffi::{
    ConvertError, ConverterRegistry, FieldDef, FnKind, FromValue, FunctionGroup, HostFunction,
    IdentityStore, IntoValue, RegistryError, ScriptError, ScriptObject, Template, Value,
};
use crate::registry::{camel_case, RegistryBuilder};

/// Shared runtime state: templates, converters, identity and globals.
///
/// Proxies and host-function values hold weak references to this; it lives
/// exactly as long as its [`Runtime`].
pub struct RuntimeCore {
    pub(crate) templates: FxHashMap<TypeId, Rc<Template>>,
    pub(crate) converters: ConverterRegistry,
    pub(crate) identity: RefCell<IdentityStore>,
    pub(crate) globals: ScriptObject,
    pub(crate) argv: RefCell<Vec<Value>>,
}

impl RuntimeCore {
    /// Template for a host type, if one was materialized.
    pub(crate) fn template_by_id(&self, id: TypeId) -> Option<Rc<Template>> {
        self.templates.get(&id).cloned()
    }
}

/// Handle to the live runtime, passed to conversions and injected into host
/// functions that declare a leading `&Ctx` parameter.
#[derive(Clone)]
pub struct Ctx {
    core: Rc<RuntimeCore>,
}

impl Ctx {
    pub(crate) fn new(core: Rc<RuntimeCore>) -> Self {
        Ctx { core }
    }

    pub(crate) fn core(&self) -> &Rc<RuntimeCore> {
        &self.core
    }

    /// Convert a host value to a script value.
    pub fn to_value<T: IntoValue>(&self, value: T) -> Result<Value, ConvertError> {
        value.into_value(self)
    }

    /// Convert a script value to a typed host value.
    pub fn from_value<T: FromValue>(&self, value: &Value) -> Result<T, ConvertError> {
        T::from_value(value, self)
    }

    /// The arguments of the current [`Runtime::run`] call.
    pub fn argv(&self) -> Vec<Value> {
        self.core.argv.borrow().clone()
    }

    /// The materialized global scope.
    pub fn globals(&self) -> ScriptObject {
        self.core.globals.clone()
    }
}

/// An isolated, single-use registration-then-execution context.
pub struct Runtime {
    core: Rc<RuntimeCore>,
    engine: Box<dyn ScriptEngine>,
}

impl Runtime {
    /// Materialize all registrations and produce an execution-ready runtime.
    ///
    /// Unknown field or method names, member selection on descriptor-less
    /// types, unconvertible variables and namespace collisions are contract
    /// violations and abort construction.
    pub fn new(
        builder: RegistryBuilder,
        engine: Box<dyn ScriptEngine>,
    ) -> Result<Runtime, RegistryError> {
        let mut templates: FxHashMap<TypeId, Rc<Template>> = FxHashMap::default();
        let mut converters = ConverterRegistry::default();
        let mut constructors: Vec<(String, String, FunctionGroup)> = Vec::new();

        for reg in builder.types {
            for converter in &reg.converters {
                converters.add(reg.type_id, converter.clone());
            }
            if reg.descriptor.is_none() && !reg.has_members() {
                // Conversion-only type: nothing proxyable to template.
                continue;
            }

            let mut fields: FxHashMap<String, Vec<&'static FieldDef>> = FxHashMap::default();
            let mut exposed_names: FxHashMap<&'static str, String> = FxHashMap::default();
            let mut hide_when_empty: FxHashSet<String> = FxHashSet::default();

            for decl in &reg.fields {
                let descriptor = reg.descriptor.ok_or(RegistryError::NotReflective {
                    type_name: reg.type_name,
                })?;
                let field =
                    descriptor
                        .field(&decl.host)
                        .ok_or_else(|| RegistryError::UnknownField {
                            type_name: reg.type_name,
                            field: decl.host.clone(),
                        })?;
                let exposed = decl
                    .js
                    .clone()
                    .unwrap_or_else(|| camel_case(&decl.host));
                fields.entry(exposed.clone()).or_default().push(field);
                exposed_names.insert(field.name, exposed.clone());
                if field.omit_empty {
                    hide_when_empty.insert(exposed);
                }
            }

            let mut prototype: FxHashMap<String, FunctionGroup> = FxHashMap::default();
            for decl in &reg.methods {
                let descriptor = reg.descriptor.ok_or(RegistryError::NotReflective {
                    type_name: reg.type_name,
                })?;
                let method =
                    descriptor
                        .method(&decl.host)
                        .ok_or_else(|| RegistryError::UnknownMethod {
                            type_name: reg.type_name,
                            method: decl.host.clone(),
                        })?;
                let exposed = decl
                    .js
                    .clone()
                    .unwrap_or_else(|| camel_case(&decl.host));
                prototype
                    .entry(exposed.clone())
                    .or_insert_with(|| FunctionGroup::new(exposed, FnKind::Function))
                    .push(Rc::new((method.build)()));
            }
            for (exposed, func) in reg.extensions {
                prototype
                    .entry(exposed.clone())
                    .or_insert_with(|| FunctionGroup::new(exposed, FnKind::Function))
                    .push(Rc::new(func));
            }
            let prototype: FxHashMap<String, Rc<FunctionGroup>> = prototype
                .into_iter()
                .map(|(name, mut group)| {
                    group.seal();
                    (name, Rc::new(group))
                })
                .collect();

            if !reg.constructors.is_empty() {
                let mut group = FunctionGroup::new(reg.js_name.clone(), FnKind::Constructor);
                for func in reg.constructors {
                    group.push(Rc::new(func));
                }
                group.seal();
                constructors.push((reg.namespace.clone(), reg.js_name.clone(), group));
            }

            let template = Template {
                type_id: reg.type_id,
                type_name: reg.type_name,
                js_name: reg.js_name,
                flags: reg.flags,
                fields,
                exposed_names,
                hide_when_empty,
                prototype,
                accessors: reg.accessors,
                iter: reg.iter,
                create: reg.descriptor.map(|d| d.create),
            };
            templates.insert(reg.type_id, Rc::new(template));
        }

        let mut functions: Vec<(String, String, FunctionGroup)> = Vec::new();
        for freg in builder.functions {
            let exposed = freg
                .js_name
                .unwrap_or_else(|| camel_case(&freg.host_name));
            match functions
                .iter_mut()
                .find(|(ns, name, _)| *ns == freg.namespace && *name == exposed)
            {
                Some((_, _, group)) => group.push(Rc::new(freg.func)),
                None => {
                    let mut group = FunctionGroup::new(exposed.clone(), FnKind::Function);
                    group.push(Rc::new(freg.func));
                    functions.push((freg.namespace, exposed, group));
                }
            }
        }
        for (_, _, group) in &mut functions {
            group.seal();
        }

        let core = Rc::new(RuntimeCore {
            templates,
            converters,
            identity: RefCell::new(IdentityStore::new()),
            globals: ScriptObject::new(),
            argv: RefCell::new(Vec::new()),
        });

        for (namespace, name, group) in constructors.into_iter().chain(functions) {
            let scope = ensure_namespace(&core.globals, &namespace)?;
            scope.set(
                name,
                Value::HostFunction(Rc::new(HostFunction::new(
                    Rc::new(group),
                    None,
                    Rc::downgrade(&core),
                ))),
            );
        }

        let cx = Ctx::new(Rc::clone(&core));
        for var in builder.variables {
            let value = (var.thunk)(&cx).map_err(|source| RegistryError::Variable {
                namespace: var.namespace.clone(),
                name: var.name.clone(),
                source,
            })?;
            let scope = ensure_namespace(&core.globals, &var.namespace)?;
            scope.set(var.name, value);
        }

        Ok(Runtime { core, engine })
    }

    /// Execute a script against the materialized globals.
    ///
    /// `argv` is exposed to the script and to host functions via
    /// [`Ctx::argv`]. Script exceptions come back as
    /// [`ScriptError::Exception`] carrying the script-reported message.
    pub fn run(&mut self, source: &str, argv: &[String]) -> Result<(), ScriptError> {
        let args: Vec<Value> = argv.iter().map(|arg| Value::string(arg)).collect();
        *self.core.argv.borrow_mut() = args.clone();
        let execution = Execution {
            source,
            globals: self.core.globals.clone(),
            argv: args,
        };
        self.engine.eval(&execution).map(|_| ())
    }

    /// The materialized global scope.
    pub fn globals(&self) -> ScriptObject {
        self.core.globals.clone()
    }

    /// A conversion handle over this runtime, for host-side marshalling.
    pub fn ctx(&self) -> Ctx {
        Ctx::new(Rc::clone(&self.core))
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("types", &self.core.templates.len())
            .field("globals", &self.core.globals.len())
            .finish()
    }
}

/// Walk (creating as needed) the nested namespace objects along a
/// dot-separated path. Two paths sharing a prefix share object instances.
fn ensure_namespace(globals: &ScriptObject, path: &str) -> Result<ScriptObject, RegistryError> {
    let mut scope = globals.clone();
    if path.is_empty() {
        return Ok(scope);
    }
    let mut walked = String::new();
    for segment in path.split('.') {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);
        scope = match scope.get(segment) {
            Some(Value::Object(next)) => next,
            Some(_) => {
                return Err(RegistryError::NamespaceCollision {
                    path: walked.clone(),
                })
            }
            None => {
                let next = ScriptObject::new();
                scope.set(segment, Value::Object(next.clone()));
                next
            }
        };
    }
    Ok(scope)
}
