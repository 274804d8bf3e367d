//! Dynamic host-binding runtime for the kubescript manifest DSL.
//!
//! `kubescript` lets a Rust host expose its own types, free functions and
//! methods to an embedded dynamically typed scripting engine, with every
//! value crossing the boundary converted automatically from per-type runtime
//! metadata rather than hand-written glue per call site. It is the substrate
//! the manifest-generation toolchain builds on: the document model, the
//! build pipeline and the CLI all register their APIs here and scripts call
//! them as if they were native objects.
//!
//! # Overview
//!
//! - Declare host types with [`host_type!`], which generates the static
//!   descriptor standing in for reflection.
//! - Accumulate registrations on a [`RegistryBuilder`]: types (fields,
//!   methods, constructors, extension methods, conversion overrides),
//!   free functions, and namespace variables.
//! - Seal the builder with [`Runtime::new`], which materializes templates,
//!   prototypes, overload groups and namespace objects exactly once.
//! - Execute scripts with [`Runtime::run`]; the host-supplied
//!   [`ScriptEngine`] evaluates source against the materialized globals.
//!
//! Host instances cross the boundary behind [`Handle`]s and stay live: a
//! property write from script code lands in host memory, array growth is
//! visible to host reads, and wrapping the same instance twice yields the
//! same proxy object.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Default)]
//! struct Point { x: i64, y: i64 }
//!
//! impl Point {
//!     fn sum(&self) -> i64 { self.x + self.y }
//! }
//!
//! host_type! {
//!     impl Point {
//!         fields { x: i64, y: i64 }
//!         methods { fn sum(&self) -> i64; }
//!     }
//! }
//!
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .register_type::<Point>()
//!     .js_namespace("geometry")
//!     .fields(["x", "y"])
//!     .methods(["sum"])
//!     .constructor(|x: i64, y: i64| Point { x, y });
//!
//! let mut runtime = Runtime::new(builder, engine)?;
//! runtime.run(r#"
//!     const p = new geometry.Point(3, 4);
//!     p.x = 30;
//!     log(p.sum());
//! "#, &[])?;
//! ```

pub mod engine;
pub mod ffi;
pub mod registry;
pub mod runtime;

pub use engine::{Execution, ScriptEngine};
pub use ffi::{
    ConvertError, DynamicArray, DynamicObject, FieldDef, FnKind, FromValue, FunctionGroup, Handle,
    HostFn, HostFunction, HostHandle, HostType, IntoHostCtor, IntoHostFn, IntoValue, List,
    ListElem, MethodDef, OverloadAttempt, PropertyAccess, RegistryError, Rest, ScriptArray,
    ScriptCallback, ScriptError, ScriptFn, ScriptIterate, ScriptObject, StructDescriptor,
    Value,
};
pub use registry::{
    ctor, ext_method, field, method, ConstructorDecl, ExtensionDecl, FieldDecl, FunctionRegistration,
    MethodDecl, RegistryBuilder, TypeBuilder, TypeRegistration,
};
pub use runtime::{Ctx, Runtime};

/// The commonly used surface in one import.
pub mod prelude {
    pub use crate::engine::{Execution, ScriptEngine};
    pub use crate::ffi::{
        ConvertError, DynamicArray, DynamicObject, FromValue, Handle, HostType, IntoValue, List,
        PropertyAccess, RegistryError, Rest, ScriptCallback, ScriptError, ScriptIterate,
        ScriptObject, Value,
    };
    pub use crate::registry::{ctor, ext_method, field, method, RegistryBuilder};
    pub use crate::runtime::{Ctx, Runtime};
}
