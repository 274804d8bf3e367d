//! The dynamic binding and marshalling core.
//!
//! This module is the machinery underneath the registration API: it turns
//! registered host types and callables into live script-side values and
//! answers every property access and call that crosses the boundary.
//!
//! - Value model ([`Value`], [`ScriptObject`], [`ScriptArray`], [`ScriptFn`])
//! - Host handles ([`Handle`], [`HostHandle`], [`List`])
//! - The reflection substitute ([`HostType`], [`StructDescriptor`] and the
//!   [`host_type!`](crate::host_type) macro)
//! - The marshaller ([`FromValue`], [`IntoValue`], [`ScriptCallback`])
//! - Live proxies ([`DynamicObject`], [`DynamicArray`])
//! - Function glue and overload dispatch ([`HostFn`], [`IntoHostFn`],
//!   [`FunctionGroup`], [`HostFunction`])
//! - Proxy identity ([`IdentityStore`])
//! - Materialized type metadata ([`Template`], [`TypeFlags`])
//!
//! # Architecture
//!
//! ```text
//! RegistryBuilder (declarations) -> Runtime::new() -> templates + dispatch
//!                                                      |
//!                    engine property access / calls ---+--> proxies, groups
//! ```
//!
//! Everything here is single-threaded by design: the runtime instance is a
//! cooperative, single-use registration-then-execution context.

mod array;
mod convert;
mod dispatch;
mod error;
mod function;
mod handle;
mod identity;
mod marshal;
mod object;
mod reflect;
mod template;
mod value;

pub use array::DynamicArray;
pub use dispatch::{FnKind, FunctionGroup, HostFunction};
pub use error::{ConvertError, OverloadAttempt, RegistryError, ScriptError};
pub use function::{
    HostFn, Injected, IntoHostCtor, IntoHostFn, Rest, RetResult, RetResultUnit, RetUnit, RetVal,
};
pub use handle::{Handle, HostHandle, List, ListElem};
pub use identity::IdentityStore;
pub use marshal::{CallArgs, FromValue, IntoValue, ScriptCallback};
pub use object::DynamicObject;
pub use reflect::{
    AccessorHooks, FieldDef, HostType, IterHook, MethodDef, PropertyAccess, ScriptIterate,
    StructDescriptor,
};
pub use template::{Template, TypeFlags};
pub use value::{ScriptArray, ScriptFn, ScriptObject, Value};

pub(crate) use convert::{erase_converter, ConvertOverride, ConverterRegistry};
pub(crate) use reflect::{accessor_get, accessor_set, iter_next};

/// Render a Rust type name without module paths, for signatures and
/// diagnostics: `core::option::Option<alloc::string::String>` becomes
/// `Option<String>`.
pub(crate) fn display_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' {
            segment.push(c);
        } else if c == ':' {
            segment.clear();
        } else {
            out.push_str(&segment);
            segment.clear();
            out.push(c);
        }
    }
    out.push_str(&segment);
    out
}
