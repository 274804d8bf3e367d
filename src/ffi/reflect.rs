//! The reflection substitute: static per-type descriptors.
//!
//! Rust has no runtime introspection, so host types participate in dynamic
//! binding through a [`StructDescriptor`] - a static table of field accessor
//! function pointers and method glue builders generated once by the
//! [`host_type!`](crate::host_type) macro. The registration API selects
//! members from this table by host name; everything downstream (templates,
//! proxies, structural conversion) is driven by the descriptor at run time,
//! the way the original system is driven by reflection.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Default)]
//! pub struct Point {
//!     pub x: i64,
//!     pub y: i64,
//! }
//!
//! impl Point {
//!     pub fn sum(&self) -> i64 {
//!         self.x + self.y
//!     }
//! }
//!
//! host_type! {
//!     impl Point {
//!         fields {
//!             x: i64,
//!             y: i64,
//!         }
//!         methods {
//!             fn sum(&self) -> i64;
//!         }
//!     }
//! }
//! ```

use std::any::Any;

use super::error::ConvertError;
use super::function::HostFn;
use super::handle::HostHandle;
use super::value::Value;
use crate::runtime::Ctx;

/// A host type that can cross the boundary.
///
/// Types with struct shape carry a descriptor (usually generated by
/// [`host_type!`](crate::host_type)); member-less types that only register
/// conversion hooks implement this trait directly and leave the default
/// `None`.
pub trait HostType: Any {
    /// Exposed type name; the script-side default.
    const NAME: &'static str;

    /// Static member table, if this type has struct shape.
    fn descriptor() -> Option<&'static StructDescriptor> {
        None
    }
}

/// Static member table for one host struct type.
pub struct StructDescriptor {
    /// Host type name, for diagnostics.
    pub type_name: &'static str,
    /// Field accessors, in declaration order.
    pub fields: &'static [FieldDef],
    /// Method glue builders, in declaration order.
    pub methods: &'static [MethodDef],
    /// Allocate a default instance, for structural conversion.
    pub create: fn() -> HostHandle,
}

impl StructDescriptor {
    /// Look up a field by host name.
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a method by host name.
    pub fn method(&self, name: &str) -> Option<&'static MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl std::fmt::Debug for StructDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructDescriptor")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// One host field: name, diagnostics metadata, and accessor glue.
pub struct FieldDef {
    /// Host field name.
    pub name: &'static str,
    /// Field type, as written in source.
    pub type_name: &'static str,
    /// Hide from enumeration while the current value is null/undefined.
    pub omit_empty: bool,
    /// Read the field as a script value.
    pub get: fn(&HostHandle, &Ctx) -> Result<Value, ConvertError>,
    /// Convert and write a script value into the field.
    pub set: fn(&HostHandle, &Value, &Ctx) -> Result<(), ConvertError>,
}

impl std::fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("omit_empty", &self.omit_empty)
            .finish()
    }
}

/// One host method: name plus a builder producing its dispatch glue.
pub struct MethodDef {
    /// Host method name.
    pub name: &'static str,
    /// Build the type-erased callable for this method.
    pub build: fn() -> HostFn,
}

impl std::fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDef").field("name", &self.name).finish()
    }
}

/// Custom property access, replacing reflective field lookup.
///
/// A registered type may opt in with
/// [`custom_accessors`](crate::registry::TypeBuilder::custom_accessors); the
/// object proxy then defers to these hooks whenever no mapped field matches a
/// key. The document-model collaborator uses this to translate property
/// traffic into its own tree nodes.
pub trait PropertyAccess: HostType {
    /// Resolve a property, or `None` to fall through.
    fn get_property(&self, key: &str, cx: &Ctx) -> Option<Value>;

    /// Accept a property write, or `false` to fall through.
    fn set_property(&mut self, key: &str, value: Value, cx: &Ctx) -> bool;
}

/// Native iteration support for a registered type.
///
/// Engines drive this through
/// [`DynamicObject::iter_next`](super::object::DynamicObject::iter_next) to
/// implement script iteration syntax over host values.
pub trait ScriptIterate: HostType {
    /// Produce the next element, or `None` when exhausted.
    fn next_value(&mut self, cx: &Ctx) -> Option<Value>;
}

/// Hooks stored on a template for a [`PropertyAccess`] type.
#[derive(Clone, Copy)]
pub struct AccessorHooks {
    pub get: fn(&HostHandle, &str, &Ctx) -> Option<Value>,
    pub set: fn(&HostHandle, &str, &Value, &Ctx) -> bool,
}

/// Hook stored on a template for a [`ScriptIterate`] type.
pub type IterHook = fn(&HostHandle, &Ctx) -> Option<Value>;

/// Monomorphic getter hook for a [`PropertyAccess`] type.
pub(crate) fn accessor_get<T: PropertyAccess>(
    handle: &HostHandle,
    key: &str,
    cx: &Ctx,
) -> Option<Value> {
    let this = handle.downcast::<T>()?;
    let guard = this.try_borrow().ok()?;
    guard.get_property(key, cx)
}

/// Monomorphic setter hook for a [`PropertyAccess`] type.
pub(crate) fn accessor_set<T: PropertyAccess>(
    handle: &HostHandle,
    key: &str,
    value: &Value,
    cx: &Ctx,
) -> bool {
    let Some(this) = handle.downcast::<T>() else {
        return false;
    };
    let Ok(mut guard) = this.try_borrow_mut() else {
        return false;
    };
    guard.set_property(key, value.clone(), cx)
}

/// Monomorphic iteration hook for a [`ScriptIterate`] type.
pub(crate) fn iter_next<T: ScriptIterate>(handle: &HostHandle, cx: &Ctx) -> Option<Value> {
    let this = handle.downcast::<T>()?;
    let mut guard = this.try_borrow_mut().ok()?;
    guard.next_value(cx)
}

/// Generate the [`HostType`] implementation and static descriptor for a host
/// struct.
///
/// The type must implement `Default` (structural conversion allocates a
/// default instance before filling fields) and every listed field type must
/// be `Clone` and marshallable. Methods are forwarded to inherent methods of
/// the type; `&self` and `&mut self` receivers are both supported. A field
/// may be marked `[omit_empty]` to hide it from enumeration while its value
/// is null/undefined.
///
/// ```ignore
/// host_type! {
///     impl Container {
///         fields {
///             name: String,
///             image: String,
///             command: Option<String> [omit_empty],
///         }
///         methods {
///             fn render(&self) -> String;
///             fn set_image(&mut self, image: String);
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! host_type {
    (
        impl $ty:ident {
            fields { $($f:ident : $ft:ty $([$fmark:ident])?),* $(,)? }
            $(methods { $($mtok:tt)* })?
        }
    ) => {
        impl $crate::HostType for $ty {
            const NAME: &'static str = ::core::stringify!($ty);

            fn descriptor() -> ::core::option::Option<&'static $crate::StructDescriptor> {
                static DESCRIPTOR: $crate::StructDescriptor = $crate::StructDescriptor {
                    type_name: ::core::stringify!($ty),
                    fields: &[
                        $($crate::host_type!(@field $ty, $f, $ft $(, $fmark)?),)*
                    ],
                    methods: &$crate::host_type!(@methods $ty [] $($($mtok)*)?),
                    create: || $crate::Handle::new(<$ty as ::core::default::Default>::default()).erase(),
                };
                ::core::option::Option::Some(&DESCRIPTOR)
            }
        }
    };

    (@field $ty:ident, $f:ident, $ft:ty) => {
        $crate::host_type!(@field_def $ty, $f, $ft, false)
    };
    (@field $ty:ident, $f:ident, $ft:ty, omit_empty) => {
        $crate::host_type!(@field_def $ty, $f, $ft, true)
    };
    (@field_def $ty:ident, $f:ident, $ft:ty, $omit:expr) => {
        $crate::FieldDef {
            name: ::core::stringify!($f),
            type_name: ::core::stringify!($ft),
            omit_empty: $omit,
            get: |handle, cx| {
                let this = handle.typed::<$ty>()?;
                let value = {
                    let guard = this.try_borrow().map_err(|_| $crate::ConvertError::Borrowed {
                        type_name: ::core::stringify!($ty),
                    })?;
                    ::core::clone::Clone::clone(&guard.$f)
                };
                $crate::IntoValue::into_value(value, cx)
            },
            set: |handle, value, cx| {
                let this = handle.typed::<$ty>()?;
                let next: $ft = $crate::FromValue::from_value(value, cx)?;
                let mut guard = this.try_borrow_mut().map_err(|_| $crate::ConvertError::Borrowed {
                    type_name: ::core::stringify!($ty),
                })?;
                guard.$f = next;
                ::core::result::Result::Ok(())
            },
        }
    };

    (@methods $ty:ident [$($done:expr),*]) => { [$($done),*] };
    (@methods $ty:ident [$($done:expr),*]
        fn $m:ident(&self $(, $p:ident : $pt:ty)* $(,)?) -> $ret:ty; $($rest:tt)*
    ) => {
        $crate::host_type!(@methods $ty
            [$($done,)* $crate::host_type!(@method_ref $ty, $m, ($($p : $pt),*) -> $ret)]
            $($rest)*)
    };
    (@methods $ty:ident [$($done:expr),*]
        fn $m:ident(&self $(, $p:ident : $pt:ty)* $(,)?); $($rest:tt)*
    ) => {
        $crate::host_type!(@methods $ty
            [$($done,)* $crate::host_type!(@method_ref $ty, $m, ($($p : $pt),*))]
            $($rest)*)
    };
    (@methods $ty:ident [$($done:expr),*]
        fn $m:ident(&mut self $(, $p:ident : $pt:ty)* $(,)?) -> $ret:ty; $($rest:tt)*
    ) => {
        $crate::host_type!(@methods $ty
            [$($done,)* $crate::host_type!(@method_mut $ty, $m, ($($p : $pt),*) -> $ret)]
            $($rest)*)
    };
    (@methods $ty:ident [$($done:expr),*]
        fn $m:ident(&mut self $(, $p:ident : $pt:ty)* $(,)?); $($rest:tt)*
    ) => {
        $crate::host_type!(@methods $ty
            [$($done,)* $crate::host_type!(@method_mut $ty, $m, ($($p : $pt),*))]
            $($rest)*)
    };

    (@method_ref $ty:ident, $m:ident, ($($p:ident : $pt:ty),*) -> $ret:ty) => {
        $crate::MethodDef {
            name: ::core::stringify!($m),
            build: || $crate::HostFn::method(
                ::core::stringify!($m),
                |this: $crate::Handle<$ty> $(, $p : $pt)*| -> ::core::result::Result<$ret, $crate::ScriptError> {
                    let guard = this.try_borrow().map_err(|_| $crate::ConvertError::Borrowed {
                        type_name: ::core::stringify!($ty),
                    })?;
                    ::core::result::Result::Ok(<$ty>::$m(&*guard $(, $p)*))
                },
            ),
        }
    };
    (@method_ref $ty:ident, $m:ident, ($($p:ident : $pt:ty),*)) => {
        $crate::MethodDef {
            name: ::core::stringify!($m),
            build: || $crate::HostFn::method(
                ::core::stringify!($m),
                |this: $crate::Handle<$ty> $(, $p : $pt)*| -> ::core::result::Result<(), $crate::ScriptError> {
                    let guard = this.try_borrow().map_err(|_| $crate::ConvertError::Borrowed {
                        type_name: ::core::stringify!($ty),
                    })?;
                    <$ty>::$m(&*guard $(, $p)*);
                    ::core::result::Result::Ok(())
                },
            ),
        }
    };
    (@method_mut $ty:ident, $m:ident, ($($p:ident : $pt:ty),*) -> $ret:ty) => {
        $crate::MethodDef {
            name: ::core::stringify!($m),
            build: || $crate::HostFn::method(
                ::core::stringify!($m),
                |this: $crate::Handle<$ty> $(, $p : $pt)*| -> ::core::result::Result<$ret, $crate::ScriptError> {
                    let mut guard = this.try_borrow_mut().map_err(|_| $crate::ConvertError::Borrowed {
                        type_name: ::core::stringify!($ty),
                    })?;
                    ::core::result::Result::Ok(<$ty>::$m(&mut *guard $(, $p)*))
                },
            ),
        }
    };
    (@method_mut $ty:ident, $m:ident, ($($p:ident : $pt:ty),*)) => {
        $crate::MethodDef {
            name: ::core::stringify!($m),
            build: || $crate::HostFn::method(
                ::core::stringify!($m),
                |this: $crate::Handle<$ty> $(, $p : $pt)*| -> ::core::result::Result<(), $crate::ScriptError> {
                    let mut guard = this.try_borrow_mut().map_err(|_| $crate::ConvertError::Borrowed {
                        type_name: ::core::stringify!($ty),
                    })?;
                    <$ty>::$m(&mut *guard $(, $p)*);
                    ::core::result::Result::Ok(())
                },
            ),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::handle::Handle;

    #[derive(Default)]
    struct Bare;

    impl HostType for Bare {
        const NAME: &'static str = "Bare";
    }

    #[derive(Default)]
    struct Point {
        x: i64,
        y: i64,
        label: Option<String>,
    }

    impl Point {
        fn sum(&self) -> i64 {
            self.x + self.y
        }

        fn translate(&mut self, dx: i64, dy: i64) {
            self.x += dx;
            self.y += dy;
        }
    }

    host_type! {
        impl Point {
            fields {
                x: i64,
                y: i64,
                label: Option<String> [omit_empty],
            }
            methods {
                fn sum(&self) -> i64;
                fn translate(&mut self, dx: i64, dy: i64);
            }
        }
    }

    #[test]
    fn bare_type_has_no_descriptor() {
        assert!(Bare::descriptor().is_none());
        assert_eq!(Bare::NAME, "Bare");
    }

    #[test]
    fn descriptor_lists_fields_in_order() {
        let desc = Point::descriptor().unwrap();
        assert_eq!(desc.type_name, "Point");
        let names: Vec<_> = desc.fields.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["x", "y", "label"]);
    }

    #[test]
    fn descriptor_field_lookup() {
        let desc = Point::descriptor().unwrap();
        let x = desc.field("x").unwrap();
        assert_eq!(x.type_name, "i64");
        assert!(!x.omit_empty);
        let label = desc.field("label").unwrap();
        assert!(label.omit_empty);
        assert!(desc.field("z").is_none());
    }

    #[test]
    fn descriptor_method_lookup() {
        let desc = Point::descriptor().unwrap();
        assert!(desc.method("sum").is_some());
        assert!(desc.method("translate").is_some());
        assert!(desc.method("missing").is_none());
    }

    #[test]
    fn create_allocates_default_instance() {
        let desc = Point::descriptor().unwrap();
        let handle = (desc.create)();
        let point = handle.downcast::<Point>().unwrap();
        assert_eq!(point.borrow().sum(), 0);
    }

    #[test]
    fn method_builders_report_arity() {
        let desc = Point::descriptor().unwrap();
        let sum = (desc.method("sum").unwrap().build)();
        assert_eq!(sum.arity(), 0);
        let translate = (desc.method("translate").unwrap().build)();
        assert_eq!(translate.arity(), 2);
    }

    #[test]
    fn inherent_methods_still_callable() {
        let p = Handle::new(Point {
            x: 3,
            y: 4,
            label: None,
        });
        assert_eq!(p.borrow().sum(), 7);
    }
}
