//! Bidirectional value conversion between script and host.
//!
//! [`FromValue`] converts script values into typed host data; [`IntoValue`]
//! converts host data back into script values. Conversions are driven by the
//! target type, with the same precedence the original system applies:
//!
//! 1. a proxy already wrapping a compatible host value is unwrapped directly,
//! 2. registered conversion overrides run next and are authoritative,
//! 3. structural conversion (object -> struct through the owning template,
//!    object -> map over own enumerable keys) is the fallback.
//!
//! Host -> script, lists become live [`DynamicArray`]s, templated structs
//! become identity-deduplicated [`DynamicObject`]s, handles without a
//! template cross as opaque externals, and everything else maps to a native
//! primitive.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::array::DynamicArray;
use super::error::{ConvertError, ScriptError};
use super::handle::{downcast_list, Handle, HostHandle, List, ListAccess, ListElem};
use super::object::DynamicObject;
use super::reflect::HostType;
use super::template::{Template, TypeFlags};
use super::value::{ScriptArray, ScriptObject, Value};
use crate::ffi::display_type_name;
use crate::runtime::Ctx;

/// Conversion from a script value to a typed host value.
pub trait FromValue: Sized {
    /// Convert `value`, consulting runtime metadata through `cx`.
    fn from_value(value: &Value, cx: &Ctx) -> Result<Self, ConvertError>;
}

/// Conversion from a typed host value to a script value.
pub trait IntoValue {
    /// Convert `self`, consulting runtime metadata through `cx`.
    fn into_value(self, cx: &Ctx) -> Result<Value, ConvertError>;
}

// =============================================================================
// Primitives
// =============================================================================

impl FromValue for bool {
    fn from_value(value: &Value, _cx: &Ctx) -> Result<Self, ConvertError> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => Err(ConvertError::mismatch("bool", other.kind_name())),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(Value::Bool(self))
    }
}

/// Read a script number as `i64`, accepting floats with no fractional part.
fn int_from(value: &Value, target: &'static str) -> Result<i64, ConvertError> {
    match value {
        Value::Int(v) => Ok(*v),
        Value::Float(f) => {
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                Ok(*f as i64)
            } else {
                Err(ConvertError::FractionalInteger { value: *f, target })
            }
        }
        other => Err(ConvertError::mismatch(target, other.kind_name())),
    }
}

macro_rules! impl_int_marshal {
    ($($ty:ty => $label:literal),+ $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value, _cx: &Ctx) -> Result<Self, ConvertError> {
                    let raw = int_from(value, $label)?;
                    <$ty>::try_from(raw).map_err(|_| ConvertError::IntegerOverflow {
                        value: raw,
                        target: $label,
                    })
                }
            }

            impl IntoValue for $ty {
                fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
                    Ok(Value::Int(self as i64))
                }
            }
        )+
    };
}

impl_int_marshal! {
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
}

impl FromValue for i64 {
    fn from_value(value: &Value, _cx: &Ctx) -> Result<Self, ConvertError> {
        int_from(value, "i64")
    }
}

impl IntoValue for i64 {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(Value::Int(self))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value, _cx: &Ctx) -> Result<Self, ConvertError> {
        let raw = int_from(value, "u64")?;
        u64::try_from(raw).map_err(|_| ConvertError::IntegerOverflow {
            value: raw,
            target: "u64",
        })
    }
}

impl IntoValue for u64 {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        // Note: values above i64::MAX wrap; script numbers are 64-bit signed.
        Ok(Value::Int(self as i64))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value, _cx: &Ctx) -> Result<Self, ConvertError> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(ConvertError::mismatch("f64", other.kind_name())),
        }
    }
}

impl IntoValue for f64 {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(Value::Float(self))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value, cx: &Ctx) -> Result<Self, ConvertError> {
        f64::from_value(value, cx).map(|v| v as f32)
    }
}

impl IntoValue for f32 {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(Value::Float(self as f64))
    }
}

impl FromValue for String {
    fn from_value(value: &Value, _cx: &Ctx) -> Result<Self, ConvertError> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            other => Err(ConvertError::mismatch("String", other.kind_name())),
        }
    }
}

impl IntoValue for String {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(Value::String(Rc::from(self)))
    }
}

impl IntoValue for &str {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(Value::string(self))
    }
}

// =============================================================================
// Interface pass-through
// =============================================================================

/// The interface-kind target: any script value rides along unchanged, which
/// preserves raw script values as opaque handles for later re-conversion.
impl FromValue for Value {
    fn from_value(value: &Value, _cx: &Ctx) -> Result<Self, ConvertError> {
        Ok(value.clone())
    }
}

impl IntoValue for Value {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(self)
    }
}

impl FromValue for ScriptObject {
    fn from_value(value: &Value, _cx: &Ctx) -> Result<Self, ConvertError> {
        match value {
            Value::Object(obj) => Ok(obj.clone()),
            other => Err(ConvertError::mismatch("object", other.kind_name())),
        }
    }
}

impl IntoValue for ScriptObject {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(Value::Object(self))
    }
}

impl IntoValue for ScriptArray {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(Value::Array(self))
    }
}

// =============================================================================
// Pointers
// =============================================================================

/// The pointer-kind target: `null`/`undefined` become the zero value `None`,
/// anything else recurses into the pointee type.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value, cx: &Ctx) -> Result<Self, ConvertError> {
        if value.is_nullish() {
            Ok(None)
        } else {
            T::from_value(value, cx).map(Some)
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self, cx: &Ctx) -> Result<Value, ConvertError> {
        match self {
            Some(inner) => inner.into_value(cx),
            None => Ok(Value::Null),
        }
    }
}

// =============================================================================
// Struct handles
// =============================================================================

impl<T: HostType> FromValue for Handle<T> {
    fn from_value(value: &Value, cx: &Ctx) -> Result<Self, ConvertError> {
        if value.is_nullish() {
            return Err(ConvertError::NullTarget {
                target: T::NAME.to_string(),
            });
        }

        // Unwrap a proxy or external already holding a compatible instance.
        match value {
            Value::HostObject(proxy) => {
                if let Some(handle) = proxy.target().downcast::<T>() {
                    return Ok(handle);
                }
            }
            Value::External(handle) => {
                if let Some(handle) = handle.downcast::<T>() {
                    return Ok(handle);
                }
            }
            _ => {}
        }

        // Registered conversion overrides are authoritative.
        if let Some(raw) = cx.core().converters.run(TypeId::of::<T>(), value, cx)? {
            let boxed = raw
                .downcast::<T>()
                .map_err(|_| ConvertError::BadOverride { type_name: T::NAME })?;
            return Ok(Handle::new(*boxed));
        }

        // Structural conversion from a plain script object.
        if let Value::Object(source) = value {
            if let Some(template) = cx.core().template_by_id(TypeId::of::<T>()) {
                if template.flags.contains(TypeFlags::DISABLE_OBJECT_MAPPING) {
                    return Err(ConvertError::MappingDisabled { type_name: T::NAME });
                }
                if template.create.is_some() {
                    let handle = struct_from_object(cx, &template, source)?;
                    if let Some(typed) = handle.downcast::<T>() {
                        return Ok(typed);
                    }
                }
            }
        }

        Err(ConvertError::mismatch(T::NAME, value.kind_name()))
    }
}

impl<T: HostType> IntoValue for Handle<T> {
    fn into_value(self, cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(wrap_handle(cx, self.erase()))
    }
}

// =============================================================================
// Lists
// =============================================================================

impl<T: ListElem> FromValue for List<T> {
    fn from_value(value: &Value, cx: &Ctx) -> Result<Self, ConvertError> {
        let expected = || format!("list of {}", display_type_name::<T>());
        match value {
            // The zero value for a slice target.
            Value::Null | Value::Undefined => Ok(List::new()),
            // Unwrap a live proxy over a matching element type.
            Value::HostArray(proxy) => downcast_list::<T>(proxy.target()).ok_or_else(|| {
                ConvertError::mismatch(
                    expected(),
                    format!("list of {}", proxy.target().elem_type_name()),
                )
            }),
            // Copy out of an engine-native array, element by element.
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.borrow().iter().enumerate() {
                    let elem = T::from_value(item, cx)
                        .map_err(|e| ConvertError::failed(format!("element {index}: {e}")))?;
                    out.push(elem);
                }
                Ok(List::from_vec(out))
            }
            other => Err(ConvertError::mismatch(expected(), other.kind_name())),
        }
    }
}

impl<T: ListElem> IntoValue for List<T> {
    fn into_value(self, cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(wrap_list(cx, self.erase()))
    }
}

// =============================================================================
// Maps
// =============================================================================

/// The map-kind target reads the script object's own enumerable keys.
impl<V: FromValue> FromValue for BTreeMap<String, V> {
    fn from_value(value: &Value, cx: &Ctx) -> Result<Self, ConvertError> {
        match value {
            Value::Object(obj) => {
                let mut out = BTreeMap::new();
                for (key, item) in obj.entries() {
                    let converted = V::from_value(&item, cx).map_err(|e| {
                        ConvertError::failed(format!("key \"{key}\": {e}"))
                    })?;
                    out.insert(key, converted);
                }
                Ok(out)
            }
            other => Err(ConvertError::mismatch("object", other.kind_name())),
        }
    }
}

impl<V: IntoValue> IntoValue for BTreeMap<String, V> {
    fn into_value(self, cx: &Ctx) -> Result<Value, ConvertError> {
        let out = ScriptObject::new();
        for (key, item) in self {
            out.set(key, item.into_value(cx)?);
        }
        Ok(Value::Object(out))
    }
}

// =============================================================================
// Script callbacks (function-kind targets)
// =============================================================================

/// A script callable converted into a host-invokable adapter.
///
/// Typed calls convert host arguments to script values (optionally flattening
/// a variadic tail), invoke the callable, and convert the result back. A
/// script exception surfaces as the `Err` arm; if it wraps a host error, the
/// original can be recovered with [`ScriptError::downcast_host`].
#[derive(Clone)]
pub struct ScriptCallback {
    target: Value,
    core: std::rc::Weak<crate::runtime::RuntimeCore>,
}

impl ScriptCallback {
    fn cx(&self) -> Result<Ctx, ScriptError> {
        let core = self.core.upgrade().ok_or(ScriptError::RuntimeGone)?;
        Ok(Ctx::new(core))
    }

    /// Invoke with raw script values.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, ScriptError> {
        match &self.target {
            Value::Function(f) => f.call(args),
            Value::HostFunction(f) => f.call(args),
            other => Err(ScriptError::exception(format!(
                "{} is not callable",
                other.kind_name()
            ))),
        }
    }

    /// Invoke with typed arguments and a typed result.
    pub fn call<A: CallArgs, R: FromValue>(&self, args: A) -> Result<R, ScriptError> {
        let cx = self.cx()?;
        let values = args.into_values(&cx)?;
        let out = self.invoke(&values)?;
        R::from_value(&out, &cx).map_err(ScriptError::from)
    }

    /// Invoke with typed arguments plus a variadic tail, flattened into
    /// individual call arguments.
    pub fn call_spread<A: CallArgs, T: IntoValue + Clone, R: FromValue>(
        &self,
        args: A,
        tail: &[T],
    ) -> Result<R, ScriptError> {
        let cx = self.cx()?;
        let mut values = args.into_values(&cx)?;
        for item in tail {
            values.push(item.clone().into_value(&cx)?);
        }
        let out = self.invoke(&values)?;
        R::from_value(&out, &cx).map_err(ScriptError::from)
    }

    /// The underlying script value.
    pub fn as_value(&self) -> &Value {
        &self.target
    }
}

impl FromValue for ScriptCallback {
    fn from_value(value: &Value, cx: &Ctx) -> Result<Self, ConvertError> {
        match value {
            Value::Function(_) | Value::HostFunction(_) => Ok(ScriptCallback {
                target: value.clone(),
                core: Rc::downgrade(cx.core()),
            }),
            other => Err(ConvertError::mismatch("function", other.kind_name())),
        }
    }
}

impl IntoValue for ScriptCallback {
    fn into_value(self, _cx: &Ctx) -> Result<Value, ConvertError> {
        Ok(self.target)
    }
}

/// Tuples of typed arguments for [`ScriptCallback`] calls.
pub trait CallArgs {
    fn into_values(self, cx: &Ctx) -> Result<Vec<Value>, ConvertError>;
}

macro_rules! impl_call_args {
    ($(($($T:ident),*))+) => {
        $(
            #[allow(non_snake_case)]
            impl<$($T: IntoValue),*> CallArgs for ($($T,)*) {
                fn into_values(self, cx: &Ctx) -> Result<Vec<Value>, ConvertError> {
                    let ($($T,)*) = self;
                    Ok(vec![$($T.into_value(cx)?),*])
                }
            }
        )+
    };
}

impl_call_args! {
    ()
    (T1)
    (T1, T2)
    (T1, T2, T3)
    (T1, T2, T3, T4)
}

// =============================================================================
// Host -> script wrapping
// =============================================================================

/// Wrap a host handle for the script side.
///
/// Templated types become identity-deduplicated live proxies; a handle whose
/// type has no template crosses as an opaque external.
pub(crate) fn wrap_handle(cx: &Ctx, handle: HostHandle) -> Value {
    let core = cx.core();
    match core.template_by_id(handle.type_id()) {
        Some(template) => {
            let key = handle.key();
            let mut identity = core.identity.borrow_mut();
            if let Some(existing) = identity.load_object(key) {
                return Value::HostObject(existing);
            }
            let proxy = DynamicObject::new(Rc::downgrade(core), template, handle);
            identity.store_object(key, &proxy);
            Value::HostObject(proxy)
        }
        None => Value::External(handle),
    }
}

/// Wrap a host list as a live, identity-deduplicated array proxy.
pub(crate) fn wrap_list(cx: &Ctx, list: Rc<dyn ListAccess>) -> Value {
    let core = cx.core();
    let key = Rc::as_ptr(&list) as *const () as usize;
    let mut identity = core.identity.borrow_mut();
    if let Some(existing) = identity.load_array(key) {
        return Value::HostArray(existing);
    }
    let proxy = Rc::new(DynamicArray::new(Rc::downgrade(core), list));
    identity.store_array(key, &proxy);
    Value::HostArray(proxy)
}

// =============================================================================
// Structural object -> struct conversion
// =============================================================================

/// Fill a freshly created host struct from a script object's properties.
///
/// Properties translate through the template's exposed-name mapping; every
/// host field sharing an exposed name is attempted in declaration order, and
/// the write succeeds if any of them accepts the value. Only when every
/// attempt for a name fails does the aggregated error surface.
pub(crate) fn struct_from_object(
    cx: &Ctx,
    template: &Template,
    source: &ScriptObject,
) -> Result<HostHandle, ConvertError> {
    let create = template.create.ok_or(ConvertError::MappingDisabled {
        type_name: template.type_name,
    })?;
    let handle = create();

    for exposed in template.exposed_field_names() {
        let Some(value) = source.get(&exposed) else {
            continue;
        };
        if matches!(value, Value::Undefined) {
            continue;
        }
        let Some(group) = template.field_group(&exposed) else {
            continue;
        };

        let mut reasons: Vec<String> = Vec::new();
        let mut written = false;
        for field in group {
            match (field.set)(&handle, &value, cx) {
                Ok(()) => {
                    written = true;
                    break;
                }
                Err(err) => reasons.push(err.to_string()),
            }
        }
        if !written {
            return Err(ConvertError::Field {
                type_name: template.type_name,
                name: exposed,
                detail: reasons.join("; "),
            });
        }
    }

    Ok(handle)
}
