//! Per-target-type conversion overrides.
//!
//! A registration may attach converters to its type; they are consulted by
//! the marshaller after proxy unwrapping and before structural conversion.
//! Converters are tried in registration order: returning `Ok(Some(..))` or
//! `Err(..)` is authoritative, returning `Ok(None)` declines and passes the
//! value to the next converter (and ultimately to structural conversion).
//!
//! The document-model collaborator registers converters here to translate
//! plain script objects directly into its own tree nodes.

use std::any::{Any, TypeId};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::error::ConvertError;
use super::value::Value;
use crate::runtime::Ctx;

/// A type-erased conversion override.
pub(crate) type ConvertOverride =
    Rc<dyn Fn(&Value, &Ctx) -> Result<Option<Box<dyn Any>>, ConvertError>>;

/// All conversion overrides, keyed by target type.
#[derive(Default)]
pub(crate) struct ConverterRegistry {
    overrides: FxHashMap<TypeId, Vec<ConvertOverride>>,
}

impl ConverterRegistry {
    /// Append an override for `target`.
    pub(crate) fn add(&mut self, target: TypeId, converter: ConvertOverride) {
        self.overrides.entry(target).or_default().push(converter);
    }

    /// Run the overrides registered for `target`, in order.
    pub(crate) fn run(
        &self,
        target: TypeId,
        value: &Value,
        cx: &Ctx,
    ) -> Result<Option<Box<dyn Any>>, ConvertError> {
        let Some(list) = self.overrides.get(&target) else {
            return Ok(None);
        };
        for converter in list {
            if let Some(out) = converter(value, cx)? {
                return Ok(Some(out));
            }
        }
        Ok(None)
    }
}

/// Erase a typed converter for storage in the registry.
pub(crate) fn erase_converter<T, F>(converter: F) -> ConvertOverride
where
    T: 'static,
    F: Fn(&Value, &Ctx) -> Result<Option<T>, ConvertError> + 'static,
{
    Rc::new(move |value, cx| {
        Ok(converter(value, cx)?.map(|out| Box::new(out) as Box<dyn Any>))
    })
}
