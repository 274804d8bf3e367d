//! The live array proxy.
//!
//! A [`DynamicArray`] exposes one host list to script code by reference:
//! indexed reads and writes operate on the backing vector itself, so both
//! sides observe every mutation. Reads past the end yield `undefined`;
//! plain writes past the end are rejected. Growth happens through [`push`]
//! (the runtime's own append semantics, used by engines to implement script
//! array growth) or an explicit [`set_length`].
//!
//! [`push`]: DynamicArray::push
//! [`set_length`]: DynamicArray::set_length

use std::rc::{Rc, Weak};

use super::error::ScriptError;
use super::handle::ListAccess;
use super::value::Value;
use crate::runtime::{Ctx, RuntimeCore};

/// Live proxy over one host list.
pub struct DynamicArray {
    core: Weak<RuntimeCore>,
    target: Rc<dyn ListAccess>,
}

impl DynamicArray {
    pub(crate) fn new(core: Weak<RuntimeCore>, target: Rc<dyn ListAccess>) -> Self {
        DynamicArray { core, target }
    }

    pub(crate) fn target(&self) -> &Rc<dyn ListAccess> {
        &self.target
    }

    fn ctx(&self) -> Result<Ctx, ScriptError> {
        let core = self.core.upgrade().ok_or(ScriptError::RuntimeGone)?;
        Ok(Ctx::new(core))
    }

    /// Current length of the backing list.
    pub fn len(&self) -> usize {
        self.target.len()
    }

    /// True when the backing list is empty.
    pub fn is_empty(&self) -> bool {
        self.target.len() == 0
    }

    /// Element type name, for diagnostics.
    pub fn elem_type_name(&self) -> String {
        self.target.elem_type_name()
    }

    /// Element at `index`, or `undefined` past the end.
    pub fn get(&self, index: usize) -> Result<Value, ScriptError> {
        let cx = self.ctx()?;
        self.target.get(index, &cx).map_err(ScriptError::from)
    }

    /// Convert and store at `index`; rejected past the current length.
    pub fn set(&self, index: usize, value: &Value) -> Result<(), ScriptError> {
        let len = self.target.len();
        if index >= len {
            return Err(ScriptError::IndexOutOfBounds { index, len });
        }
        let cx = self.ctx()?;
        self.target.set(index, value, &cx).map_err(ScriptError::from)
    }

    /// Append a value, growing the backing list by one.
    ///
    /// This is the write path engines use for script-side array growth;
    /// allocation doubling is the backing vector's concern.
    pub fn push(&self, value: &Value) -> Result<(), ScriptError> {
        let cx = self.ctx()?;
        self.target.push(value, &cx).map_err(ScriptError::from)
    }

    /// Resize the backing list, filling new slots with the element type's
    /// zero value. Negative lengths are rejected.
    pub fn set_length(&self, len: i64) -> Result<(), ScriptError> {
        if len < 0 {
            return Err(ScriptError::InvalidLength { len });
        }
        self.target.resize(len as usize);
        Ok(())
    }

    /// Snapshot of the current elements as script values.
    pub fn values(&self) -> Result<Vec<Value>, ScriptError> {
        let cx = self.ctx()?;
        let mut out = Vec::with_capacity(self.target.len());
        for index in 0..self.target.len() {
            out.push(self.target.get(index, &cx)?);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DynamicArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicArray")
            .field("len", &self.target.len())
            .field("elem", &self.target.elem_type_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NullEngine;
    use crate::ffi::handle::List;
    use crate::registry::RegistryBuilder;
    use crate::runtime::Runtime;

    fn setup(list: &List<i64>) -> (Runtime, DynamicArray) {
        let rt = Runtime::new(RegistryBuilder::new(), Box::new(NullEngine)).unwrap();
        let core = Rc::clone(rt.ctx().core());
        let proxy = DynamicArray::new(Rc::downgrade(&core), list.erase());
        (rt, proxy)
    }

    #[test]
    fn get_is_bounds_checked_to_undefined() {
        let list: List<i64> = List::from_vec(vec![10, 20]);
        let (_rt, proxy) = setup(&list);
        assert_eq!(proxy.get(0).unwrap(), Value::Int(10));
        assert_eq!(proxy.get(2).unwrap(), Value::Undefined);
    }

    #[test]
    fn set_writes_through_to_the_backing_list() {
        let list: List<i64> = List::from_vec(vec![1, 2]);
        let (_rt, proxy) = setup(&list);
        proxy.set(1, &Value::Int(9)).unwrap();
        assert_eq!(list.get(1), Some(9));
    }

    #[test]
    fn set_past_the_end_is_rejected() {
        let list: List<i64> = List::from_vec(vec![1]);
        let (_rt, proxy) = setup(&list);
        assert!(matches!(
            proxy.set(1, &Value::Int(9)),
            Err(ScriptError::IndexOutOfBounds { index: 1, len: 1 })
        ));
    }

    #[test]
    fn push_grows_from_empty_one_element_at_a_time() {
        let list: List<i64> = List::new();
        let (_rt, proxy) = setup(&list);

        proxy.push(&Value::Int(7)).unwrap();
        assert_eq!(proxy.len(), 1);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0), Some(7));

        proxy.push(&Value::Int(8)).unwrap();
        assert_eq!(proxy.len(), 2);
        assert_eq!(list.get(1), Some(8));
    }

    #[test]
    fn push_rejects_unconvertible_elements() {
        let list: List<i64> = List::new();
        let (_rt, proxy) = setup(&list);
        assert!(proxy.push(&Value::string("nope")).is_err());
        assert!(list.is_empty());
    }

    #[test]
    fn set_length_resizes_with_zero_values() {
        let list: List<i64> = List::from_vec(vec![5]);
        let (_rt, proxy) = setup(&list);
        proxy.set_length(3).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(2), Some(0));

        proxy.set_length(1).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0), Some(5));
    }

    #[test]
    fn set_length_rejects_negative_lengths() {
        let list: List<i64> = List::new();
        let (_rt, proxy) = setup(&list);
        assert!(matches!(
            proxy.set_length(-1),
            Err(ScriptError::InvalidLength { len: -1 })
        ));
    }

    #[test]
    fn values_snapshots_current_elements() {
        let list: List<i64> = List::from_vec(vec![1, 2, 3]);
        let (_rt, proxy) = setup(&list);
        assert_eq!(
            proxy.values().unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }
}
