//! Shared handles to host memory.
//!
//! Host instances cross the boundary behind [`Handle`], a shared mutable
//! pointer: the proxy layer and the host observe one allocation, which is
//! what makes property writes from script code visible to host reads without
//! copying. [`HostHandle`] is the type-erased form carried by proxies and
//! opaque externals; [`List`] is the slice analog, erased behind
//! [`ListAccess`] so dynamically typed code can drive a typed vector.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::error::ConvertError;
use super::marshal::{FromValue, IntoValue};
use super::reflect::HostType;
use super::value::Value;
use crate::runtime::Ctx;

/// Shared mutable pointer to one host instance.
pub struct Handle<T: HostType>(Rc<RefCell<T>>);

impl<T: HostType> Handle<T> {
    /// Allocate a new host instance.
    pub fn new(value: T) -> Self {
        Handle(Rc::new(RefCell::new(value)))
    }

    /// Immutably borrow the instance.
    ///
    /// # Panics
    ///
    /// Panics if the instance is mutably borrowed. Generated glue uses
    /// [`RefCell::try_borrow`] instead and reports reentrancy as an error.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// Mutably borrow the instance.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Fallible immutable borrow.
    pub fn try_borrow(&self) -> Result<Ref<'_, T>, std::cell::BorrowError> {
        self.0.try_borrow()
    }

    /// Fallible mutable borrow.
    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>, std::cell::BorrowMutError> {
        self.0.try_borrow_mut()
    }

    /// Identity comparison: true when both handles point at one allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Erase the static type, keeping identity and runtime type metadata.
    pub fn erase(&self) -> HostHandle {
        HostHandle {
            cell: self.0.clone(),
            type_id: TypeId::of::<T>(),
            type_name: T::NAME,
        }
    }
}

impl<T: HostType> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Handle(self.0.clone())
    }
}

impl<T: HostType + fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:?})", self.0.borrow())
    }
}

impl<T: HostType + Default> Default for Handle<T> {
    fn default() -> Self {
        Handle::new(T::default())
    }
}

/// Type-erased [`Handle`].
#[derive(Clone)]
pub struct HostHandle {
    cell: Rc<dyn Any>,
    type_id: TypeId,
    type_name: &'static str,
}

impl HostHandle {
    /// `TypeId` of the wrapped host type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Registered name of the wrapped host type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Allocation address, the identity key for proxy deduplication.
    pub fn key(&self) -> usize {
        Rc::as_ptr(&self.cell) as *const () as usize
    }

    /// True when this handle wraps a `T`.
    pub fn is<T: HostType>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Recover the typed handle, if the types match.
    pub fn downcast<T: HostType>(&self) -> Option<Handle<T>> {
        Rc::downcast::<RefCell<T>>(self.cell.clone()).ok().map(Handle)
    }

    /// Recover the typed handle or report a conversion mismatch.
    pub fn typed<T: HostType>(&self) -> Result<Handle<T>, ConvertError> {
        self.downcast::<T>()
            .ok_or_else(|| ConvertError::mismatch(T::NAME, self.type_name))
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("type_name", &self.type_name)
            .field("key", &self.key())
            .finish()
    }
}

/// Bound required of list element types.
///
/// `Default` supplies the zero value used when a list is grown; pointer-like
/// elements are therefore spelled `Option<Handle<T>>`, mirroring a slice of
/// host pointers.
pub trait ListElem: FromValue + IntoValue + Default + Clone + 'static {}

impl<T: FromValue + IntoValue + Default + Clone + 'static> ListElem for T {}

/// Shared growable host list.
///
/// The backing vector is shared between every clone, the owning struct field,
/// and any live [`DynamicArray`](super::array::DynamicArray) proxy, so
/// script-side writes and growth are visible to host reads.
pub struct List<T: ListElem>(Rc<ListStore<T>>);

impl<T: ListElem> List<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        List(Rc::new(ListStore {
            items: RefCell::new(Vec::new()),
        }))
    }

    /// Build from existing elements.
    pub fn from_vec(items: Vec<T>) -> Self {
        List(Rc::new(ListStore {
            items: RefCell::new(items),
        }))
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    /// Clone of the element at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.0.items.borrow().get(index).cloned()
    }

    /// Replace the element at `index`; ignored past the end.
    pub fn set(&self, index: usize, value: T) {
        let mut items = self.0.items.borrow_mut();
        if let Some(slot) = items.get_mut(index) {
            *slot = value;
        }
    }

    /// Append an element.
    pub fn push(&self, value: T) {
        self.0.items.borrow_mut().push(value);
    }

    /// Borrow the backing vector.
    pub fn borrow(&self) -> Ref<'_, Vec<T>> {
        self.0.items.borrow()
    }

    /// Mutably borrow the backing vector.
    pub fn borrow_mut(&self) -> RefMut<'_, Vec<T>> {
        self.0.items.borrow_mut()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Erase the element type for dynamically typed access.
    pub(crate) fn erase(&self) -> Rc<dyn ListAccess> {
        self.0.clone()
    }
}

impl<T: ListElem> Clone for List<T> {
    fn clone(&self) -> Self {
        List(self.0.clone())
    }
}

impl<T: ListElem> Default for List<T> {
    fn default() -> Self {
        List::new()
    }
}

impl<T: ListElem + fmt::Debug> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.items.borrow().iter()).finish()
    }
}

impl<T: ListElem> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        List::from_vec(iter.into_iter().collect())
    }
}

struct ListStore<T> {
    items: RefCell<Vec<T>>,
}

/// Dynamically typed access to a host list.
///
/// Implemented by the typed backing store; the array proxy drives it without
/// knowing the element type.
pub(crate) trait ListAccess: Any {
    fn len(&self) -> usize;
    fn get(&self, index: usize, cx: &Ctx) -> Result<Value, ConvertError>;
    fn set(&self, index: usize, value: &Value, cx: &Ctx) -> Result<(), ConvertError>;
    fn push(&self, value: &Value, cx: &Ctx) -> Result<(), ConvertError>;
    fn resize(&self, len: usize);
    fn elem_type_name(&self) -> String;
    fn as_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: ListElem> ListAccess for ListStore<T> {
    fn len(&self) -> usize {
        self.items.borrow().len()
    }

    fn get(&self, index: usize, cx: &Ctx) -> Result<Value, ConvertError> {
        match self.items.borrow().get(index).cloned() {
            Some(elem) => elem.into_value(cx),
            None => Ok(Value::Undefined),
        }
    }

    fn set(&self, index: usize, value: &Value, cx: &Ctx) -> Result<(), ConvertError> {
        let elem = T::from_value(value, cx)?;
        let mut items = self.items.borrow_mut();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = elem;
                Ok(())
            }
            None => Err(ConvertError::failed(format!(
                "index {index} is out of bounds (length {})",
                items.len()
            ))),
        }
    }

    fn push(&self, value: &Value, cx: &Ctx) -> Result<(), ConvertError> {
        let elem = T::from_value(value, cx)?;
        self.items.borrow_mut().push(elem);
        Ok(())
    }

    fn resize(&self, len: usize) {
        self.items.borrow_mut().resize_with(len, T::default);
    }

    fn elem_type_name(&self) -> String {
        crate::ffi::display_type_name::<T>()
    }

    fn as_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Recover a typed list from its erased form.
pub(crate) fn downcast_list<T: ListElem>(erased: &Rc<dyn ListAccess>) -> Option<List<T>> {
    erased
        .clone()
        .as_any()
        .downcast::<ListStore<T>>()
        .ok()
        .map(List)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Widget {
        size: i64,
    }

    impl HostType for Widget {
        const NAME: &'static str = "Widget";
    }

    #[test]
    fn handle_shares_one_allocation() {
        let a = Handle::new(Widget { size: 1 });
        let b = a.clone();
        b.borrow_mut().size = 7;
        assert_eq!(a.borrow().size, 7);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn handle_identity_differs_per_allocation() {
        let a = Handle::new(Widget { size: 1 });
        let b = Handle::new(Widget { size: 1 });
        assert!(!a.ptr_eq(&b));
        assert_ne!(a.erase().key(), b.erase().key());
    }

    #[test]
    fn erased_handle_downcasts_back() {
        let a = Handle::new(Widget { size: 3 });
        let erased = a.erase();
        assert!(erased.is::<Widget>());
        assert_eq!(erased.type_name(), "Widget");
        let back = erased.downcast::<Widget>().unwrap();
        assert!(a.ptr_eq(&back));
    }

    #[test]
    fn erased_handle_rejects_wrong_type() {
        #[derive(Default)]
        struct Other;
        impl HostType for Other {
            const NAME: &'static str = "Other";
        }

        let erased = Handle::new(Widget { size: 3 }).erase();
        assert!(erased.downcast::<Other>().is_none());
        assert!(matches!(
            erased.typed::<Other>(),
            Err(ConvertError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn list_shares_storage() {
        let a: List<i64> = List::from_vec(vec![1, 2]);
        let b = a.clone();
        b.push(3);
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(2), Some(3));
    }

    #[test]
    fn list_set_ignores_out_of_bounds() {
        let a: List<i64> = List::new();
        a.set(0, 1);
        assert!(a.is_empty());
    }
}
