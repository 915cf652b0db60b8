//! Strong (owning) references
//!
//! [`ObjectRef`] is the typed owning handle: cloning increments the strong
//! count, dropping decrements it, and the drop that returns the count to
//! zero destroys the object. [`AnyRef`] is its type-erased counterpart used
//! by reflection; it always uses the interlocked count family.
//!
//! The `ATOMIC` parameter picks the count family at the type level. The
//! default family uses plain load/store pairs and is for objects confined
//! to a single thread; `SharedRef` uses interlocked updates and may cross
//! threads. Mixing families on one object forfeits count accuracy under
//! contention (references can be leaked or dropped early) but never breaks
//! memory safety.

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::ObjectError;
use crate::heap::ObjectHeap;
use crate::object::cast::{runtime_derives, Extends};
use crate::object::managed::{allocate, destroy_object, ManagedClass, RawObject};
use crate::object::weak::WeakRef;
use crate::reflect::type_info::TypeInfo;

/// Typed owning handle to a managed object
pub struct ObjectRef<T: ManagedClass, const ATOMIC: bool = false> {
    raw: RawObject,
    _marker: PhantomData<*const T>,
}

/// Owning handle using the interlocked count family; may cross threads
pub type SharedRef<T> = ObjectRef<T, true>;

impl<T: ManagedClass> ObjectRef<T> {
    /// Allocate `value` on the process-wide heap
    pub fn new(value: T) -> Self {
        Self::new_in(&ObjectHeap::global(), value)
    }

    /// Allocate `value` on `heap` and return the first reference to it
    pub fn new_in(heap: &ObjectHeap, value: T) -> Self {
        let raw = allocate(heap, value);
        ObjectRef {
            raw,
            _marker: PhantomData,
        }
    }
}

impl<T: ManagedClass> ObjectRef<T, true> {
    /// Allocate `value` on the process-wide heap with interlocked counting
    pub fn new_shared(value: T) -> Self {
        Self::new_shared_in(&ObjectHeap::global(), value)
    }

    /// Allocate `value` on `heap` with interlocked counting
    pub fn new_shared_in(heap: &ObjectHeap, value: T) -> Self {
        let raw = allocate(heap, value);
        ObjectRef {
            raw,
            _marker: PhantomData,
        }
    }
}

impl<T: ManagedClass, const ATOMIC: bool> ObjectRef<T, ATOMIC> {
    /// Adopt an already-incremented count share.
    ///
    /// # Safety
    /// The object must be alive, its concrete class must be `T` or derive
    /// from it, and the caller must transfer exactly one count share.
    pub(crate) unsafe fn from_raw_owned(raw: RawObject) -> Self {
        ObjectRef {
            raw,
            _marker: PhantomData,
        }
    }

    /// Acquire a fresh count share for a live object.
    ///
    /// # Safety
    /// Same liveness and class requirements as [`Self::from_raw_owned`].
    pub(crate) unsafe fn from_raw_acquire(raw: RawObject) -> Self {
        raw.header().add_ref(ATOMIC);
        Self::from_raw_owned(raw)
    }

    /// Identity token for this object; never affects the count
    pub fn raw(&self) -> RawObject {
        self.raw
    }

    /// Identity of the referenced object
    pub fn id(&self) -> usize {
        self.raw.id()
    }

    /// Current strong count (approximate under contention)
    pub fn strong_count(&self) -> usize {
        // Safety: the object is alive while this handle exists
        unsafe { self.raw.header().strong_count() }
    }

    /// Outstanding weak references
    pub fn weak_count(&self) -> usize {
        unsafe { self.raw.header().weak_count() }
    }

    /// The heap this object was allocated on; `None` once a scoped heap
    /// has been dropped
    pub fn heap(&self) -> Option<ObjectHeap> {
        unsafe { self.raw.header().heap() }
    }

    /// Runtime type descriptor of the concrete class
    pub fn ty(&self) -> Option<Arc<TypeInfo>> {
        self.heap()?.types().lookup_key(self.raw.key())
    }

    /// Create a weak reference, allocating the weak cell on first use
    pub fn downgrade(&self) -> WeakRef<T, ATOMIC> {
        // Safety: the object is alive while this handle exists
        unsafe { WeakRef::acquire(self.raw) }
    }

    /// Erase the static type, transferring this handle's count share
    pub fn erase(self) -> AnyRef {
        let raw = self.raw;
        std::mem::forget(self);
        AnyRef {
            raw,
            _marker: PhantomData,
        }
    }

    /// View the object through an embedded base class. Compile-time
    /// checked and infallible.
    pub fn upcast<B: ManagedClass>(&self) -> ObjectRef<B, ATOMIC>
    where
        T: Extends<B>,
    {
        // Safety: Extends guarantees B is a layout prefix of T
        unsafe { ObjectRef::from_raw_acquire(self.raw) }
    }

    /// Probing cast across the registered class hierarchy.
    ///
    /// Returns `None` when the object's concrete class neither is `U` nor
    /// derives from it; never panics.
    pub fn try_cast<U: ManagedClass>(&self) -> Option<ObjectRef<U, ATOMIC>> {
        if runtime_derives(self.raw, U::type_key()) {
            // Safety: the registered chain only contains prefix-compatible
            // class pairs (enforced by TypeBuilder::extends)
            Some(unsafe { ObjectRef::from_raw_acquire(self.raw) })
        } else {
            None
        }
    }

    /// Checked cast; mismatches are a programming error at the call site
    pub fn cast<U: ManagedClass>(&self) -> Result<ObjectRef<U, ATOMIC>, ObjectError> {
        self.try_cast::<U>().ok_or(ObjectError::InvalidCast {
            from: T::CLASS_NAME,
            to: U::CLASS_NAME,
        })
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.raw == b.raw
    }
}

impl<T: ManagedClass, const ATOMIC: bool> Deref for ObjectRef<T, ATOMIC> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: alive while this handle exists; T is the concrete class
        // or a layout prefix of it
        unsafe { self.raw.data_ref::<T>() }
    }
}

impl<T: ManagedClass, const ATOMIC: bool> Clone for ObjectRef<T, ATOMIC> {
    fn clone(&self) -> Self {
        unsafe { Self::from_raw_acquire(self.raw) }
    }
}

impl<T: ManagedClass, const ATOMIC: bool> Drop for ObjectRef<T, ATOMIC> {
    fn drop(&mut self) {
        unsafe {
            if self.raw.header().release(ATOMIC) {
                destroy_object(self.raw);
            }
        }
    }
}

impl<T: ManagedClass, const ATOMIC: bool> PartialEq for ObjectRef<T, ATOMIC> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: ManagedClass, const ATOMIC: bool> Eq for ObjectRef<T, ATOMIC> {}

impl<T: ManagedClass, const ATOMIC: bool> std::hash::Hash for ObjectRef<T, ATOMIC> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: ManagedClass, const ATOMIC: bool> std::fmt::Debug for ObjectRef<T, ATOMIC> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ObjectRef<{}>({:#x}, strong={})",
            T::CLASS_NAME,
            self.id(),
            self.strong_count()
        )
    }
}

// SAFETY: the interlocked family performs atomic count updates; payload
// access through the handle is `&T`, so `T: Sync` is required, and the
// last handle may drop the payload on any thread, hence `T: Send`.
unsafe impl<T: ManagedClass + Send + Sync> Send for ObjectRef<T, true> {}
unsafe impl<T: ManagedClass + Send + Sync> Sync for ObjectRef<T, true> {}

/// Type-erased owning handle, always using the interlocked count family.
///
/// Produced by [`ObjectRef::erase`], `TypeInfo::activate` and reflected
/// field reads. Deliberately not `Send`: the erased payload may not be
/// thread-safe, and only a typed `SharedRef` proves that it is.
pub struct AnyRef {
    raw: RawObject,
    _marker: PhantomData<*const ()>,
}

impl AnyRef {
    /// Acquire a fresh count share for a live object.
    ///
    /// # Safety
    /// The object must be alive.
    pub(crate) unsafe fn from_raw_acquire(raw: RawObject) -> Self {
        raw.header().add_ref(true);
        AnyRef {
            raw,
            _marker: PhantomData,
        }
    }

    /// Adopt an already-incremented count share, skipping the class check.
    ///
    /// # Safety
    /// The caller must transfer exactly one count share and must have
    /// verified the class relationship it subsequently relies on.
    pub(crate) unsafe fn transfer<T: ManagedClass, const ATOMIC: bool>(
        self,
    ) -> ObjectRef<T, ATOMIC> {
        let raw = self.raw;
        std::mem::forget(self);
        ObjectRef::from_raw_owned(raw)
    }

    pub fn raw(&self) -> RawObject {
        self.raw
    }

    pub fn id(&self) -> usize {
        self.raw.id()
    }

    /// Stable key of the concrete class
    pub fn key(&self) -> crate::reflect::hash::TypeKey {
        self.raw.key()
    }

    pub fn strong_count(&self) -> usize {
        unsafe { self.raw.header().strong_count() }
    }

    pub fn heap(&self) -> Option<ObjectHeap> {
        unsafe { self.raw.header().heap() }
    }

    /// Runtime type descriptor of the concrete class
    pub fn ty(&self) -> Option<Arc<TypeInfo>> {
        self.heap()?.types().lookup_key(self.raw.key())
    }

    /// Probing downcast; `None` when the concrete class neither is `U`
    /// nor derives from it
    pub fn try_downcast<U: ManagedClass>(self) -> Result<ObjectRef<U>, AnyRef> {
        if runtime_derives(self.raw, U::type_key()) {
            // Safety: class relationship verified, count share transferred
            Ok(unsafe { self.transfer() })
        } else {
            Err(self)
        }
    }

    /// Checked downcast
    pub fn downcast<U: ManagedClass>(self) -> Result<ObjectRef<U>, ObjectError> {
        self.try_downcast::<U>().map_err(|original| {
            let from = original
                .ty()
                .map(|ty| ty.name())
                .unwrap_or("<unregistered>");
            ObjectError::InvalidCast {
                from,
                to: U::CLASS_NAME,
            }
        })
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.raw == b.raw
    }
}

impl Clone for AnyRef {
    fn clone(&self) -> Self {
        unsafe { Self::from_raw_acquire(self.raw) }
    }
}

impl Drop for AnyRef {
    fn drop(&mut self) {
        unsafe {
            if self.raw.header().release(true) {
                destroy_object(self.raw);
            }
        }
    }
}

impl PartialEq for AnyRef {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for AnyRef {}

impl std::hash::Hash for AnyRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl std::fmt::Debug for AnyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnyRef({:#x}, {})", self.id(), self.key())
    }
}
