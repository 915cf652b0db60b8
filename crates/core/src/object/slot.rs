//! Reference-field storage
//!
//! A reflected managed-reference field is declared as a slot rather than a
//! bare handle: the slot provides interior mutability (so reflection and
//! the collector can work through `&self`) and a uniform erased accessor
//! surface for the field thunks captured at registration time.
//!
//! [`RefSlot`] is the single-thread flavor backed by a `RefCell`;
//! [`SyncRefSlot`] is the thread-safe flavor backed by a mutex and the
//! interlocked count family. Assigning a slot always runs the full
//! release-old/store/add-ref-new discipline, because it stores owning
//! handles.

use std::cell::RefCell;

use parking_lot::Mutex;

use crate::object::cast::runtime_derives;
use crate::object::managed::{ManagedClass, RawObject};
use crate::object::strong::{AnyRef, ObjectRef, SharedRef};

/// Erased accessor surface of a reference field, consumed by the
/// registration builder.
///
/// `peek` must not touch reference counts; the collector calls it while
/// walking the object graph.
pub trait ReferenceSlot<T: ManagedClass> {
    /// Current referent without acquiring a reference
    fn peek(&self) -> Option<RawObject>;

    /// Read the referent as an owning erased handle
    fn load(&self) -> Option<AnyRef>;

    /// Replace the referent. Returns false (and leaves the slot untouched)
    /// when `value`'s class neither is `T` nor derives from it.
    fn store(&self, value: Option<AnyRef>) -> bool;
}

/// Single-thread reference field
pub struct RefSlot<T: ManagedClass> {
    inner: RefCell<Option<ObjectRef<T>>>,
}

impl<T: ManagedClass> RefSlot<T> {
    pub fn new(value: Option<ObjectRef<T>>) -> Self {
        RefSlot {
            inner: RefCell::new(value),
        }
    }

    pub fn empty() -> Self {
        Self::new(None)
    }

    pub fn get(&self) -> Option<ObjectRef<T>> {
        self.inner.borrow().clone()
    }

    pub fn set(&self, value: Option<ObjectRef<T>>) {
        *self.inner.borrow_mut() = value;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_none()
    }
}

impl<T: ManagedClass> Default for RefSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ManagedClass> ReferenceSlot<T> for RefSlot<T> {
    fn peek(&self) -> Option<RawObject> {
        match self.inner.try_borrow() {
            Ok(slot) => slot.as_ref().map(|r| r.raw()),
            Err(_) => None,
        }
    }

    fn load(&self) -> Option<AnyRef> {
        self.get().map(ObjectRef::erase)
    }

    fn store(&self, value: Option<AnyRef>) -> bool {
        let typed = match check_target(value) {
            Ok(typed) => typed,
            Err(()) => return false,
        };
        self.set(typed);
        true
    }
}

impl<T: ManagedClass> std::fmt::Debug for RefSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.peek() {
            Some(raw) => write!(f, "RefSlot<{}>({:#x})", T::CLASS_NAME, raw.id()),
            None => write!(f, "RefSlot<{}>(empty)", T::CLASS_NAME),
        }
    }
}

/// Thread-safe reference field using the interlocked count family
pub struct SyncRefSlot<T: ManagedClass> {
    inner: Mutex<Option<SharedRef<T>>>,
}

impl<T: ManagedClass> SyncRefSlot<T> {
    pub fn new(value: Option<SharedRef<T>>) -> Self {
        SyncRefSlot {
            inner: Mutex::new(value),
        }
    }

    pub fn empty() -> Self {
        Self::new(None)
    }

    pub fn get(&self) -> Option<SharedRef<T>> {
        self.inner.lock().clone()
    }

    pub fn set(&self, value: Option<SharedRef<T>>) {
        *self.inner.lock() = value;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl<T: ManagedClass> Default for SyncRefSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ManagedClass> ReferenceSlot<T> for SyncRefSlot<T> {
    fn peek(&self) -> Option<RawObject> {
        self.inner.lock().as_ref().map(|r| r.raw())
    }

    fn load(&self) -> Option<AnyRef> {
        self.get().map(ObjectRef::erase)
    }

    fn store(&self, value: Option<AnyRef>) -> bool {
        let typed = match check_target(value) {
            Ok(typed) => typed,
            Err(()) => return false,
        };
        self.set(typed);
        true
    }
}

impl<T: ManagedClass> std::fmt::Debug for SyncRefSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.peek() {
            Some(raw) => write!(f, "SyncRefSlot<{}>({:#x})", T::CLASS_NAME, raw.id()),
            None => write!(f, "SyncRefSlot<{}>(empty)", T::CLASS_NAME),
        }
    }
}

/// Validate an erased value against the slot's declared target class and
/// convert it, transferring the count share.
fn check_target<T: ManagedClass, const ATOMIC: bool>(
    value: Option<AnyRef>,
) -> Result<Option<ObjectRef<T, ATOMIC>>, ()> {
    match value {
        None => Ok(None),
        Some(any) => {
            if runtime_derives(any.raw(), T::type_key()) {
                // Safety: class relationship verified above
                Ok(Some(unsafe { any.transfer() }))
            } else {
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::ObjectHeap;
    use crate::reflect::builder::TypeBuilder;

    #[derive(Default)]
    struct Sprite {
        layer: i32,
    }

    impl ManagedClass for Sprite {
        const CLASS_NAME: &'static str = "slot::Sprite";

        fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
            builder.activator(Self::default)
        }
    }

    #[derive(Default)]
    struct Sound;

    impl ManagedClass for Sound {
        const CLASS_NAME: &'static str = "slot::Sound";

        fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
            builder.activator(Self::default)
        }
    }

    #[test]
    fn test_slot_assignment_counts() {
        let heap = ObjectHeap::new();
        let sprite = ObjectRef::new_in(&heap, Sprite { layer: 3 });
        assert_eq!(sprite.strong_count(), 1);

        let slot = RefSlot::<Sprite>::empty();
        slot.set(Some(sprite.clone()));
        assert_eq!(sprite.strong_count(), 2);

        // Replacing releases the previous referent
        slot.set(Some(sprite.clone()));
        assert_eq!(sprite.strong_count(), 2);

        slot.clear();
        assert_eq!(sprite.strong_count(), 1);
    }

    #[test]
    fn test_peek_does_not_count() {
        let heap = ObjectHeap::new();
        let sprite = ObjectRef::new_in(&heap, Sprite::default());
        let slot = RefSlot::new(Some(sprite.clone()));

        let raw = slot.peek().unwrap();
        assert_eq!(raw.id(), sprite.id());
        assert_eq!(sprite.strong_count(), 2);
    }

    #[test]
    fn test_store_rejects_foreign_class() {
        let heap = ObjectHeap::new();
        let sound = ObjectRef::new_in(&heap, Sound).erase();
        let slot = RefSlot::<Sprite>::empty();

        assert!(!slot.store(Some(sound)));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_sync_slot_roundtrip() {
        let heap = ObjectHeap::new();
        let sprite = SharedRef::new_shared_in(&heap, Sprite { layer: 9 });
        let slot = SyncRefSlot::new(Some(sprite.clone()));

        let loaded = slot.load().unwrap();
        assert_eq!(loaded.id(), sprite.id());
        assert_eq!(sprite.strong_count(), 3);
        drop(loaded);
        assert_eq!(sprite.strong_count(), 2);
    }
}
