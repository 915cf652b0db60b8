//! Weak references
//!
//! A weak reference never keeps its referent alive; it can only detect
//! destruction and attempt a promotion to a strong reference while the
//! referent still exists.
//!
//! The bookkeeping lives in a [`WeakCell`] allocated separately from the
//! object on the first downgrade. The object holds one implicit share of
//! the cell's count while it is alive; destruction flips the validity flag
//! and drops that share. Whoever drops the last share frees the cell, so a
//! weak handle can always inspect its cell no matter which side went away
//! first.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::ObjectError;
use crate::object::managed::{ManagedClass, RawObject};
use crate::object::strong::ObjectRef;

/// Out-of-line weak reference bookkeeping for one managed object
pub(crate) struct WeakCell {
    /// Share count: outstanding weak handles plus the object's own share
    weak: AtomicUsize,
    /// Cleared when the originating object is destroyed
    valid: AtomicBool,
}

impl WeakCell {
    /// A fresh cell starts with the object's own share
    pub(crate) fn new() -> Self {
        WeakCell {
            weak: AtomicUsize::new(1),
            valid: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the originating object as destroyed
    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Outstanding weak handles, excluding the object's own share
    pub(crate) fn outstanding(&self) -> usize {
        let shares = self.weak.load(Ordering::Acquire);
        if self.is_valid() {
            shares.saturating_sub(1)
        } else {
            shares
        }
    }

    pub(crate) fn add_ref(&self, atomic: bool) {
        if atomic {
            self.weak.fetch_add(1, Ordering::Relaxed);
        } else {
            let n = self.weak.load(Ordering::Relaxed);
            self.weak.store(n + 1, Ordering::Relaxed);
        }
    }

    /// Drop one share of `cell`, freeing it when this was the last share.
    ///
    /// # Safety
    /// `cell` must come from `ObjectHeader::weak_cell` and the caller must
    /// own one share of it. The cell must not be touched afterwards.
    pub(crate) unsafe fn release_ptr(cell: NonNull<WeakCell>, atomic: bool) {
        let last = if atomic {
            cell.as_ref().weak.fetch_sub(1, Ordering::AcqRel) == 1
        } else {
            let n = cell.as_ref().weak.load(Ordering::Relaxed);
            debug_assert!(n > 0, "weak count underflow");
            cell.as_ref().weak.store(n - 1, Ordering::Relaxed);
            n == 1
        };
        if last {
            drop(Box::from_raw(cell.as_ptr()));
        }
    }
}

/// Non-owning handle to a managed object.
///
/// `ATOMIC` selects the interlocked count family, independently of the
/// family used by the strong handles at the same call site; pick the
/// interlocked family whenever the handle can cross threads.
pub struct WeakRef<T: ManagedClass, const ATOMIC: bool = false> {
    cell: NonNull<WeakCell>,
    target: RawObject,
    _marker: PhantomData<*const T>,
}

/// Weak counterpart of [`SharedRef`](crate::object::strong::SharedRef)
pub type SharedWeakRef<T> = WeakRef<T, true>;

impl<T: ManagedClass, const ATOMIC: bool> WeakRef<T, ATOMIC> {
    /// Take a new share of an object's weak cell.
    ///
    /// # Safety
    /// The referenced object must be alive.
    pub(crate) unsafe fn acquire(target: RawObject) -> Self {
        let cell = target.header().weak_cell();
        cell.as_ref().add_ref(ATOMIC);
        WeakRef {
            cell,
            target,
            _marker: PhantomData,
        }
    }

    fn cell(&self) -> &WeakCell {
        // Safety: this handle owns a share, so the cell is alive
        unsafe { self.cell.as_ref() }
    }

    /// Whether the referent has not been destroyed yet
    pub fn is_valid(&self) -> bool {
        self.cell().is_valid()
    }

    /// Identity of the referent (stable even after destruction)
    pub fn id(&self) -> usize {
        self.target.id()
    }

    /// Try to promote to a strong reference.
    ///
    /// Returns `None` once the referent has been destroyed or its
    /// destruction is in progress.
    pub fn lock(&self) -> Option<ObjectRef<T, ATOMIC>> {
        if !self.cell().is_valid() {
            return None;
        }
        // The validity check above means the referent has not been torn
        // down; try_add_ref refuses mid-destruction objects.
        unsafe {
            if self.target.header().try_add_ref(ATOMIC) {
                Some(ObjectRef::from_raw_owned(self.target))
            } else {
                None
            }
        }
    }

    /// Promote, treating a dead referent as a programming error at the
    /// call site
    pub fn upgrade(&self) -> Result<ObjectRef<T, ATOMIC>, ObjectError> {
        self.lock().ok_or(ObjectError::NullReference)
    }
}

impl<T: ManagedClass, const ATOMIC: bool> Clone for WeakRef<T, ATOMIC> {
    fn clone(&self) -> Self {
        self.cell().add_ref(ATOMIC);
        WeakRef {
            cell: self.cell,
            target: self.target,
            _marker: PhantomData,
        }
    }
}

impl<T: ManagedClass, const ATOMIC: bool> Drop for WeakRef<T, ATOMIC> {
    fn drop(&mut self) {
        // Safety: this handle owns one share of the cell
        unsafe { WeakCell::release_ptr(self.cell, ATOMIC) };
    }
}

impl<T: ManagedClass, const ATOMIC: bool> std::fmt::Debug for WeakRef<T, ATOMIC> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WeakRef<{}>({:#x}, valid={})",
            T::CLASS_NAME,
            self.id(),
            self.is_valid()
        )
    }
}

// SAFETY: the interlocked family uses atomic share updates and the cell
// outlives every share holder.
unsafe impl<T: ManagedClass + Send + Sync> Send for WeakRef<T, true> {}
unsafe impl<T: ManagedClass + Send + Sync> Sync for WeakRef<T, true> {}
