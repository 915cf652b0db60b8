//! Managed object storage and lifecycle
//!
//! Every managed instance lives in a heap allocation that prefixes the user
//! payload with an [`ObjectHeader`]: the strong count, the lazily created
//! weak cell, lifecycle flags and a type-erased destructor. Strong and weak
//! handles all point at the header; payload access goes through the offset
//! recorded at allocation time, so an erased handle never depends on the
//! payload's concrete layout.
//!
//! Destruction is claimed exactly once via the `COLLECTING` flag. Whichever
//! path wins the claim (a strong count reaching zero, or a collection pass
//! reclaiming an unreachable cycle) owns teardown; every other path backs
//! off. This is what makes a release on a cyclic back-edge during teardown
//! a no-op instead of a double free.

use std::mem::{offset_of, ManuallyDrop};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize, Ordering};
use std::sync::Weak;

use bitflags::bitflags;
use tracing::trace;

use crate::heap::{HeapInner, ObjectHeap};
use crate::object::weak::WeakCell;
use crate::reflect::builder::TypeBuilder;
use crate::reflect::hash::TypeKey;

bitflags! {
    /// Per-object lifecycle flags, stored packed in the header
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ObjectFlags: u8 {
        /// Destruction has been claimed; further release/destroy requests back off
        const COLLECTING = 1 << 0;
        /// The object is currently registered with its heap
        const TRACKED = 1 << 1;
    }
}

/// Trait implemented by every reflectable managed class.
///
/// Implementations are usually generated by `#[derive(Reflect)]`, which
/// expands to the same [`TypeBuilder`] calls a hand-written impl would make:
///
/// ```ignore
/// impl ManagedClass for Widget {
///     const CLASS_NAME: &'static str = "Widget";
///
///     fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
///         builder
///             .activator(Self::default)
///             .reference("child", |w: &Self| &w.child as _)
///     }
/// }
/// ```
///
/// The type descriptor is built from this declaration the first time the
/// class is seen by a registry.
pub trait ManagedClass: Sized + 'static {
    /// Human-readable class name; also the source of the type key
    const CLASS_NAME: &'static str;

    /// Declare the super class, activator and reflected fields
    fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self>;

    /// Stable identifier of this class
    fn type_key() -> TypeKey {
        TypeKey::from_name(Self::CLASS_NAME)
    }
}

/// Intrusive state shared by every managed allocation.
///
/// `#[repr(C)]` so the header is always at offset 0 of the allocation and
/// an erased pointer to it can be formed from any typed box pointer.
#[repr(C)]
pub(crate) struct ObjectHeader {
    /// Strong reference count. Allocation hands out the first reference,
    /// so the count starts at 1 and the object dies when it returns to 0.
    strong: AtomicUsize,
    /// Lazily created weak cell; null until the first downgrade
    weak: AtomicPtr<WeakCell>,
    /// Packed [`ObjectFlags`]
    flags: AtomicU8,
    /// Stable key of the concrete class
    key: TypeKey,
    /// Payload offset from the start of the header, in bytes
    data_offset: u32,
    /// Type-erased payload destructor + deallocator
    drop_fn: unsafe fn(NonNull<ObjectHeader>),
    /// Owning heap; dead once a scoped heap has been dropped
    heap: Weak<HeapInner>,
}

impl ObjectHeader {
    pub(crate) fn key(&self) -> TypeKey {
        self.key
    }

    pub(crate) fn strong_count(&self) -> usize {
        self.strong.load(Ordering::Acquire)
    }

    pub(crate) fn flags(&self) -> ObjectFlags {
        ObjectFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn clear_flag(&self, flag: ObjectFlags) {
        self.flags.fetch_and(!flag.bits(), Ordering::AcqRel);
    }

    /// Claim the right to destroy this object. Returns true for exactly one
    /// caller; everyone else must back off.
    pub(crate) fn claim_destruction(&self) -> bool {
        let prev = self
            .flags
            .fetch_or(ObjectFlags::COLLECTING.bits(), Ordering::AcqRel);
        prev & ObjectFlags::COLLECTING.bits() == 0
    }

    /// Increment the strong count.
    ///
    /// `atomic` selects the interlocked family; the relaxed family is a
    /// plain load/store pair for objects confined to one thread.
    pub(crate) fn add_ref(&self, atomic: bool) {
        if atomic {
            self.strong.fetch_add(1, Ordering::Relaxed);
        } else {
            let n = self.strong.load(Ordering::Relaxed);
            self.strong.store(n + 1, Ordering::Relaxed);
        }
    }

    /// Decrement the strong count. Returns true when this call dropped the
    /// count to zero, i.e. the caller must initiate destruction.
    pub(crate) fn release(&self, atomic: bool) -> bool {
        if atomic {
            let prev = self.strong.fetch_sub(1, Ordering::Release);
            debug_assert!(prev > 0, "strong count underflow");
            if prev == 1 {
                // Synchronize with all prior releases before teardown
                std::sync::atomic::fence(Ordering::Acquire);
                return true;
            }
            false
        } else {
            let n = self.strong.load(Ordering::Relaxed);
            debug_assert!(n > 0, "strong count underflow");
            self.strong.store(n - 1, Ordering::Relaxed);
            n == 1
        }
    }

    /// Try to acquire a strong reference on behalf of a weak handle.
    ///
    /// Fails when the count is already zero or destruction has been
    /// claimed, so a doomed object can never be resurrected.
    pub(crate) fn try_add_ref(&self, atomic: bool) -> bool {
        if self.flags().contains(ObjectFlags::COLLECTING) {
            return false;
        }
        if atomic {
            let mut n = self.strong.load(Ordering::Relaxed);
            loop {
                if n == 0 {
                    return false;
                }
                match self.strong.compare_exchange_weak(
                    n,
                    n + 1,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return true,
                    Err(actual) => n = actual,
                }
            }
        } else {
            let n = self.strong.load(Ordering::Relaxed);
            if n == 0 {
                return false;
            }
            self.strong.store(n + 1, Ordering::Relaxed);
            true
        }
    }

    /// Get the weak cell, creating it on first use. Idempotent; a racing
    /// creation keeps the winner and frees the loser.
    pub(crate) fn weak_cell(&self) -> NonNull<WeakCell> {
        let existing = self.weak.load(Ordering::Acquire);
        if let Some(cell) = NonNull::new(existing) {
            return cell;
        }
        let fresh = Box::into_raw(Box::new(WeakCell::new()));
        match self.weak.compare_exchange(
            std::ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            // Safety: `fresh` came from Box::into_raw above
            Ok(_) => unsafe { NonNull::new_unchecked(fresh) },
            Err(winner) => unsafe {
                drop(Box::from_raw(fresh));
                NonNull::new_unchecked(winner)
            },
        }
    }

    pub(crate) fn existing_weak_cell(&self) -> Option<NonNull<WeakCell>> {
        NonNull::new(self.weak.load(Ordering::Acquire))
    }

    /// Outstanding weak references, not counting the object's own share
    pub(crate) fn weak_count(&self) -> usize {
        match self.existing_weak_cell() {
            // Safety: the cell outlives the object that owns it
            Some(cell) => unsafe { cell.as_ref().outstanding() },
            None => 0,
        }
    }

    pub(crate) fn heap(&self) -> Option<ObjectHeap> {
        self.heap.upgrade().map(ObjectHeap::from_inner)
    }

    pub(crate) fn data_ptr(&self) -> *mut u8 {
        let base = self as *const ObjectHeader as *mut u8;
        // Safety: data_offset was recorded against this very allocation
        unsafe { base.add(self.data_offset as usize) }
    }
}

/// The allocation layout of a managed instance: header, then payload.
#[repr(C)]
struct ObjectBox<T> {
    header: ObjectHeader,
    data: ManuallyDrop<T>,
}

/// Drops the payload and frees the allocation of a concrete class.
///
/// # Safety
/// `raw` must point at a live `ObjectBox<T>` whose destruction has been
/// claimed; it must not be accessed afterwards.
unsafe fn drop_box<T: ManagedClass>(raw: NonNull<ObjectHeader>) {
    let boxed = raw.cast::<ObjectBox<T>>().as_ptr();
    ManuallyDrop::drop(&mut (*boxed).data);
    drop(Box::from_raw(boxed));
}

/// Allocate a managed instance on `heap` with a strong count of 1.
///
/// Registers the concrete class with the heap's type registry on first use
/// and tracks the new object in the heap's live set.
pub(crate) fn allocate<T: ManagedClass>(heap: &ObjectHeap, value: T) -> RawObject {
    heap.types().ensure::<T>();

    let boxed = Box::new(ObjectBox {
        header: ObjectHeader {
            strong: AtomicUsize::new(1),
            weak: AtomicPtr::new(std::ptr::null_mut()),
            flags: AtomicU8::new(ObjectFlags::TRACKED.bits()),
            key: T::type_key(),
            data_offset: offset_of!(ObjectBox<T>, data) as u32,
            drop_fn: drop_box::<T>,
            heap: heap.downgrade_inner(),
        },
        data: ManuallyDrop::new(value),
    });

    let raw = RawObject::from_header(NonNull::from(&Box::leak(boxed).header));
    heap.register(raw);
    raw
}

/// Destroy an object if destruction has not been claimed yet.
///
/// # Safety
/// `raw` must point at a live object header.
pub(crate) unsafe fn destroy_object(raw: RawObject) {
    if raw.header().claim_destruction() {
        finalize_object(raw);
    }
}

/// Run the teardown sequence for an object whose destruction has already
/// been claimed: invalidate weak references, unregister, drop the payload,
/// free the allocation.
///
/// # Safety
/// `raw` must point at a live object header and the caller must hold the
/// destruction claim.
pub(crate) unsafe fn finalize_object(raw: RawObject) {
    let header = raw.header();

    if let Some(cell) = header.existing_weak_cell() {
        cell.as_ref().invalidate();
        WeakCell::release_ptr(cell, true);
    }

    // A collection pass detaches its victims from the sets up front and
    // clears TRACKED; only refcount-driven destruction unregisters here.
    if header.flags().contains(ObjectFlags::TRACKED) {
        header.clear_flag(ObjectFlags::TRACKED);
        if let Some(heap) = header.heap() {
            heap.unregister(raw);
        }
    }

    trace!(key = %header.key(), "destroying managed object");

    let drop_fn = header.drop_fn;
    drop_fn(raw.ptr);
}

/// Type-erased, non-owning handle to a managed object.
///
/// Copying a `RawObject` never touches the strong count; it is an identity
/// token used by the collector and by field thunks. It carries no liveness
/// guarantee of its own, so everything beyond identity and the cached type
/// key is crate-internal.
#[derive(Clone, Copy)]
pub struct RawObject {
    ptr: NonNull<ObjectHeader>,
    key: TypeKey,
}

impl RawObject {
    pub(crate) fn from_header(ptr: NonNull<ObjectHeader>) -> Self {
        // Safety: callers pass a pointer to a live header
        let key = unsafe { ptr.as_ref().key() };
        RawObject { ptr, key }
    }

    /// Identity of the referenced object (stable for its lifetime)
    pub fn id(self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Stable key of the object's concrete class
    pub fn key(self) -> TypeKey {
        self.key
    }

    /// # Safety
    /// The referenced object must still be alive.
    pub(crate) unsafe fn header<'a>(self) -> &'a ObjectHeader {
        self.ptr.as_ref()
    }

    /// # Safety
    /// The referenced object must be alive and its concrete class must be
    /// `T` or embed `T` as its layout prefix.
    pub(crate) unsafe fn data_ref<'a, T>(self) -> &'a T {
        &*(self.header().data_ptr() as *const T)
    }
}

// SAFETY: RawObject is an address token; all dereferencing entry points are
// unsafe and carry their own liveness contracts.
unsafe impl Send for RawObject {}
unsafe impl Sync for RawObject {}

impl PartialEq for RawObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for RawObject {}

impl std::hash::Hash for RawObject {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
    }
}

impl std::fmt::Debug for RawObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawObject({:#x}, {})", self.id(), self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_claim_is_exclusive() {
        let flags = AtomicU8::new(0);
        let header = probe_header(flags);
        assert!(header.claim_destruction());
        assert!(!header.claim_destruction());
    }

    #[test]
    fn test_release_reports_zero_exactly_once() {
        let header = probe_header(AtomicU8::new(0));
        header.add_ref(false);
        header.add_ref(true);
        // count is now 3 (starts at 1)
        assert!(!header.release(false));
        assert!(!header.release(true));
        assert!(header.release(false));
    }

    #[test]
    fn test_try_add_ref_refuses_claimed_object() {
        let header = probe_header(AtomicU8::new(0));
        assert!(header.try_add_ref(true));
        header.claim_destruction();
        assert!(!header.try_add_ref(true));
        assert!(!header.try_add_ref(false));
    }

    /// Bare header for count/flag arithmetic tests; never dereferenced as
    /// an allocation.
    fn probe_header(flags: AtomicU8) -> ObjectHeader {
        unsafe fn never(_: NonNull<ObjectHeader>) {}
        ObjectHeader {
            strong: AtomicUsize::new(1),
            weak: AtomicPtr::new(std::ptr::null_mut()),
            flags,
            key: TypeKey::from_name("Probe"),
            data_offset: 0,
            drop_fn: never,
            heap: Weak::new(),
        }
    }
}
