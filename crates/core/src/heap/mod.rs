//! Object heap and collection
//!
//! Every managed object is tracked by exactly one [`ObjectHeap`] from
//! construction to destruction, in either the live set or the root set
//! (never both). Reference counting destroys most objects deterministically
//! the moment their last strong reference drops; the heap's collection pass
//! exists for what counting cannot reclaim: reference cycles.
//!
//! The pass is a mark pass driven entirely by reflection. Roots are the
//! explicitly promoted objects plus every object whose strong count exceeds
//! the number of reflected reference fields pointing at it — the surplus
//! can only come from handles held outside the managed graph (locals,
//! containers), so those objects must survive. Everything unreachable from
//! that root set is reclaimed, including cycles. An object whose managed
//! references live outside reflected slots therefore pins its targets
//! (a leak at worst), it can never dangle.
//!
//! A pass never runs concurrently with itself. The sets are locked while
//! counting and marking; doomed objects are claimed and removed under the
//! lock, then destroyed after it is released, so teardown code that
//! releases references (or allocates) does not deadlock.

pub mod root;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::HeapConfig;
use crate::object::managed::{finalize_object, ManagedClass, ObjectFlags, RawObject};
use crate::object::strong::ObjectRef;
use crate::reflect::registry::TypeRegistry;

static GLOBAL_HEAP: LazyLock<ObjectHeap> = LazyLock::new(|| {
    ObjectHeap::from_parts(TypeRegistry::global(), HeapConfig::default())
});

/// Counters describing a heap's population
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Tracked objects, roots included
    pub live: usize,
    /// Explicitly promoted roots
    pub roots: usize,
}

pub(crate) struct HeapInner {
    objects: Mutex<HashSet<RawObject>>,
    roots: Mutex<HashSet<RawObject>>,
    types: Arc<TypeRegistry>,
    /// Guard: at most one collection pass at a time
    collecting: AtomicBool,
    /// Allocations since the last pass, for the auto-collect threshold
    allocs: AtomicUsize,
    config: HeapConfig,
}

/// Handle to an object heap; clones share the same heap
#[derive(Clone)]
pub struct ObjectHeap {
    inner: Arc<HeapInner>,
}

impl ObjectHeap {
    /// Create an isolated heap with its own type registry.
    ///
    /// The seam used by tests and tools; engine code uses [`Self::global`].
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Create an isolated heap with explicit tuning
    pub fn with_config(config: HeapConfig) -> Self {
        Self::from_parts(Arc::new(TypeRegistry::new()), config)
    }

    fn from_parts(types: Arc<TypeRegistry>, config: HeapConfig) -> Self {
        ObjectHeap {
            inner: Arc::new(HeapInner {
                objects: Mutex::new(HashSet::new()),
                roots: Mutex::new(HashSet::new()),
                types,
                collecting: AtomicBool::new(false),
                allocs: AtomicUsize::new(0),
                config,
            }),
        }
    }

    /// The process-wide heap (created on first use, never torn down)
    pub fn global() -> Self {
        GLOBAL_HEAP.clone()
    }

    pub(crate) fn from_inner(inner: Arc<HeapInner>) -> Self {
        ObjectHeap { inner }
    }

    pub(crate) fn downgrade_inner(&self) -> Weak<HeapInner> {
        Arc::downgrade(&self.inner)
    }

    /// The type registry this heap resolves descriptors against
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.inner.types
    }

    /// Whether two handles refer to the same heap
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live: self.inner.objects.lock().len() + self.inner.roots.lock().len(),
            roots: self.inner.roots.lock().len(),
        }
    }

    /// Track a newly constructed object
    pub(crate) fn register(&self, raw: RawObject) {
        self.inner.objects.lock().insert(raw);
        trace!(key = %raw.key(), id = raw.id(), "registered object");

        let threshold = self.inner.config.auto_collect_threshold;
        if threshold > 0 && self.inner.allocs.fetch_add(1, Ordering::Relaxed) + 1 >= threshold {
            self.collect();
        }
    }

    /// Stop tracking an object. A second call for the same object (or a
    /// call for one already removed by a pass) is a no-op.
    pub(crate) fn unregister(&self, raw: RawObject) {
        if !self.inner.objects.lock().remove(&raw) {
            self.inner.roots.lock().remove(&raw);
        }
    }

    /// Exempt an object from collection and make it a starting point of
    /// the reachability walk
    pub(crate) fn promote_root(&self, raw: RawObject) {
        if self.inner.objects.lock().remove(&raw) {
            self.inner.roots.lock().insert(raw);
            trace!(id = raw.id(), "promoted to root");
        } else if !self.inner.roots.lock().contains(&raw) {
            warn!(id = raw.id(), "promote of an object this heap does not track");
        }
    }

    /// Return a root to the ordinary live set
    pub(crate) fn demote_root(&self, raw: RawObject) {
        if self.inner.roots.lock().remove(&raw) {
            self.inner.objects.lock().insert(raw);
            trace!(id = raw.id(), "demoted from root");
        }
    }

    /// Promote an object to collection root.
    ///
    /// Prefer [`GcRoot`](crate::heap::root::GcRoot) for scoped promotion.
    pub fn promote<T: ManagedClass, const ATOMIC: bool>(&self, object: &ObjectRef<T, ATOMIC>) {
        self.promote_root(object.raw());
    }

    /// Demote a previously promoted root
    pub fn demote<T: ManagedClass, const ATOMIC: bool>(&self, object: &ObjectRef<T, ATOMIC>) {
        self.demote_root(object.raw());
    }

    /// Run one collection pass. Returns the number of reclaimed objects.
    ///
    /// Concurrent calls do not stack: while a pass is running, further
    /// calls return 0 immediately.
    pub fn collect(&self) -> usize {
        if self.inner.collecting.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let reclaimed = self.collect_locked();
        self.inner.allocs.store(0, Ordering::Relaxed);
        self.inner.collecting.store(false, Ordering::Release);
        reclaimed
    }

    fn collect_locked(&self) -> usize {
        let mut objects = self.inner.objects.lock();
        let mut roots = self.inner.roots.lock();

        // Incoming reflected-edge count per tracked object.
        let mut incoming: HashMap<RawObject, usize> = HashMap::new();
        let universe: HashSet<RawObject> = objects.union(&roots).copied().collect();
        for &obj in &universe {
            self.walk_references(obj, |target| {
                if universe.contains(&target) {
                    *incoming.entry(target).or_insert(0) += 1;
                }
            });
        }

        // Roots of the walk: explicit roots, plus objects with more strong
        // references than reflected edges (held from outside the graph).
        let mut queue: VecDeque<RawObject> = VecDeque::new();
        let mut marked: HashSet<RawObject> = HashSet::new();
        for &obj in &universe {
            // Safety: everything in the sets is alive
            let external = unsafe {
                obj.header().strong_count() > incoming.get(&obj).copied().unwrap_or(0)
            };
            if external || roots.contains(&obj) {
                marked.insert(obj);
                queue.push_back(obj);
            }
        }

        // Breadth-first mark over the reflected graph; a work queue keeps
        // arbitrarily deep graphs off the call stack.
        while let Some(obj) = queue.pop_front() {
            self.walk_references(obj, |target| {
                if universe.contains(&target) && marked.insert(target) {
                    queue.push_back(target);
                }
            });
        }

        // Claim and detach the unreachable remainder under the lock;
        // whoever loses the claim (a release racing to zero) backs off.
        let mut doomed: Vec<RawObject> = Vec::new();
        for &obj in &universe {
            if marked.contains(&obj) {
                continue;
            }
            // Safety: still alive; destruction happens below at the earliest
            if unsafe { obj.header().claim_destruction() } {
                unsafe { obj.header().clear_flag(ObjectFlags::TRACKED) };
                objects.remove(&obj);
                roots.remove(&obj);
                doomed.push(obj);
            }
        }

        drop(roots);
        drop(objects);

        // Teardown outside the locks: destructors release child references
        // and may allocate, both of which need the sets.
        for &obj in &doomed {
            // Safety: this pass holds the destruction claim for every entry
            unsafe { finalize_object(obj) };
        }

        if self.inner.config.log_collections {
            debug!(
                reclaimed = doomed.len(),
                live = self.stats().live,
                "collection pass finished"
            );
        }
        doomed.len()
    }

    /// Visit the referents of every reflected reference field of `obj`
    fn walk_references<F: FnMut(RawObject)>(&self, obj: RawObject, mut visit: F) {
        let ty = match self.inner.types.lookup_key(obj.key()) {
            Some(ty) => ty,
            None => {
                // Unregistered classes have no walkable fields; their
                // referents stay alive through the external-count rule.
                return;
            }
        };
        for field in ty.fields() {
            // Safety: obj is tracked by this heap, hence alive, and of the
            // class (or a subclass of the class) that declared the field
            if let Some(target) = unsafe { field.peek(obj) } {
                visit(target);
            }
        }
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ObjectHeap")
            .field("live", &stats.live)
            .field("roots", &stats.roots)
            .field("types", &self.inner.types.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::root::GcRoot;
    use crate::object::slot::RefSlot;
    use crate::reflect::builder::TypeBuilder;

    #[derive(Default)]
    struct Node {
        next: RefSlot<Node>,
    }

    impl ManagedClass for Node {
        const CLASS_NAME: &'static str = "heap::Node";

        fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
            builder
                .activator(Self::default)
                .reference("next", |node: &Self| &node.next)
        }
    }

    #[test]
    fn test_refcount_destroys_without_collect() {
        let heap = ObjectHeap::new();
        let node = ObjectRef::new_in(&heap, Node::default());
        let probe = node.downgrade();
        assert_eq!(heap.stats().live, 1);

        drop(node);
        assert!(!probe.is_valid());
        assert_eq!(heap.stats().live, 0);
    }

    #[test]
    fn test_collect_preserves_root_reachable() {
        let heap = ObjectHeap::new();
        let root = GcRoot::new(ObjectRef::new_in(&heap, Node::default()));
        let child = ObjectRef::new_in(&heap, Node::default());
        root.next.set(Some(child.clone()));
        let probe = child.downgrade();
        drop(child);

        assert_eq!(heap.collect(), 0);
        assert!(probe.is_valid());
        assert_eq!(heap.stats().live, 2);
        assert_eq!(heap.stats().roots, 1);
    }

    #[test]
    fn test_collect_reclaims_unrooted_cycle() {
        let heap = ObjectHeap::new();
        let a = ObjectRef::new_in(&heap, Node::default());
        let b = ObjectRef::new_in(&heap, Node::default());
        a.next.set(Some(b.clone()));
        b.next.set(Some(a.clone()));
        let probe_a = a.downgrade();
        let probe_b = b.downgrade();

        drop(a);
        drop(b);
        // Counting alone cannot reclaim the cycle
        assert_eq!(heap.stats().live, 2);
        assert!(probe_a.is_valid());

        assert_eq!(heap.collect(), 2);
        assert!(!probe_a.is_valid());
        assert!(!probe_b.is_valid());
        assert_eq!(heap.stats().live, 0);
    }

    #[test]
    fn test_collect_preserves_externally_referenced() {
        let heap = ObjectHeap::new();
        // Held only by a local, never promoted to root
        let orphan = ObjectRef::new_in(&heap, Node::default());

        assert_eq!(heap.collect(), 0);
        assert_eq!(heap.stats().live, 1);
        // Still dereferenceable after the pass
        assert!(orphan.next.is_empty());
    }

    #[test]
    fn test_deep_cycle_collected_without_stack_overflow() {
        let heap = ObjectHeap::new();
        let head = ObjectRef::new_in(&heap, Node::default());
        let mut current = head.clone();
        for _ in 0..10_000 {
            let next = ObjectRef::new_in(&heap, Node::default());
            current.next.set(Some(next.clone()));
            current = next;
        }
        // Close the ring so dropping the local cannot cascade
        current.next.set(Some(head.clone()));
        drop(current);
        drop(head);

        assert_eq!(heap.stats().live, 10_001);
        assert_eq!(heap.collect(), 10_001);
        assert_eq!(heap.stats().live, 0);
    }

    #[test]
    fn test_demoted_root_becomes_collectable() {
        let heap = ObjectHeap::new();
        let a = ObjectRef::new_in(&heap, Node::default());
        a.next.set(Some(a.clone()));
        let probe = a.downgrade();

        let root = GcRoot::new(a);
        assert_eq!(heap.collect(), 0);
        assert!(probe.is_valid());

        drop(root);
        assert_eq!(heap.collect(), 1);
        assert!(!probe.is_valid());
    }

    #[test]
    fn test_manual_promote_and_demote() {
        let heap = ObjectHeap::new();
        let a = ObjectRef::new_in(&heap, Node::default());
        a.next.set(Some(a.clone()));
        let probe = a.downgrade();

        heap.promote(&a);
        drop(a);

        // Only the explicit root keeps the self-cycle alive now
        assert_eq!(heap.collect(), 0);
        assert!(probe.is_valid());

        let recovered = probe.lock().expect("still rooted");
        heap.demote(&recovered);
        drop(recovered);
        assert_eq!(heap.collect(), 1);
        assert!(!probe.is_valid());
    }

    #[test]
    fn test_auto_collect_threshold() {
        let heap = ObjectHeap::with_config(HeapConfig {
            auto_collect_threshold: 3,
            log_collections: false,
        });
        let a = ObjectRef::new_in(&heap, Node::default());
        let b = ObjectRef::new_in(&heap, Node::default());
        a.next.set(Some(b.clone()));
        b.next.set(Some(a.clone()));
        let probe = a.downgrade();
        drop(a);
        drop(b);

        // The third allocation crosses the threshold and triggers a pass
        let survivor = ObjectRef::new_in(&heap, Node::default());
        assert!(!probe.is_valid());
        assert_eq!(heap.stats().live, 1);
        drop(survivor);
    }

    #[test]
    fn test_collect_is_reentrancy_guarded() {
        let heap = ObjectHeap::new();
        // A second pass started while one runs returns immediately; here we
        // just check the guard resets between sequential passes.
        assert_eq!(heap.collect(), 0);
        assert_eq!(heap.collect(), 0);
    }

    #[test]
    fn test_scoped_heap_drop_leaves_objects_valid() {
        let heap = ObjectHeap::new();
        let node = ObjectRef::new_in(&heap, Node::default());
        drop(heap);

        assert!(node.heap().is_none());
        assert!(node.next.is_empty());
        // Release after heap death frees the object without bookkeeping
        drop(node);
    }
}
