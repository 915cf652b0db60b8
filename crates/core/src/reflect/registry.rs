//! Type registry
//!
//! Process-wide table of [`TypeInfo`] descriptors, keyed both by stable
//! type key and by class name. Classes register on first use (allocation,
//! lookup through `ensure`), the Rust analog of registration at static
//! initialization: idempotent, recursive over the super chain, and
//! returning the same descriptor instance for the registry's lifetime.
//!
//! The global registry is created on first use and lives until process
//! exit. Tests that need isolation construct their own instances; a scoped
//! heap always carries its own registry handle, so nothing in the core
//! hard-codes the global one.

use std::sync::{Arc, LazyLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::ObjectError;
use crate::object::managed::ManagedClass;
use crate::reflect::builder::TypeBuilder;
use crate::reflect::hash::TypeKey;
use crate::reflect::type_info::TypeInfo;

static GLOBAL_TYPES: LazyLock<Arc<TypeRegistry>> = LazyLock::new(|| Arc::new(TypeRegistry::new()));

/// Table of registered class descriptors
pub struct TypeRegistry {
    by_key: DashMap<TypeKey, Arc<TypeInfo>>,
    by_name: DashMap<&'static str, Arc<TypeInfo>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            by_key: DashMap::new(),
            by_name: DashMap::new(),
        }
    }

    /// The process-wide registry (created on first use, never torn down)
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL_TYPES.clone()
    }

    /// Look up a descriptor by stable key. A miss is not an error.
    pub fn lookup_key(&self, key: TypeKey) -> Option<Arc<TypeInfo>> {
        self.by_key.get(&key).map(|entry| entry.clone())
    }

    /// Look up a descriptor by class name. A miss is not an error.
    pub fn lookup_name(&self, name: &str) -> Option<Arc<TypeInfo>> {
        self.by_name.get(name).map(|entry| entry.clone())
    }

    /// Register `T` on first use and return its descriptor.
    ///
    /// Idempotent; concurrent callers converge on one descriptor. Super
    /// classes are registered recursively before the class itself.
    pub fn ensure<T: ManagedClass>(&self) -> Arc<TypeInfo> {
        if let Some(existing) = self.lookup_key(T::type_key()) {
            return existing;
        }

        // Built outside the map locks: building may recurse into ensure()
        // for the super chain.
        let info = Arc::new(T::reflect(TypeBuilder::new()).build(self));

        match self.by_key.entry(T::type_key()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                entry.insert(info.clone());
                self.by_name.insert(T::CLASS_NAME, info.clone());
                debug!(
                    class = T::CLASS_NAME,
                    key = %T::type_key(),
                    fields = info.field_count(),
                    "registered managed class"
                );
                info
            }
        }
    }

    /// Explicit registration; fails if `T` is already present.
    pub fn register<T: ManagedClass>(&self) -> Result<Arc<TypeInfo>, ObjectError> {
        if self.by_key.contains_key(&T::type_key()) || self.by_name.contains_key(T::CLASS_NAME) {
            return Err(ObjectError::DuplicateType(T::CLASS_NAME));
        }
        Ok(self.ensure::<T>())
    }

    /// Whether class `key` is `ancestor` or derives from it
    pub fn derives(&self, key: TypeKey, ancestor: TypeKey) -> bool {
        if key == ancestor {
            return true;
        }
        self.lookup_key(key)
            .map(|ty| ty.derives(ancestor))
            .unwrap_or(false)
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::cast::Extends;
    use crate::object::slot::RefSlot;

    #[derive(Default)]
    #[repr(C)]
    struct Node {
        id: u64,
    }

    impl ManagedClass for Node {
        const CLASS_NAME: &'static str = "registry::Node";

        fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
            builder.activator(Self::default).scalar::<u64>("id")
        }
    }

    #[derive(Default)]
    #[repr(C)]
    struct Actor {
        base: Node,
        child: RefSlot<Node>,
    }

    impl ManagedClass for Actor {
        const CLASS_NAME: &'static str = "registry::Actor";

        fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
            builder
                .extends::<Node>()
                .activator(Self::default)
                .reference("child", |actor: &Self| &actor.child)
        }
    }

    // Actor starts with a Node and is #[repr(C)].
    unsafe impl Extends<Node> for Actor {}

    #[test]
    fn test_lookup_miss_is_none() {
        let registry = TypeRegistry::new();
        assert!(registry.lookup_name("registry::Node").is_none());
        assert!(registry
            .lookup_key(TypeKey::from_name("registry::Node"))
            .is_none());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let registry = TypeRegistry::new();
        let first = registry.ensure::<Node>();
        let second = registry.ensure::<Node>();
        assert!(Arc::ptr_eq(&first, &second));

        let by_name = registry.lookup_name("registry::Node").unwrap();
        assert!(Arc::ptr_eq(&first, &by_name));
    }

    #[test]
    fn test_ensure_registers_super_chain() {
        let registry = TypeRegistry::new();
        let actor = registry.ensure::<Actor>();

        let node = registry.lookup_name("registry::Node").unwrap();
        assert!(Arc::ptr_eq(actor.super_ty().unwrap(), &node));
        assert!(registry.derives(Actor::type_key(), Node::type_key()));
        assert!(!registry.derives(Node::type_key(), Actor::type_key()));
    }

    #[test]
    fn test_field_order_ancestors_first() {
        let registry = TypeRegistry::new();
        let actor = registry.ensure::<Actor>();

        let names: Vec<_> = actor.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["id", "child"]);

        // A base field keeps its index in the derived class
        let node = registry.ensure::<Node>();
        assert_eq!(node.fields()[0].name(), actor.fields()[0].name());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = TypeRegistry::new();
        registry.register::<Node>().unwrap();
        let err = registry.register::<Node>().unwrap_err();
        assert!(matches!(err, ObjectError::DuplicateType("registry::Node")));
    }

    #[test]
    fn test_global_registry_is_stable() {
        let a = TypeRegistry::global();
        let b = TypeRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
