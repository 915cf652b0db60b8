//! Type registration builder
//!
//! [`TypeBuilder`] is the declaration surface a managed class fills in from
//! [`ManagedClass::reflect`]: super class, activator and reflected fields.
//! The builder captures type-erased accessor thunks against the concrete
//! class here, at declaration time; nothing downstream ever needs offsets
//! or compile-time knowledge of the class again.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::warn;

use crate::heap::ObjectHeap;
use crate::object::managed::{ManagedClass, RawObject};
use crate::object::slot::ReferenceSlot;
use crate::object::strong::ObjectRef;
use crate::reflect::field::{FieldAccess, FieldInfo};
use crate::reflect::hash::TypeKey;
use crate::reflect::registry::TypeRegistry;
use crate::reflect::type_info::{Activator, TypeInfo};

/// Accessor from an owner borrow to one of its reference slots.
///
/// A plain function pointer: the thunks built from it stay `Send + Sync`
/// without capturing anything.
pub type SlotAccessor<T, U> = for<'a> fn(&'a T) -> &'a dyn ReferenceSlot<U>;

struct SuperLink {
    key: TypeKey,
    ensure: fn(&TypeRegistry) -> Arc<TypeInfo>,
}

/// Declaration builder for one managed class
pub struct TypeBuilder<T: ManagedClass> {
    super_link: Option<SuperLink>,
    activator: Option<Activator>,
    fields: Vec<FieldInfo>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ManagedClass> TypeBuilder<T> {
    pub(crate) fn new() -> Self {
        TypeBuilder {
            super_link: None,
            activator: None,
            fields: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Declare the super class.
    ///
    /// The `Extends` bound ties the registered hierarchy to the layout
    /// guarantee runtime casts rely on.
    pub fn extends<B: ManagedClass>(mut self) -> Self
    where
        T: crate::object::cast::Extends<B>,
    {
        fn ensure_thunk<B: ManagedClass>(registry: &TypeRegistry) -> Arc<TypeInfo> {
            registry.ensure::<B>()
        }

        if B::type_key() == T::type_key() {
            warn!(class = T::CLASS_NAME, "class declared as its own super; ignored");
            return self;
        }
        self.super_link = Some(SuperLink {
            key: B::type_key(),
            ensure: ensure_thunk::<B>,
        });
        self
    }

    /// Provide the default-construction factory
    pub fn activator(mut self, make: fn() -> T) -> Self {
        self.activator = Some(Box::new(move |heap: &ObjectHeap| {
            ObjectRef::new_in(heap, make()).erase()
        }));
        self
    }

    /// Declare a managed-reference field backed by a slot
    pub fn reference<U: ManagedClass>(
        mut self,
        name: &'static str,
        accessor: SlotAccessor<T, U>,
    ) -> Self {
        // Safety contract shared by the three thunks: callers pass a live
        // object whose class is T or derives from it, so the payload can
        // be viewed as &T.
        let peek = Box::new(move |raw: RawObject| unsafe { accessor(raw.data_ref::<T>()).peek() });
        let load = Box::new(move |raw: RawObject| unsafe { accessor(raw.data_ref::<T>()).load() });
        let store = Box::new(move |raw: RawObject, value| unsafe {
            accessor(raw.data_ref::<T>()).store(value)
        });

        self.fields.push(FieldInfo::new(
            name,
            T::type_key(),
            T::CLASS_NAME,
            FieldAccess::Reference {
                target: U::type_key(),
                target_name: U::CLASS_NAME,
                peek,
                load,
                store,
            },
        ));
        self
    }

    /// Declare a scalar field (name and declared type only)
    pub fn scalar<F: 'static>(mut self, name: &'static str) -> Self {
        self.fields.push(FieldInfo::new(
            name,
            T::type_key(),
            T::CLASS_NAME,
            FieldAccess::Scalar {
                type_name: std::any::type_name::<F>(),
            },
        ));
        self
    }

    /// Resolve the super chain and assemble the descriptor.
    ///
    /// Ancestor fields come first, then this class's own declarations.
    pub(crate) fn build(self, registry: &TypeRegistry) -> TypeInfo {
        let super_ty = self.super_link.map(|link| {
            let resolved = (link.ensure)(registry);
            debug_assert_eq!(resolved.key(), link.key);
            resolved
        });

        let mut fields: Vec<Arc<FieldInfo>> = super_ty
            .as_ref()
            .map(|s| s.fields().to_vec())
            .unwrap_or_default();
        fields.extend(self.fields.into_iter().map(Arc::new));

        TypeInfo::new(
            T::CLASS_NAME,
            T::type_key(),
            super_ty,
            self.activator,
            fields,
        )
    }
}
