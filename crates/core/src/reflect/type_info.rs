//! Runtime type descriptors
//!
//! One [`TypeInfo`] exists per registered class per registry. It records
//! the class name and key, the super class, the activator (when the class
//! is default-constructible) and the ordered field descriptors.
//!
//! Field ordering contract: ancestor fields first, then the class's own
//! declared fields in declaration order. A field's index in a base class
//! is therefore its index in every derived class.

use std::sync::Arc;

use crate::error::ObjectError;
use crate::heap::ObjectHeap;
use crate::object::strong::AnyRef;
use crate::reflect::field::FieldInfo;
use crate::reflect::hash::TypeKey;

pub(crate) type Activator = Box<dyn Fn(&ObjectHeap) -> AnyRef + Send + Sync>;

/// Runtime descriptor of a managed class
pub struct TypeInfo {
    name: &'static str,
    key: TypeKey,
    super_ty: Option<Arc<TypeInfo>>,
    activator: Option<Activator>,
    fields: Vec<Arc<FieldInfo>>,
}

impl TypeInfo {
    pub(crate) fn new(
        name: &'static str,
        key: TypeKey,
        super_ty: Option<Arc<TypeInfo>>,
        activator: Option<Activator>,
        fields: Vec<Arc<FieldInfo>>,
    ) -> Self {
        TypeInfo {
            name,
            key,
            super_ty,
            activator,
            fields,
        }
    }

    /// Human-readable class name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stable identifier of the class
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Descriptor of the super class, if one was declared
    pub fn super_ty(&self) -> Option<&Arc<TypeInfo>> {
        self.super_ty.as_ref()
    }

    /// All reflected fields, ancestors first
    pub fn fields(&self) -> &[Arc<FieldInfo>] {
        &self.fields
    }

    /// Look up a reflected field by name
    pub fn field(&self, name: &str) -> Option<&Arc<FieldInfo>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Whether [`Self::activate`] can construct instances of this class
    pub fn is_activatable(&self) -> bool {
        self.activator.is_some()
    }

    /// Whether this class is `ancestor` or derives from it
    pub fn derives(&self, ancestor: TypeKey) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.key == ancestor {
                return true;
            }
            current = ty.super_ty.as_deref();
        }
        false
    }

    /// Default-construct a fresh instance on `heap`.
    ///
    /// Fails with [`ObjectError::NotActivatable`] for classes registered
    /// without an activator (abstract bases).
    pub fn activate(&self, heap: &ObjectHeap) -> Result<AnyRef, ObjectError> {
        match &self.activator {
            Some(make) => Ok(make(heap)),
            None => Err(ObjectError::NotActivatable(self.name)),
        }
    }
}

impl std::fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("super", &self.super_ty.as_ref().map(|s| s.name))
            .field("fields", &self.fields.len())
            .field("activatable", &self.is_activatable())
            .finish()
    }
}
