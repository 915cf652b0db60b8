//! Field descriptors
//!
//! A [`FieldInfo`] describes one reflected field of a managed class.
//! Managed-reference fields carry type-erased accessor thunks captured at
//! registration time against the concrete owner class; generic code reads
//! and writes them without compile-time knowledge of either side. Scalar
//! fields are reflected by name and declared type only.
//!
//! Writing through a field descriptor runs the same release/store/add-ref
//! discipline as a direct slot assignment, so reflection-driven mutation
//! can never desynchronize the strong counts from the object graph.

use crate::error::ObjectError;
use crate::object::cast::runtime_derives;
use crate::object::managed::RawObject;
use crate::object::strong::AnyRef;
use crate::reflect::hash::TypeKey;

/// Erased read of a field's referent without touching counts (collector path)
pub(crate) type PeekThunk = Box<dyn Fn(RawObject) -> Option<RawObject> + Send + Sync>;
/// Erased owning read
pub(crate) type LoadThunk = Box<dyn Fn(RawObject) -> Option<AnyRef> + Send + Sync>;
/// Erased write; false on a target-class mismatch
pub(crate) type StoreThunk = Box<dyn Fn(RawObject, Option<AnyRef>) -> bool + Send + Sync>;

pub(crate) enum FieldAccess {
    Scalar {
        type_name: &'static str,
    },
    Reference {
        target: TypeKey,
        target_name: &'static str,
        peek: PeekThunk,
        load: LoadThunk,
        store: StoreThunk,
    },
}

/// Runtime descriptor of one reflected field
pub struct FieldInfo {
    name: &'static str,
    owner: TypeKey,
    owner_name: &'static str,
    access: FieldAccess,
}

impl FieldInfo {
    pub(crate) fn new(
        name: &'static str,
        owner: TypeKey,
        owner_name: &'static str,
        access: FieldAccess,
    ) -> Self {
        FieldInfo {
            name,
            owner,
            owner_name,
            access,
        }
    }

    /// Field name as declared
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Name of the class that declared this field
    pub fn owner_name(&self) -> &'static str {
        self.owner_name
    }

    /// Whether this field holds a managed reference
    pub fn is_reference(&self) -> bool {
        matches!(self.access, FieldAccess::Reference { .. })
    }

    /// Declared target class of a reference field
    pub fn target_key(&self) -> Option<TypeKey> {
        match &self.access {
            FieldAccess::Reference { target, .. } => Some(*target),
            FieldAccess::Scalar { .. } => None,
        }
    }

    /// Declared Rust type of a scalar field
    pub fn scalar_type_name(&self) -> Option<&'static str> {
        match &self.access {
            FieldAccess::Scalar { type_name } => Some(*type_name),
            FieldAccess::Reference { .. } => None,
        }
    }

    /// Read the referent of a reference field.
    ///
    /// `instance`'s class must be the declaring class or derive from it.
    pub fn get(&self, instance: &AnyRef) -> Result<Option<AnyRef>, ObjectError> {
        self.check_instance(instance)?;
        match &self.access {
            FieldAccess::Reference { load, .. } => Ok(load(instance.raw())),
            FieldAccess::Scalar { .. } => Err(ObjectError::NotAReference { field: self.name }),
        }
    }

    /// Replace the referent of a reference field.
    ///
    /// Releases the previous referent and acquires the new one; rejects
    /// values whose class does not derive from the declared target.
    pub fn set(&self, instance: &AnyRef, value: Option<&AnyRef>) -> Result<(), ObjectError> {
        self.check_instance(instance)?;
        match &self.access {
            FieldAccess::Reference {
                store, target_name, ..
            } => {
                if store(instance.raw(), value.cloned()) {
                    Ok(())
                } else {
                    let from = value
                        .and_then(AnyRef::ty)
                        .map(|ty| ty.name())
                        .unwrap_or("<unregistered>");
                    Err(ObjectError::InvalidCast {
                        from,
                        to: *target_name,
                    })
                }
            }
            FieldAccess::Scalar { .. } => Err(ObjectError::NotAReference { field: self.name }),
        }
    }

    /// Collector path: referent of a reference field, no count effect.
    ///
    /// # Safety
    /// `raw` must reference a live object of the declaring class (or a
    /// derived one).
    pub(crate) unsafe fn peek(&self, raw: RawObject) -> Option<RawObject> {
        match &self.access {
            FieldAccess::Reference { peek, .. } => peek(raw),
            FieldAccess::Scalar { .. } => None,
        }
    }

    fn check_instance(&self, instance: &AnyRef) -> Result<(), ObjectError> {
        if runtime_derives(instance.raw(), self.owner) {
            Ok(())
        } else {
            Err(ObjectError::ForeignInstance {
                expected: self.owner_name,
            })
        }
    }
}

impl std::fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.access {
            FieldAccess::Scalar { type_name } => {
                write!(f, "FieldInfo({}.{}: {})", self.owner_name, self.name, type_name)
            }
            FieldAccess::Reference { target_name, .. } => write!(
                f,
                "FieldInfo({}.{}: ref {})",
                self.owner_name, self.name, target_name
            ),
        }
    }
}
