//! Runtime reflection
//!
//! Type descriptors for managed classes: stable name-hash identity, super
//! chains, activators and field descriptors with type-erased accessors.
//! Everything generic in the engine — the collector's mark walk,
//! serializers, editor property grids — goes through this module instead
//! of compile-time knowledge of concrete classes.

pub mod builder;
pub mod field;
pub mod hash;
pub mod registry;
pub mod type_info;

pub use builder::{SlotAccessor, TypeBuilder};
pub use field::FieldInfo;
pub use hash::{fnv1a_32, fnv1a_64, TypeKey};
pub use registry::TypeRegistry;
pub use type_info::TypeInfo;
