//! Halcyon Core - Managed object model and runtime reflection
//!
//! This crate is the ownership and reflection backbone of the engine:
//! every engine entity (actors, components, scene nodes, assets) is a
//! managed class allocated on an [`ObjectHeap`] and handled through the
//! smart references defined here.
//!
//! # Object model
//!
//! - [`ObjectRef`] / [`SharedRef`] - owning handles driving an intrusive
//!   strong count; the count family (plain vs interlocked) is chosen at
//!   the type level.
//! - [`WeakRef`] - non-owning handles that detect destruction and can try
//!   to promote while the referent lives.
//! - [`GcRoot`] - RAII promotion of an object to collection root.
//! - [`ObjectHeap`] - tracks every live object; its reflection-driven mark
//!   pass reclaims reference cycles that counting alone cannot.
//!
//! # Reflection
//!
//! - [`ManagedClass`] + [`TypeBuilder`] declare a class's super, activator
//!   and fields; `#[derive(Reflect)]` generates the declaration.
//! - [`TypeRegistry`] / [`TypeInfo`] / [`FieldInfo`] answer "what is this
//!   object and what does it reference" at runtime, for the collector,
//!   serializers and editors alike.
//!
//! # Example
//!
//! ```ignore
//! use halcyon_core::{ObjectRef, RefSlot, Reflect};
//!
//! #[derive(Default, Reflect)]
//! struct Widget {
//!     #[reflect(reference)]
//!     child: RefSlot<Widget>,
//!     #[reflect(scalar)]
//!     label: String,
//! }
//!
//! let parent = ObjectRef::new(Widget::default());
//! let child = ObjectRef::new(Widget::default());
//! parent.child.set(Some(child));
//! ```

// Allow the crate to refer to itself as `halcyon_core` for proc macro compatibility
extern crate self as halcyon_core;

pub mod config;
pub mod error;
pub mod heap;
pub mod object;
pub mod reflect;

// Re-export commonly used items
pub use config::{ConfigError, ConfigResult, HeapConfig};
pub use error::{fatal, ObjectError, ObjectResult};
pub use heap::root::GcRoot;
pub use heap::{HeapStats, ObjectHeap};
pub use object::{
    AnyRef, Extends, ManagedClass, ObjectRef, RawObject, RefSlot, ReferenceSlot, SharedRef,
    SharedWeakRef, SyncRefSlot, WeakRef,
};
pub use reflect::{FieldInfo, SlotAccessor, TypeBuilder, TypeInfo, TypeKey, TypeRegistry};

// Re-export macros
pub use halcyon_macros::Reflect;
