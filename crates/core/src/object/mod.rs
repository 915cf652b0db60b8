//! Managed object model
//!
//! Intrusively reference-counted objects with lazily allocated weak
//! references, a single-rooted composition hierarchy and typed owning /
//! non-owning handles. See the `heap` module for lifetime bookkeeping and
//! collection, and the `reflect` module for the type descriptors built on
//! top of this model.

pub mod cast;
pub mod managed;
pub mod slot;
pub mod strong;
pub mod weak;

pub use cast::Extends;
pub use managed::{ManagedClass, RawObject};
pub use slot::{RefSlot, ReferenceSlot, SyncRefSlot};
pub use strong::{AnyRef, ObjectRef, SharedRef};
pub use weak::{SharedWeakRef, WeakRef};
