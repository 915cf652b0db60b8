//! Halcyon Proc Macros
//!
//! This crate provides the `#[derive(Reflect)]` macro for the Halcyon
//! reflection system. The derive expands to the same `TypeBuilder` calls a
//! hand-written `ManagedClass` implementation would make; there is no
//! macro-only capability.
//!
//! # Example
//!
//! ```ignore
//! use halcyon_core::{RefSlot, Reflect};
//!
//! #[derive(Default, Reflect)]
//! pub struct Widget {
//!     #[reflect(reference)]
//!     child: RefSlot<Widget>,
//!
//!     #[reflect(scalar)]
//!     label: String,
//! }
//!
//! // Derived classes embed their base as the first field:
//! #[derive(Default, Reflect)]
//! #[reflect(extends = "Widget")]
//! #[repr(C)]
//! pub struct Button {
//!     base: Widget,
//!
//!     #[reflect(scalar)]
//!     pressed: bool,
//! }
//! ```
//!
//! # Attributes
//!
//! ## Struct Attributes
//!
//! - `#[reflect(class = "Name")]` - Registered class name (defaults to the
//!   struct identifier).
//! - `#[reflect(extends = "Base")]` - Declare the base class. The struct
//!   must be `#[repr(C)]` with the base value as its first field; the
//!   macro verifies both and emits the `Extends` marker impl.
//! - `#[reflect(no_activate)]` - Register without an activator (abstract
//!   base). Without this flag the class must implement `Default`.
//!
//! ## Field Attributes
//!
//! - `#[reflect(reference)]` - Managed-reference field; the type must be a
//!   `RefSlot<T>` or `SyncRefSlot<T>`.
//! - `#[reflect(scalar)]` - Scalar field, reflected by name and declared
//!   type only.
//! - `#[reflect(name = "other")]` - Override the reflected field name.
//!
//! Fields without a `reflect` attribute are not reflected.

mod parse;
mod reflect_class;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derive macro implementing `ManagedClass`
///
/// Generates the class name constant, a stable `CLASS_KEY`, the
/// `ManagedClass::reflect` declaration for every tagged field, and (for
/// `extends`) the layout-checked `Extends` marker impl.
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    reflect_class::derive_reflect_class(input).into()
}
