//! Attribute parsing for the Reflect derive macro

use darling::{FromDeriveInput, FromField};
use syn::{Ident, Type, Visibility};

/// Parsed #[reflect(...)] attributes on the struct
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(reflect), supports(struct_named), forward_attrs(repr))]
pub struct ReflectClassArgs {
    /// Struct identifier
    pub ident: Ident,

    /// Struct visibility
    pub vis: Visibility,

    /// Forwarded attributes (used for the #[repr(C)] check)
    pub attrs: Vec<syn::Attribute>,

    /// Struct fields
    pub data: darling::ast::Data<(), ReflectFieldArgs>,

    /// Registered class name (defaults to the struct identifier)
    #[darling(rename = "class", default)]
    pub class_name: Option<String>,

    /// Base class path (e.g. `extends = "Node"`). Requires #[repr(C)] and
    /// the base value as the first field.
    #[darling(default)]
    pub extends: Option<syn::Path>,

    /// Don't register an activator (abstract base classes)
    #[darling(default)]
    pub no_activate: bool,
}

/// Parsed #[reflect(...)] attributes on a field
#[derive(Debug, FromField)]
#[darling(attributes(reflect))]
pub struct ReflectFieldArgs {
    /// Field identifier
    pub ident: Option<Ident>,

    /// Field type
    pub ty: Type,

    /// Field visibility
    pub vis: Visibility,

    /// Reflect as a managed-reference field (type must be a slot)
    #[darling(default)]
    pub reference: bool,

    /// Reflect as a scalar field (name and declared type only)
    #[darling(default)]
    pub scalar: bool,

    /// Override the reflected field name (defaults to the identifier)
    #[darling(rename = "name", default)]
    pub field_name: Option<String>,
}

impl ReflectFieldArgs {
    /// Check if this field participates in reflection
    pub fn is_reflected(&self) -> bool {
        self.reference || self.scalar
    }

    /// The name this field is registered under
    pub fn reflected_name(&self) -> Option<String> {
        match &self.field_name {
            Some(name) => Some(name.clone()),
            None => self.ident.as_ref().map(|i| i.to_string()),
        }
    }
}

/// Parse a DeriveInput into ReflectClassArgs
pub fn parse_reflect_class(input: &syn::DeriveInput) -> darling::Result<ReflectClassArgs> {
    ReflectClassArgs::from_derive_input(input)
}
