//! Reflect derive macro implementation

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, GenericArgument, PathArguments, Type};

use crate::parse::{parse_reflect_class, ReflectClassArgs, ReflectFieldArgs};

/// Generate the ManagedClass implementation
pub fn derive_reflect_class(input: DeriveInput) -> TokenStream {
    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            &input.generics,
            "generic structs cannot derive Reflect; managed classes are concrete",
        )
        .to_compile_error();
    }
    match parse_reflect_class(&input) {
        Ok(args) => generate_impl(args),
        Err(e) => e.write_errors(),
    }
}

/// Extract the target type from a slot wrapper like `RefSlot<T>` or
/// `SyncRefSlot<T>`
fn extract_slot_target(ty: &Type) -> Option<&Type> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if let PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(GenericArgument::Type(inner)) = args.args.first() {
                    return Some(inner);
                }
            }
        }
    }
    None
}

/// Check whether the forwarded attributes contain `#[repr(C)]`
fn has_repr_c(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| {
        if !attr.path().is_ident("repr") {
            return false;
        }
        match &attr.meta {
            syn::Meta::List(list) => list
                .tokens
                .to_string()
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == "C"),
            _ => false,
        }
    })
}

/// Whether the field type names the same type as the base path (by last
/// path segment)
fn type_matches_base(ty: &Type, base: &syn::Path) -> bool {
    let base_ident = match base.segments.last() {
        Some(segment) => &segment.ident,
        None => return false,
    };
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == *base_ident;
        }
    }
    false
}

fn generate_impl(args: ReflectClassArgs) -> TokenStream {
    let struct_name = &args.ident;
    let class_name = args
        .class_name
        .clone()
        .unwrap_or_else(|| struct_name.to_string());

    let fields = match args.data {
        darling::ast::Data::Struct(fields) => fields.fields,
        _ => {
            return syn::Error::new_spanned(
                &args.ident,
                "Reflect can only be derived for structs",
            )
            .to_compile_error()
        }
    };

    // Base class declarations need the prefix-layout guarantee
    let (extends_call, extends_impl) = match &args.extends {
        Some(base) => {
            if !has_repr_c(&args.attrs) {
                return syn::Error::new_spanned(
                    struct_name,
                    "a class with `extends` must be #[repr(C)] so the base is a layout prefix",
                )
                .to_compile_error();
            }
            let first_matches = fields
                .first()
                .map(|f| type_matches_base(&f.ty, base))
                .unwrap_or(false);
            if !first_matches {
                return syn::Error::new_spanned(
                    struct_name,
                    "a class with `extends` must embed the base class as its first field",
                )
                .to_compile_error();
            }
            (
                quote! { .extends::<#base>() },
                quote! {
                    // Verified above: #[repr(C)] with the base as first field
                    unsafe impl ::halcyon_core::Extends<#base> for #struct_name {}
                },
            )
        }
        None => (quote! {}, quote! {}),
    };

    let activator_call = if args.no_activate {
        quote! {}
    } else {
        quote! { .activator(<Self as ::core::default::Default>::default) }
    };

    let mut accessor_fns = Vec::new();
    let mut field_calls = Vec::new();
    for field in fields.iter().filter(|f| f.is_reflected()) {
        match generate_field(struct_name, field) {
            Ok((accessor, call)) => {
                if let Some(accessor) = accessor {
                    accessor_fns.push(accessor);
                }
                field_calls.push(call);
            }
            Err(e) => return e.to_compile_error(),
        }
    }

    quote! {
        impl #struct_name {
            /// Stable key of this class
            pub const CLASS_KEY: ::halcyon_core::TypeKey =
                ::halcyon_core::TypeKey::from_name(#class_name);
        }

        impl ::halcyon_core::ManagedClass for #struct_name {
            const CLASS_NAME: &'static str = #class_name;

            fn reflect(
                builder: ::halcyon_core::TypeBuilder<Self>,
            ) -> ::halcyon_core::TypeBuilder<Self> {
                #(#accessor_fns)*

                builder
                    #extends_call
                    #activator_call
                    #(#field_calls)*
            }
        }

        #extends_impl
    }
}

type FieldTokens = (Option<TokenStream>, TokenStream);

fn generate_field(
    struct_name: &syn::Ident,
    field: &ReflectFieldArgs,
) -> syn::Result<FieldTokens> {
    let ident = field.ident.as_ref().ok_or_else(|| {
        syn::Error::new_spanned(&field.ty, "reflected fields must be named")
    })?;
    let name = field.reflected_name().unwrap_or_default();

    if field.reference && field.scalar {
        return Err(syn::Error::new_spanned(
            ident,
            "a field is either `reference` or `scalar`, not both",
        ));
    }

    if field.reference {
        let target = extract_slot_target(&field.ty).ok_or_else(|| {
            syn::Error::new_spanned(
                &field.ty,
                "a `reference` field must be a RefSlot<T> or SyncRefSlot<T>",
            )
        })?;
        let accessor_name = format_ident!("__reflect_{}", ident);
        let accessor = quote! {
            fn #accessor_name<'a>(
                owner: &'a #struct_name,
            ) -> &'a dyn ::halcyon_core::ReferenceSlot<#target> {
                &owner.#ident
            }
        };
        let call = quote! { .reference(#name, #accessor_name) };
        Ok((Some(accessor), call))
    } else {
        let ty = &field.ty;
        let call = quote! { .scalar::<#ty>(#name) };
        Ok((None, call))
    }
}
