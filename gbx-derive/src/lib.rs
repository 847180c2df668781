//! # GBX Derive Macros
//!
//! This crate provides the procedural macros for `gbx`. `#[derive(ReadWrite)]` turns a
//! struct into a chunk handler: it implements `ReadWrite` (and `Field`, so the struct
//! nests inside other handlers) by coding every field in declaration order.
//!
//! ## Attributes
//!
//! * `#[gbx(version(min = 0, max = 3))]` on the struct, together with `#[gbx(version)]`
//!   on an `i32` field: that field is the chunk's version tag and is validated
//!   against the bounds when reading.
//! * `#[gbx(since = 2)]` / `#[gbx(until = 1)]` on an `Option<T>` field: the field only
//!   exists for versions in that range.
//! * `#[gbx(with = "path::to::fn")]`: codes the field with
//!   `fn(&mut Codec<'_>, &mut T) -> Result<()>` instead of its `Field` impl.
//! * `#[gbx(skip)]`: the field is not part of the wire format.
//!
//! The generated `uses_lookback` is true as soon as one coded field can read or extend
//! the Id or node tables, which decides whether a lazy chunk may really be deferred.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprPath, Fields, LitStr, Member, Type, parse_macro_input,
};

/// Derives `ReadWrite` and `Field`.
#[proc_macro_derive(ReadWrite, attributes(gbx))]
pub fn derive_read_write(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

// --- Internal Data Structures ---

struct VersionBounds {
    min: Expr,
    max: Expr,
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    is_version: bool,
    since: Option<Expr>,
    until: Option<Expr>,
    with: Option<ExprPath>,
}

struct FieldSpec {
    member: Member,
    name: String,
    ty: Type,
    attrs: FieldAttrs,
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let data_struct = match &input.data {
        Data::Struct(ds) => ds,
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "ReadWrite only supports structs",
            ));
        }
    };

    let bounds = parse_struct_attributes(&input.attrs)?;

    let mut specs = Vec::new();
    match &data_struct.fields {
        Fields::Named(named) => {
            for field in &named.named {
                let Some(ident) = field.ident.clone() else {
                    continue;
                };
                specs.push(FieldSpec {
                    name: ident.to_string(),
                    member: Member::Named(ident),
                    ty: field.ty.clone(),
                    attrs: parse_field_attributes(&field.attrs)?,
                });
            }
        }
        Fields::Unnamed(unnamed) => {
            for (i, field) in unnamed.unnamed.iter().enumerate() {
                specs.push(FieldSpec {
                    name: i.to_string(),
                    member: Member::Unnamed(i.into()),
                    ty: field.ty.clone(),
                    attrs: parse_field_attributes(&field.attrs)?,
                });
            }
        }
        Fields::Unit => {}
    }

    let version_fields: Vec<&FieldSpec> = specs.iter().filter(|s| s.attrs.is_version).collect();
    let version_member = match (version_fields.as_slice(), &bounds) {
        ([], None) => None,
        ([field], Some(_)) => Some(field.member.clone()),
        ([], Some(_)) => {
            return Err(syn::Error::new(
                name.span(),
                "`#[gbx(version(..))]` needs one field marked `#[gbx(version)]`",
            ));
        }
        ([_], None) => {
            return Err(syn::Error::new(
                name.span(),
                "`#[gbx(version)]` field needs `#[gbx(version(min = .., max = ..))]` on the struct",
            ));
        }
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "only one field can be marked `#[gbx(version)]`",
            ));
        }
    };

    let mut statements = Vec::new();
    let mut lookback = Vec::new();
    for spec in &specs {
        if spec.attrs.skip {
            continue;
        }
        statements.push(generate_field(spec, version_member.as_ref(), bounds.as_ref())?);
        lookback.push(generate_lookback(spec));
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::gbx::ReadWrite for #name #ty_generics #where_clause {
            fn read_write(&mut self, ctx: &mut ::gbx::Codec<'_>) -> ::gbx::Result<()> {
                #(#statements)*
                Ok(())
            }

            fn uses_lookback() -> bool {
                false #(|| #lookback)*
            }
        }

        impl #impl_generics ::gbx::Field for #name #ty_generics #where_clause {
            fn field(&mut self, ctx: &mut ::gbx::Codec<'_>) -> ::gbx::Result<()> {
                ::gbx::ReadWrite::read_write(self, ctx)
            }

            fn uses_lookback() -> bool {
                <Self as ::gbx::ReadWrite>::uses_lookback()
            }
        }
    })
}

// --- Generator: per-field statement ---

fn generate_field(
    spec: &FieldSpec,
    version: Option<&Member>,
    bounds: Option<&VersionBounds>,
) -> syn::Result<proc_macro2::TokenStream> {
    let member = &spec.member;
    let attrs = &spec.attrs;

    if attrs.is_version {
        let Some(VersionBounds { min, max }) = bounds else {
            return Err(syn::Error::new_spanned(member, "missing version bounds"));
        };
        return Ok(quote! {
            ctx.chunk_version(&mut self.#member, #min, #max)?;
        });
    }

    let code = match &attrs.with {
        Some(path) => quote! { #path },
        None => quote! { ::gbx::Field::field },
    };

    if attrs.since.is_none() && attrs.until.is_none() {
        return Ok(match &attrs.with {
            Some(path) => quote! { #path(ctx, &mut self.#member)?; },
            None => quote! { ::gbx::Field::field(&mut self.#member, ctx)?; },
        });
    }

    let Some(version) = version else {
        return Err(syn::Error::new_spanned(
            member,
            "`since`/`until` need a field marked `#[gbx(version)]`",
        ));
    };
    let since = attrs
        .since
        .as_ref()
        .map(|v| quote! { && self.#version >= #v });
    let until = attrs
        .until
        .as_ref()
        .map(|v| quote! { && self.#version <= #v });
    let present = format_ident!("__present_{}", spec.name);
    let name = &spec.name;
    let call = match &attrs.with {
        Some(_) => quote! {
            ::gbx::rt::gated_with(ctx, &mut self.#member, #present, #name, |ctx, v| #code(ctx, v))?;
        },
        None => quote! {
            ::gbx::rt::gated(ctx, &mut self.#member, #present, #name)?;
        },
    };
    Ok(quote! {
        let #present = true #since #until;
        #call
    })
}

// --- Generator: lookback query ---

/// Custom `with` routines are opaque to the macro and count as touching the tables.
fn generate_lookback(spec: &FieldSpec) -> proc_macro2::TokenStream {
    let ty = &spec.ty;
    let attrs = &spec.attrs;
    if attrs.is_version {
        return quote! { false };
    }
    if attrs.with.is_some() {
        return quote! { true };
    }
    if attrs.since.is_some() || attrs.until.is_some() {
        return quote! { <#ty as ::gbx::rt::Gated>::uses_lookback() };
    }
    quote! { <#ty as ::gbx::Field>::uses_lookback() }
}

// --- Attribute parsing ---

fn parse_struct_attributes(attrs: &[Attribute]) -> syn::Result<Option<VersionBounds>> {
    let mut bounds = None;
    for attr in attrs {
        if !attr.path().is_ident("gbx") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("version") {
                let mut min = None;
                let mut max = None;
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("min") {
                        min = Some(inner.value()?.parse::<Expr>()?);
                        return Ok(());
                    }
                    if inner.path.is_ident("max") {
                        max = Some(inner.value()?.parse::<Expr>()?);
                        return Ok(());
                    }
                    Err(inner.error("Unknown version bound. Supported: min, max"))
                })?;
                let (Some(min), Some(max)) = (min, max) else {
                    return Err(meta.error("version needs both `min` and `max`"));
                };
                bounds = Some(VersionBounds { min, max });
                return Ok(());
            }
            Err(meta.error("Unknown gbx struct attribute. Supported: version(min, max)"))
        })?;
    }
    Ok(bounds)
}

fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("gbx") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                out.skip = true;
                return Ok(());
            }
            if meta.path.is_ident("version") {
                out.is_version = true;
                return Ok(());
            }
            if meta.path.is_ident("since") {
                out.since = Some(meta.value()?.parse::<Expr>()?);
                return Ok(());
            }
            if meta.path.is_ident("until") {
                out.until = Some(meta.value()?.parse::<Expr>()?);
                return Ok(());
            }
            if meta.path.is_ident("with") {
                let s: LitStr = meta.value()?.parse()?;
                out.with = Some(s.parse()?);
                return Ok(());
            }
            Err(meta.error(
                "Unknown gbx field attribute. Supported: skip, version, since, until, with",
            ))
        })?;
    }
    Ok(out)
}
