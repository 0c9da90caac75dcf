//! Entity derive macro implementation

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{
    parse_macro_input, Data, DataStruct, DeriveInput, Field, Fields, GenericArgument,
    PathArguments, Type,
};

use crate::attributes;
use crate::utils;

/// Derive macro for `Entity` - see the crate-level docs for the attributes.
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(fields),
            ..
        }) => &fields.named,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity can only be derived for structs with named fields",
            ));
        }
    };

    let table_name = attributes::extract_table_name(&input.attrs)?
        .unwrap_or_else(|| utils::snake_case(&struct_name.to_string()));

    let mut columns = Vec::new();
    let mut with_default = Vec::new();
    let mut without_default = Vec::new();
    let mut primary_key = Vec::new();
    let mut created_at: Option<String> = None;
    let mut updated_at: Option<String> = None;
    let mut field_defs = Vec::new();

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let column_name = attributes::extract_column_name(field)?
            .unwrap_or_else(|| utils::snake_case(&field_name.unraw().to_string()));

        if columns.contains(&column_name) {
            return Err(syn::Error::new_spanned(
                field,
                format!("column `{column_name}` is mapped twice"),
            ));
        }

        if attributes::has_attribute(field, "primary_key") {
            primary_key.push(column_name.clone());
        }
        if attributes::has_attribute(field, "has_default") {
            with_default.push(column_name.clone());
        } else {
            without_default.push(column_name.clone());
        }

        if is_timestamp(fields, field, "created_at")? {
            created_at = Some(column_name.clone());
        }
        if is_timestamp(fields, field, "updated_at")? {
            updated_at = Some(column_name.clone());
        }

        field_defs.push(quote! {
            ::quarry::FieldDef {
                column: #column_name,
                get: |record: &#struct_name| {
                    ::quarry::ValueType::into_value(::core::clone::Clone::clone(&record.#field_name))
                },
                set: |record: &mut #struct_name, value: ::quarry::Value|
                    -> ::core::result::Result<(), ::quarry::DecodeError> {
                    record.#field_name = ::quarry::decode(value)?;
                    ::core::result::Result::Ok(())
                },
                is_zero: |record: &#struct_name| ::quarry::ValueType::is_zero(&record.#field_name),
            }
        });

        columns.push(column_name);
    }

    if primary_key.is_empty() {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity requires at least one field marked #[primary_key]",
        ));
    }

    let created_at = optional_column(created_at.as_deref());
    let updated_at = optional_column(updated_at.as_deref());

    Ok(quote! {
        impl ::quarry::Entity for #struct_name {
            const TABLE: ::quarry::TableDescriptor = ::quarry::TableDescriptor {
                name: #table_name,
                columns: &[#(#columns),*],
                columns_with_default: &[#(#with_default),*],
                columns_without_default: &[#(#without_default),*],
                primary_key: &[#(#primary_key),*],
                created_at: #created_at,
                updated_at: #updated_at,
            };

            const FIELDS: &'static [::quarry::FieldDef<Self>] = &[
                #(#field_defs),*
            ];
        }
    })
}

/// Whether `field` is the table's `marker` timestamp column.
///
/// A field carrying the `#[created_at]` / `#[updated_at]` attribute is used when
/// one exists; otherwise a chrono timestamp field with that exact name is picked
/// up. Fields of any other type are never stamped.
fn is_timestamp(
    fields: &Punctuated<Field, Comma>,
    field: &Field,
    marker: &str,
) -> syn::Result<bool> {
    let marked = fields
        .iter()
        .filter(|f| attributes::has_attribute(f, marker))
        .count();
    if marked > 1 {
        return Err(syn::Error::new_spanned(
            field,
            format!("only one field may be marked #[{marker}]"),
        ));
    }
    if marked == 1 {
        if !attributes::has_attribute(field, marker) {
            return Ok(false);
        }
        if !is_chrono_timestamp(&field.ty) {
            return Err(syn::Error::new_spanned(
                &field.ty,
                format!("#[{marker}] requires a DateTime or NaiveDateTime field"),
            ));
        }
        return Ok(true);
    }
    Ok(is_chrono_timestamp(&field.ty)
        && field
            .ident
            .as_ref()
            .is_some_and(|ident| ident.unraw() == marker))
}

/// `DateTime<_>` or `NaiveDateTime`, bare or inside `Option<...>`.
fn is_chrono_timestamp(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(segment) = path.path.segments.last() else {
        return false;
    };
    if segment.ident == "Option" {
        if let PathArguments::AngleBracketed(args) = &segment.arguments {
            if let Some(GenericArgument::Type(inner)) = args.args.first() {
                return is_chrono_timestamp(inner);
            }
        }
        return false;
    }
    segment.ident == "DateTime" || segment.ident == "NaiveDateTime"
}

fn optional_column(column: Option<&str>) -> TokenStream2 {
    match column {
        Some(name) => quote! { ::core::option::Option::Some(#name) },
        None => quote! { ::core::option::Option::None },
    }
}
