//! Attribute parsing utilities

use syn::{Attribute, ExprLit, Field, Lit};

/// Read a `#[name = "value"]` string attribute.
fn string_value(attrs: &[Attribute], name: &str) -> syn::Result<Option<String>> {
    for attr in attrs {
        if attr.path().is_ident(name) {
            let meta = attr.meta.require_name_value()?;
            if let syn::Expr::Lit(ExprLit {
                lit: Lit::Str(s), ..
            }) = &meta.value
            {
                return Ok(Some(s.value()));
            }
            return Err(syn::Error::new_spanned(
                &meta.value,
                format!("`{name}` expects a string literal"),
            ));
        }
    }
    Ok(None)
}

/// Extract table name from struct attributes
pub fn extract_table_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    string_value(attrs, "table_name")
}

/// Extract column name from field attributes
pub fn extract_column_name(field: &Field) -> syn::Result<Option<String>> {
    string_value(&field.attrs, "column_name")
}

/// Check if field has a specific marker attribute
pub fn has_attribute(field: &Field, attr_name: &str) -> bool {
    field
        .attrs
        .iter()
        .any(|attr| attr.path().is_ident(attr_name))
}
