//! Procedural macros for Quarry
//!
//! This crate provides the `Entity` derive, re-exported as `quarry::Entity`.

mod attributes;
mod entity;
mod utils;

use proc_macro::TokenStream;

/// Derive macro for `Entity` - generates the table descriptor and field bindings
///
/// This macro generates:
/// - `TABLE`, a `TableDescriptor` built from the struct and its attributes
/// - `FIELDS`, one accessor/mutator/zero-check triple per field, in field order
///
/// Struct attributes:
/// - `#[table_name = "..."]` (defaults to the snake-case struct name)
///
/// Field attributes:
/// - `#[primary_key]` marks a key column; composite keys follow field order
/// - `#[has_default]` marks a column the database can fill in
/// - `#[column_name = "..."]` renames the column
/// - `#[created_at]` / `#[updated_at]` mark the timestamp columns
///
/// # Example
/// ```ignore
/// use quarry::Entity;
///
/// #[derive(Debug, Default, Entity)]
/// #[table_name = "roles"]
/// pub struct Role {
///     #[primary_key]
///     #[has_default]
///     pub id: i32,
///     pub name: String,
/// }
/// ```
#[proc_macro_derive(
    Entity,
    attributes(table_name, primary_key, has_default, column_name, created_at, updated_at)
)]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::derive_entity(input)
}
