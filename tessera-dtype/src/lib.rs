#![cfg(target_endian = "little")]

//! The type system for Tessera.
//!
//! Record types are declared with [`schema!`] and reflected into a [`SchemaDescriptor`], an ordered
//! list of [`FieldDefinition`]s, by the [`SchemaRegistry`]. Every field has a [`FieldKind`] which
//! decides how it is stored by the engine and how the mapping layer dispatches reads and writes.

pub use field::*;
pub use kind::*;
pub use pvalue::*;
pub use registry::*;
pub use schema::*;

mod field;
mod kind;
mod pvalue;
mod registry;
mod schema;
