//!
//! Provides the schema types that describe an EBML format.
//!
//! A schema is built once, before any element tree exists, and is shared as a `&'static SchemaRegistry` by every master element.  You can enable the `"derive-schema"` feature to obtain the `easy_schema!` macro, which declares a schema from a compact list of element paths.
//!

#[cfg(feature = "derive-schema")]
pub use ebml_master_schema_derive::easy_schema;

pub use ebml_master_schema::{ChecksumPlacement, ChildRule, Context, SchemaBuilder, SchemaRegistry};
pub use ebml_master_schema::{DataType, DefaultValue, ElementClass, SchemaError};
pub use ebml_master_schema::{CRC32_ID, VOID_ID};
