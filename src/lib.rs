//! This crate provides the master element engine for [EBML][EBML] files: reading nested elements into an owned tree, managing and looking up children, enforcing mandatory elements, computing sizes and rendering the tree back, optionally protected by a CRC-32.
//!
//! [EBML][EBML] stands for Extensible Binary Meta-Language and is somewhat of a
//! binary version of XML. It's used for container formats like [WebM][webm] or
//! [MKV][mkv].
//!
//! # Important - Schemas
//! The engine is format-agnostic and requires a [`schema::SchemaRegistry`] describing which element classes exist and where they may appear.  Registries are built once with a [`schema::SchemaBuilder`] (or the `easy_schema!` macro behind the `"derive-schema"` feature) and shared by `'static` reference.
//!
//! # Unknown sizes
//! Elements with an "Unknown Data Size" as defined in [RFC8794][rfc8794] are supported both ways.  When reading, an unknown sized master ends where an element belonging to an enclosing context begins.  When writing, [`MasterElement::set_size_infinite`] and [`MasterElement::write_head`] let a streaming writer announce a master before its children exist, and [`MasterElement::overwrite_head`] patches the real size in afterwards.
//!
//! [EBML]: http://ebml.sourceforge.net/
//! [webm]: https://www.webmproject.org/
//! [mkv]: http://www.matroska.org/technical/specs/index.html
//! [rfc8794]: https://datatracker.ietf.org/doc/rfc8794/
//!

mod checksum;
mod config;
mod element;
mod errors;
mod lookup;
mod master;
mod reader;
mod size;
mod stream;
pub mod schema;
pub mod tools;

pub use self::checksum::{ChecksumEngine, ChecksumWriter, CHECKSUM_ELEMENT_LENGTH};
pub use self::config::{AllowableErrors, ReadOptions, ReadScope, DEFAULT_MAX_DEPTH};
pub use self::element::{Element, LeafData, LeafElement};
pub use self::lookup::ChildValue;
pub use self::master::{MasterElement, MasterState, UpperElement};
pub use self::reader::ElementReader;
pub use self::size::ElementSize;
pub use self::stream::{ElementHeader, ElementSink, ElementStream};

pub mod error {
    //!
    //! Errors that can occur when reading, building or rendering element trees.
    //!
    pub use super::errors::master::{MasterError, StructuralError};
    pub use super::errors::tool::ToolError;
    pub use ebml_master_schema::SchemaError;
}
