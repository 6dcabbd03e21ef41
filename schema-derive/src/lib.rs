extern crate proc_macro;

mod easy_schema;
mod pathing;

use proc_macro::TokenStream;
use syn::Error;
use crate::easy_schema::EasySchema;

///
/// Macro that makes declaring an EBML schema easy.
///
/// The macro expands to a function returning a `&'static SchemaRegistry` that is built the first time the function is called.  Every element is written on one line as its document path, its data type and its id, optionally followed by a bracketed list of options:
///   * __mandatory__ - the element must be present at least once under its parent
///   * __default = `expr`__ - the default value of a leaf element; the expression must have the Rust type matching the data type (`u64`, `i64`, `f64`, something a `String` can be made from, or a byte slice)
///   * __max = `n`__ - the element may appear at most `n` times under its parent
///   * __global__ - the element is legal under every master element; globals are declared without a parent
///
/// Elements without a parent are the root elements of the format.  The EBML global elements `Void` and `CRC-32` are always declared and must not be repeated.  Sibling order under a master follows the order of declaration.
///
/// Ids, data types, duplicate ids and names, and the parent hierarchy are checked at compile time.
///
/// ```
/// # pub mod ebml_master { pub mod schema {
/// #    pub use ebml_master_schema::{DataType, DefaultValue, ElementClass, SchemaBuilder, SchemaRegistry};
/// # }}
/// use ebml_master_schema_derive::easy_schema;
///
/// easy_schema! {
///     pub fn example {
///         Ebml                : Master = 0x1a45dfa3,
///         Ebml/EbmlVersion    : UnsignedInt = 0x4286 [mandatory, default = 1],
///         Ebml/DocType        : Utf8 = 0x4282 [mandatory, default = "matroska", max = 1],
///     }
/// }
///
/// assert!(example().is_root(0x1a45dfa3));
/// assert_eq!(Some(0x1a45dfa3), example().parent_of(0x4282));
/// ```
///
#[proc_macro]
pub fn easy_schema(input: TokenStream) -> TokenStream {
    let input = match syn::parse::<EasySchema>(input) {
        Ok(syntax_tree) => syntax_tree,
        Err(err) => {
            return TokenStream::from(Error::new(err.span(), "easy_schema! {} content must be of format: fn name {\
                Root: Type = id,\
                Path/Of/Component: Type = id [options],\
                // example\
                Ebml: Master = 0x1a45dfa3,\
                Ebml/EbmlVersion: UnsignedInt = 0x4286 [mandatory, default = 1],\
            }").to_compile_error())
        },
    };

    input.implement().unwrap_or_else(|err| err.to_compile_error()).into()
}
