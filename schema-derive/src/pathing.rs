use proc_macro2::Span;
use syn::{punctuated::Punctuated, Token, parse::{Parse, ParseStream}, Ident, Result};
use syn::spanned::Spanned;

///
/// The document path of an element, e.g. `Segment/Info/Title`.  The last part names the element itself.
///
pub struct SchemaPath {
    pub parts: Punctuated<Ident, Token![/]>,
}

impl Parse for SchemaPath {
    fn parse(input: ParseStream) -> Result<Self> {
        let parts: Punctuated<Ident, Token![/]> = Punctuated::parse_separated_nonempty(input)?;
        Ok(Self { parts })
    }
}

impl SchemaPath {
    pub fn span(&self) -> Span {
        self.parts.span()
    }

    pub fn name(&self) -> &Ident {
        // parse_separated_nonempty guarantees at least one part
        &self.parts[self.parts.len() - 1]
    }

    pub fn parent(&self) -> Option<&Ident> {
        if self.parts.len() > 1 {
            Some(&self.parts[self.parts.len() - 2])
        } else {
            None
        }
    }

    ///
    /// The path of the parent element, as it would be written in its own declaration.
    ///
    pub fn parent_path(&self) -> String {
        self.parts.iter().take(self.parts.len() - 1).map(Ident::to_string).collect::<Vec<_>>().join("/")
    }
}

impl std::fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.parts.iter().map(Ident::to_string).collect();
        write!(f, "{}", parts.join("/"))
    }
}
