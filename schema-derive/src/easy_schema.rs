use std::collections::HashMap;
use std::str::FromStr;

use itertools::Itertools;
use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseBuffer, ParseStream};
use syn::punctuated::Punctuated;
use syn::{bracketed, Attribute, Error, Expr, Ident, LitInt, Result, Token, Visibility};

use ebml_master_schema::DataType;

use super::pathing::SchemaPath;

mod kw {
    syn::custom_keyword!(mandatory);
    syn::custom_keyword!(global);
    syn::custom_keyword!(default);
    syn::custom_keyword!(max);
}

pub struct EasySchema {
    attrs: Vec<Attribute>,
    visibility: Visibility,
    ident: Ident,
    entries: Punctuated<EasySchemaEntry, Token![,]>,
}

impl Parse for EasySchema {
    fn parse(input: ParseStream) -> Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let visibility: Visibility = input.parse()?;
        input.parse::<Token![fn]>()?;
        let ident = input.parse::<Ident>()?;
        let content: ParseBuffer;
        syn::braced!(content in input);
        let entries = content.parse_terminated(EasySchemaEntry::parse)?;
        Ok(Self {
            attrs,
            visibility,
            ident,
            entries,
        })
    }
}

enum EntryOption {
    Mandatory,
    Global,
    Default(Expr),
    Max(LitInt),
}

impl Parse for EntryOption {
    fn parse(input: ParseStream) -> Result<Self> {
        let lookahead = input.lookahead1();
        if lookahead.peek(kw::mandatory) {
            input.parse::<kw::mandatory>()?;
            Ok(EntryOption::Mandatory)
        } else if lookahead.peek(kw::global) {
            input.parse::<kw::global>()?;
            Ok(EntryOption::Global)
        } else if lookahead.peek(kw::default) {
            input.parse::<kw::default>()?;
            input.parse::<Token![=]>()?;
            Ok(EntryOption::Default(input.parse()?))
        } else if lookahead.peek(kw::max) {
            input.parse::<kw::max>()?;
            input.parse::<Token![=]>()?;
            Ok(EntryOption::Max(input.parse()?))
        } else {
            Err(lookahead.error())
        }
    }
}

pub struct EasySchemaEntry {
    path: SchemaPath,
    ty: Ident,
    id: LitInt,
    options: Vec<EntryOption>,
}

impl Parse for EasySchemaEntry {
    fn parse(input: ParseStream) -> Result<Self> {
        let path: SchemaPath = input.parse()?;
        input.parse::<Token![:]>()?;
        let ty: Ident = input.parse()?;
        input.parse::<Token![=]>()?;
        let id: LitInt = input.parse()?;
        let options = if input.peek(syn::token::Bracket) {
            let content;
            bracketed!(content in input);
            let options: Punctuated<EntryOption, Token![,]> = content.parse_terminated(EntryOption::parse)?;
            options.into_iter().collect()
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            ty,
            id,
            options,
        })
    }
}

struct CheckedEntry<'a> {
    entry: &'a EasySchemaEntry,
    id: u64,
    data_type: DataType,
}

impl EasySchema {
    pub fn implement(self) -> Result<TokenStream> {
        let EasySchema { attrs, visibility, ident, entries } = self;

        let mut checked = Vec::with_capacity(entries.len());
        for entry in &entries {
            let id: u64 = entry.id.base10_parse()?;
            if !ebml_master_schema::is_valid_id(id) {
                return Err(Error::new_spanned(&entry.id, format!("{:#x} is not a valid EBML element id", id)));
            }
            if id == ebml_master_schema::VOID_ID || id == ebml_master_schema::CRC32_ID {
                return Err(Error::new_spanned(&entry.id, "Void and CRC-32 are declared by every schema"));
            }
            let data_type = DataType::from_str(&entry.ty.to_string())
                .map_err(|_| Error::new_spanned(&entry.ty, "expected one of Master, UnsignedInt, Integer, Utf8, Binary, Float"))?;
            checked.push(CheckedEntry { entry, id, data_type });
        }

        if let Some((first, second)) = checked.iter().sorted_by_key(|it| it.id).tuple_windows().find(|(a, b)| a.id == b.id) {
            let mut err = Error::new_spanned(&second.entry.id, format!("duplicate id {} detected", second.entry.id));
            err.combine(Error::new_spanned(&first.entry.id, format!("{} already used by {}", first.entry.id, first.entry.path)));
            return Err(err);
        }

        let mut by_name: HashMap<String, &CheckedEntry> = HashMap::new();
        for it in &checked {
            let name = it.entry.path.name();
            if by_name.insert(name.to_string(), it).is_some() {
                return Err(Error::new_spanned(name, format!("element name {} is declared more than once", name)));
            }
        }

        let mut classes = Vec::with_capacity(checked.len());
        for it in &checked {
            let parent = match it.entry.path.parent() {
                Some(parent) => {
                    let parent_entry = by_name.get(&parent.to_string())
                        .ok_or_else(|| Error::new_spanned(parent, format!("parent {} is not declared", parent)))?;
                    if parent_entry.data_type != DataType::Master {
                        return Err(Error::new_spanned(parent, format!("parent {} must be of Master type", parent)));
                    }
                    if parent_entry.entry.path.to_string() != it.entry.path.parent_path() {
                        return Err(Error::new(it.entry.path.span(), format!("path does not match the declaration of {} ({})", parent, parent_entry.entry.path)));
                    }
                    Some(parent_entry.id)
                },
                None => None,
            };
            classes.push(class_tokens(it, parent)?);
        }

        Ok(quote!(
            #(#attrs)*
            #visibility fn #ident() -> &'static ebml_master::schema::SchemaRegistry {
                static SCHEMA: ::std::sync::OnceLock<ebml_master::schema::SchemaRegistry> = ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    ebml_master::schema::SchemaBuilder::new()
                        #(.element(#classes))*
                        .build()
                        .expect("easy_schema! validates the schema at compile time")
                })
            }
        ))
    }
}

fn class_tokens(it: &CheckedEntry, parent: Option<u64>) -> Result<TokenStream> {
    let id = it.id;
    let name = it.entry.path.name().to_string();
    let ty = &it.entry.ty;

    let mut modifiers = Vec::new();
    if let Some(parent) = parent {
        modifiers.push(quote!(.parent(#parent)));
    }
    for option in &it.entry.options {
        match option {
            EntryOption::Mandatory => modifiers.push(quote!(.mandatory())),
            EntryOption::Global => {
                if parent.is_some() {
                    return Err(Error::new(it.entry.path.span(), "global elements are declared without a parent path"));
                }
                modifiers.push(quote!(.global()));
            },
            EntryOption::Max(max) => modifiers.push(quote!(.max_occurs(#max))),
            EntryOption::Default(expr) => {
                let value = match it.data_type {
                    DataType::Master => return Err(Error::new_spanned(expr, "Master elements cannot declare a default value")),
                    DataType::UnsignedInt => quote!(ebml_master::schema::DefaultValue::UnsignedInt(#expr)),
                    DataType::Integer => quote!(ebml_master::schema::DefaultValue::Integer(#expr)),
                    DataType::Float => quote!(ebml_master::schema::DefaultValue::Float(#expr)),
                    DataType::Utf8 => quote!(ebml_master::schema::DefaultValue::Utf8(::std::string::String::from(#expr))),
                    DataType::Binary => quote!(ebml_master::schema::DefaultValue::Binary((#expr).to_vec())),
                };
                modifiers.push(quote!(.default_value(#value)));
            },
        }
    }

    Ok(quote!(
        ebml_master::schema::ElementClass::new(#id, #name, ebml_master::schema::DataType::#ty)
            #(#modifiers)*
    ))
}
