//! This crate provides the schema types that are used by the ebml-master crate.
//!
//! A schema describes which element classes exist in a format, which children are legal under each master class, and the mandatory/default/multiplicity rules that apply to those children.  The related ebml-master-schema-derive crate can be used to simplify declaring one.
//!

mod registry;

pub use registry::{is_valid_id, ChecksumPlacement, ChildRule, Context, SchemaBuilder, SchemaRegistry};

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

///
/// Id of the global "Void" element defined by RFC 8794.
///
pub const VOID_ID: u64 = 0xEC;

///
/// Id of the global "CRC-32" element defined by RFC 8794.
///
pub const CRC32_ID: u64 = 0xBF;

///
/// Different data types defined by RFC 8794.
///
/// # Notes
///
/// Dates are treated as Binary so that consumers have the option of parsing the unaltered data using their library of choice, if needed.
///
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum DataType {
    Master,
    UnsignedInt,
    Integer,
    Utf8,
    Binary,
    Float,
}

impl FromStr for DataType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Master" => Ok(DataType::Master),
            "UnsignedInt" => Ok(DataType::UnsignedInt),
            "Integer" => Ok(DataType::Integer),
            "Utf8" => Ok(DataType::Utf8),
            "Binary" => Ok(DataType::Binary),
            "Float" => Ok(DataType::Float),
            other => Err(SchemaError::UnknownDataType(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Master => "master",
            DataType::UnsignedInt => "unsigned int",
            DataType::Integer => "integer",
            DataType::Utf8 => "utf8",
            DataType::Binary => "binary",
            DataType::Float => "float",
        };
        f.write_str(name)
    }
}

///
/// A default value declared by a schema for a leaf element class.
///
#[derive(Clone, PartialEq, Debug)]
pub enum DefaultValue {
    UnsignedInt(u64),
    Integer(i64),
    Utf8(String),
    Binary(Vec<u8>),
    Float(f64),
}

impl DefaultValue {
    pub fn data_type(&self) -> DataType {
        match self {
            DefaultValue::UnsignedInt(_) => DataType::UnsignedInt,
            DefaultValue::Integer(_) => DataType::Integer,
            DefaultValue::Utf8(_) => DataType::Utf8,
            DefaultValue::Binary(_) => DataType::Binary,
            DefaultValue::Float(_) => DataType::Float,
        }
    }
}

///
/// Describes a single element class of a format.
///
/// Classes are declared with a builder style and handed to a [`SchemaBuilder`]:
///
/// ```
/// use ebml_master_schema::{DataType, DefaultValue, ElementClass, SchemaBuilder};
///
/// let schema = SchemaBuilder::new()
///     .element(ElementClass::new(0x1a45dfa3, "EBML", DataType::Master))
///     .element(ElementClass::new(0x4286, "EBMLVersion", DataType::UnsignedInt)
///         .parent(0x1a45dfa3)
///         .mandatory()
///         .default_value(DefaultValue::UnsignedInt(1)))
///     .build()
///     .expect("valid schema");
///
/// assert!(schema.is_root(0x1a45dfa3));
/// assert!(schema.allows(0x1a45dfa3, 0x4286));
/// ```
///
#[derive(Clone, PartialEq, Debug)]
pub struct ElementClass {
    pub id: u64,
    pub name: String,
    pub data_type: DataType,
    pub parent: Option<u64>,
    pub mandatory: bool,
    pub max_occurs: Option<usize>,
    pub default: Option<DefaultValue>,
    pub global: bool,
}

impl ElementClass {
    pub fn new(id: u64, name: &str, data_type: DataType) -> Self {
        ElementClass {
            id,
            name: name.to_string(),
            data_type,
            parent: None,
            mandatory: false,
            max_occurs: None,
            default: None,
            global: false,
        }
    }

    pub fn parent(mut self, parent: u64) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn max_occurs(mut self, max: usize) -> Self {
        self.max_occurs = Some(max);
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    ///
    /// Marks the class as global - legal as a child of every master element.
    ///
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

///
/// Problems found while building a [`SchemaRegistry`].
///
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("element id {0:#x} is declared more than once")]
    DuplicateId(u64),

    #[error("{0:#x} is not a valid EBML element id")]
    InvalidId(u64),

    #[error("element {id:#x} declares parent {parent:#x}, which is not in the schema")]
    MissingParent { id: u64, parent: u64 },

    #[error("element {id:#x} declares parent {parent:#x}, which is not a master element")]
    ParentNotMaster { id: u64, parent: u64 },

    #[error("parent chain of element {0:#x} is circular")]
    CircularParent(u64),

    #[error("default value of element {id:#x} is a {found}, expected {expected}")]
    DefaultMismatch { id: u64, expected: DataType, found: DataType },

    #[error("unknown data type \"{0}\"")]
    UnknownDataType(String),
}
