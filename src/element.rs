use std::io::{Read, Seek, SeekFrom, Write};

use ebml_master_schema::{DataType, DefaultValue, ElementClass, SchemaRegistry};

use super::config::ReadScope;
use super::errors::master::{MasterError, StructuralError};
use super::errors::tool::ToolError;
use super::master::MasterElement;
use super::size::ElementSize;
use super::stream::{ElementHeader, ElementSink, ElementStream};
use super::tools::{self, Vint};

///
/// The decoded value of a leaf element.
///
#[derive(Clone, PartialEq, Debug)]
pub enum LeafData {
    UnsignedInt(u64),
    Integer(i64),
    Utf8(String),
    Binary(Vec<u8>),
    Float(f64),

    ///
    /// A payload that was left in the stream by a lazy [`ReadScope`].  Only its location is known.
    ///
    Deferred {
        data_type: DataType,
        data_start: u64,
        size: u64,
    },
}

impl LeafData {
    pub fn data_type(&self) -> DataType {
        match self {
            LeafData::UnsignedInt(_) => DataType::UnsignedInt,
            LeafData::Integer(_) => DataType::Integer,
            LeafData::Utf8(_) => DataType::Utf8,
            LeafData::Binary(_) => DataType::Binary,
            LeafData::Float(_) => DataType::Float,
            LeafData::Deferred { data_type, .. } => *data_type,
        }
    }

    ///
    /// The zero value of a data type: `0`, `""`, or an empty binary.  `None` for masters.
    ///
    pub fn zero(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::Master => None,
            DataType::UnsignedInt => Some(LeafData::UnsignedInt(0)),
            DataType::Integer => Some(LeafData::Integer(0)),
            DataType::Utf8 => Some(LeafData::Utf8(String::new())),
            DataType::Binary => Some(LeafData::Binary(Vec::new())),
            DataType::Float => Some(LeafData::Float(0.0)),
        }
    }

    fn decode(id: u64, data_type: DataType, payload: Vec<u8>) -> Result<Self, MasterError> {
        let invalid = |source: ToolError| MasterError::InvalidValue { id, source };
        match data_type {
            DataType::UnsignedInt => Ok(LeafData::UnsignedInt(tools::arr_to_u64(&payload).map_err(invalid)?)),
            DataType::Integer => Ok(LeafData::Integer(tools::arr_to_i64(&payload).map_err(invalid)?)),
            DataType::Utf8 => Ok(LeafData::Utf8(String::from_utf8(payload).map_err(|source| invalid(ToolError::ReadUtf8 { source }))?)),
            DataType::Binary | DataType::Master => Ok(LeafData::Binary(payload)),
            DataType::Float => Ok(LeafData::Float(tools::arr_to_f64(&payload).map_err(invalid)?)),
        }
    }
}

impl From<&DefaultValue> for LeafData {
    fn from(value: &DefaultValue) -> Self {
        match value {
            DefaultValue::UnsignedInt(val) => LeafData::UnsignedInt(*val),
            DefaultValue::Integer(val) => LeafData::Integer(*val),
            DefaultValue::Utf8(val) => LeafData::Utf8(val.clone()),
            DefaultValue::Binary(val) => LeafData::Binary(val.clone()),
            DefaultValue::Float(val) => LeafData::Float(*val),
        }
    }
}

///
/// An element holding a single value.
///
/// Besides the value, a leaf remembers how it was laid out in the stream it was read from (size field width and payload width) so that it can be rendered back byte for byte when `keep_intact` is requested.
///
#[derive(Clone, Debug)]
pub struct LeafElement {
    id: u64,
    data: LeafData,
    position: Option<u64>,
    size_length: Option<usize>,
    payload_length: Option<u64>,
    dummy: bool,
}

impl PartialEq for LeafElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.data == other.data && self.dummy == other.dummy
    }
}

impl LeafElement {
    pub fn new(id: u64, data: LeafData) -> Self {
        LeafElement {
            id,
            data,
            position: None,
            size_length: None,
            payload_length: None,
            dummy: false,
        }
    }

    pub fn unsigned_int(id: u64, value: u64) -> Self {
        LeafElement::new(id, LeafData::UnsignedInt(value))
    }

    pub fn integer(id: u64, value: i64) -> Self {
        LeafElement::new(id, LeafData::Integer(value))
    }

    pub fn utf8(id: u64, value: &str) -> Self {
        LeafElement::new(id, LeafData::Utf8(value.to_string()))
    }

    pub fn binary(id: u64, value: &[u8]) -> Self {
        LeafElement::new(id, LeafData::Binary(value.to_vec()))
    }

    pub fn float(id: u64, value: f64) -> Self {
        LeafElement::new(id, LeafData::Float(value))
    }

    ///
    /// Creates a leaf holding the schema default of `class`, or the zero value of its type if no default is declared.
    ///
    pub fn with_default(class: &ElementClass) -> Option<Self> {
        let data = match &class.default {
            Some(default) => LeafData::from(default),
            None => LeafData::zero(class.data_type)?,
        };
        Some(LeafElement::new(class.id, data))
    }

    ///
    /// Creates an opaque element preserving the raw bytes of an id no schema context claims.
    ///
    pub fn dummy(id: u64, data: Vec<u8>) -> Self {
        LeafElement {
            dummy: true,
            ..LeafElement::new(id, LeafData::Binary(data))
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data(&self) -> &LeafData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut LeafData {
        &mut self.data
    }

    pub fn set_data(&mut self, data: LeafData) {
        self.data = data;
        self.payload_length = None;
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self.data, LeafData::Deferred { .. })
    }

    ///
    /// Stream offset of the element, once read or rendered.
    ///
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    ///
    /// Reads a deferred payload from `source`, which must be the stream (or a copy of it) the element was read from.
    ///
    /// Does nothing if the payload is already loaded.
    ///
    pub fn load<R: Read + Seek>(&mut self, source: &mut R) -> Result<(), MasterError> {
        if let LeafData::Deferred { data_type, data_start, size } = self.data {
            source.seek(SeekFrom::Start(data_start)).map_err(|source| MasterError::Io { source })?;
            let mut stream = ElementStream::with_offset(source, data_start);
            let payload = stream.read_payload(size)?;
            self.data = LeafData::decode(self.id, data_type, payload)?;
        }
        Ok(())
    }

    pub(crate) fn read<R: Read>(stream: &mut ElementStream<R>, header: &ElementHeader, data_type: DataType, scope: ReadScope) -> Result<Self, MasterError> {
        let size = header.size.known()
            .ok_or_else(|| MasterError::structural(header.position, StructuralError::UnknownSizeLeaf { id: header.id }))?;

        let defer = match scope {
            ReadScope::AllData => false,
            ReadScope::PartialData => data_type == DataType::Binary,
            ReadScope::NoData => true,
        };

        let data = if defer {
            stream.skip(size)?;
            LeafData::Deferred { data_type, data_start: header.data_start(), size }
        } else {
            LeafData::decode(header.id, data_type, stream.read_payload(size)?)?
        };

        Ok(LeafElement {
            id: header.id,
            data,
            position: Some(header.position),
            size_length: Some(header.size_length),
            payload_length: Some(size),
            dummy: false,
        })
    }

    pub(crate) fn read_dummy<R: Read>(stream: &mut ElementStream<R>, header: &ElementHeader, scope: ReadScope) -> Result<Self, MasterError> {
        let scope = if scope == ReadScope::NoData { ReadScope::NoData } else { ReadScope::AllData };
        let mut dummy = LeafElement::read(stream, header, DataType::Binary, scope)?;
        dummy.dummy = true;
        Ok(dummy)
    }

    fn preserved_width(&self, keep_intact: bool, minimal: usize) -> usize {
        match self.payload_length {
            Some(width) if keep_intact && width <= 8 && (minimal as u64) <= width => width as usize,
            _ => minimal,
        }
    }

    ///
    /// Binary form of the value.
    ///
    pub fn payload(&self, keep_intact: bool) -> Result<Vec<u8>, MasterError> {
        match &self.data {
            LeafData::UnsignedInt(val) => {
                let minimal = if keep_intact && *val == 0 && self.payload_length == Some(0) { 0 } else { tools::u64_length(*val) };
                Ok(tools::u64_to_arr(*val, self.preserved_width(keep_intact, minimal))?)
            },
            LeafData::Integer(val) => {
                let minimal = if keep_intact && *val == 0 && self.payload_length == Some(0) { 0 } else { tools::i64_length(*val) };
                Ok(tools::i64_to_arr(*val, self.preserved_width(keep_intact, minimal))?)
            },
            LeafData::Utf8(val) => Ok(val.as_bytes().to_vec()),
            LeafData::Binary(val) => Ok(val.clone()),
            LeafData::Float(val) => {
                let single = *val as f32;
                match self.payload_length {
                    Some(0) if keep_intact && *val == 0.0 => Ok(Vec::new()),
                    Some(4) if keep_intact && single as f64 == *val => Ok(single.to_be_bytes().to_vec()),
                    _ => Ok(val.to_be_bytes().to_vec()),
                }
            },
            LeafData::Deferred { .. } => Err(MasterError::DeferredPayload(self.id)),
        }
    }

    pub fn payload_length(&self, keep_intact: bool) -> Result<u64, MasterError> {
        match &self.data {
            LeafData::Utf8(val) => Ok(val.len() as u64),
            LeafData::Binary(val) => Ok(val.len() as u64),
            LeafData::Deferred { size, .. } => Ok(*size),
            _ => Ok(self.payload(keep_intact)?.len() as u64),
        }
    }

    pub(crate) fn encoded_length(&self, keep_intact: bool) -> Result<u64, MasterError> {
        let payload_length = self.payload_length(keep_intact)?;
        let size_length = size_field_length(self.size_length, payload_length, keep_intact)?;
        Ok(tools::id_length(self.id) as u64 + size_length as u64 + payload_length)
    }

    ///
    /// Writes the complete element (id, size and payload), returning the number of bytes written.
    ///
    pub fn render<W: Write>(&mut self, sink: &mut ElementSink<W>, keep_intact: bool) -> Result<u64, MasterError> {
        let payload = self.payload(keep_intact)?;
        let size_length = size_field_length(self.size_length, payload.len() as u64, keep_intact)?;
        let id = tools::id_to_bytes(self.id);

        self.position = Some(sink.position());
        sink.write_all(&id)?;
        sink.write_all(&(payload.len() as u64).as_vint_with_length(size_length)?)?;
        sink.write_all(&payload)?;

        self.size_length = Some(size_length);
        self.payload_length = Some(payload.len() as u64);
        Ok((id.len() + size_length + payload.len()) as u64)
    }

    ///
    /// Same bytes as [`LeafElement::render`], without recording the layout.  String and binary payloads are written in place.
    ///
    pub(crate) fn write_to<W: Write>(&self, dest: &mut W, keep_intact: bool) -> Result<u64, MasterError> {
        let payload_length = self.payload_length(keep_intact)?;
        let size_length = size_field_length(self.size_length, payload_length, keep_intact)?;
        let id = tools::id_to_bytes(self.id);

        dest.write_all(&id)?;
        dest.write_all(&payload_length.as_vint_with_length(size_length)?)?;
        match &self.data {
            LeafData::Utf8(val) => dest.write_all(val.as_bytes())?,
            LeafData::Binary(val) => dest.write_all(val)?,
            _ => dest.write_all(&self.payload(keep_intact)?)?,
        }
        Ok(id.len() as u64 + size_length as u64 + payload_length)
    }
}

///
/// Width of the size field for a payload of `size` bytes.  `keep_intact` keeps a previously used width when the value still fits.
///
pub(crate) fn size_field_length(previous: Option<usize>, size: u64, keep_intact: bool) -> Result<usize, MasterError> {
    let minimal = tools::vint_length(size)?;
    match previous {
        Some(width) if keep_intact && width >= minimal && width <= tools::MAX_SIZE_LENGTH => Ok(width),
        _ => Ok(minimal),
    }
}

///
/// A node of an element tree: either a leaf holding a value or a master holding children.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Leaf(LeafElement),
    Master(MasterElement),
}

impl From<LeafElement> for Element {
    fn from(leaf: LeafElement) -> Self {
        Element::Leaf(leaf)
    }
}

impl From<MasterElement> for Element {
    fn from(master: MasterElement) -> Self {
        Element::Master(master)
    }
}

impl Element {
    ///
    /// Creates a default instance of the class `id`: an empty master, or a leaf holding the schema default (zero if none is declared).
    ///
    pub fn new(schema: &'static SchemaRegistry, id: u64) -> Result<Self, MasterError> {
        let class = schema.class(id).ok_or(MasterError::UnknownClass(id))?;
        match LeafElement::with_default(class) {
            Some(leaf) => Ok(Element::Leaf(leaf)),
            None => Ok(Element::Master(MasterElement::new(schema, id)?)),
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Element::Leaf(leaf) => leaf.id(),
            Element::Master(master) => master.id(),
        }
    }

    pub fn position(&self) -> Option<u64> {
        match self {
            Element::Leaf(leaf) => leaf.position(),
            Element::Master(master) => master.position(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Element::Leaf(leaf) => leaf.data_type(),
            Element::Master(_) => DataType::Master,
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Element::Master(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafElement> {
        match self {
            Element::Leaf(leaf) => Some(leaf),
            Element::Master(_) => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafElement> {
        match self {
            Element::Leaf(leaf) => Some(leaf),
            Element::Master(_) => None,
        }
    }

    pub fn as_master(&self) -> Option<&MasterElement> {
        match self {
            Element::Master(master) => Some(master),
            Element::Leaf(_) => None,
        }
    }

    pub fn as_master_mut(&mut self) -> Option<&mut MasterElement> {
        match self {
            Element::Master(master) => Some(master),
            Element::Leaf(_) => None,
        }
    }

    ///
    /// Payload size of the element.  Masters report their last computed size, which is `Unknown` in streaming mode.
    ///
    pub fn size(&self) -> Result<ElementSize, MasterError> {
        match self {
            Element::Leaf(leaf) => Ok(ElementSize::Known(leaf.payload_length(true)?)),
            Element::Master(master) => Ok(master.size()),
        }
    }

    ///
    /// Number of bytes [`Element::render`] will write with the same flags.
    ///
    pub fn encoded_length(&mut self, keep_intact: bool, force_render: bool) -> Result<u64, MasterError> {
        match self {
            Element::Leaf(leaf) => leaf.encoded_length(keep_intact),
            Element::Master(master) => master.encoded_length(keep_intact, force_render),
        }
    }

    ///
    /// Writes the complete element, returning the number of bytes written.
    ///
    pub fn render<W: Write>(&mut self, sink: &mut ElementSink<W>, keep_intact: bool, force_render: bool) -> Result<u64, MasterError> {
        match self {
            Element::Leaf(leaf) => leaf.render(sink, keep_intact),
            Element::Master(master) => master.render(sink, keep_intact, force_render),
        }
    }

    pub(crate) fn computed_length(&self, keep_intact: bool) -> Result<u64, MasterError> {
        match self {
            Element::Leaf(leaf) => leaf.encoded_length(keep_intact),
            Element::Master(master) => master.computed_length(keep_intact),
        }
    }

    pub(crate) fn write_to<W: Write>(&self, dest: &mut W, keep_intact: bool) -> Result<u64, MasterError> {
        match self {
            Element::Leaf(leaf) => leaf.write_to(dest, keep_intact),
            Element::Master(master) => master.write_to(dest, keep_intact),
        }
    }
}
