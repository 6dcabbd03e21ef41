use std::fmt;
use std::io::{Read, Seek, Write};

use log::{debug, warn};
use ebml_master_schema::{ChecksumPlacement, DataType, SchemaRegistry, CRC32_ID};

use super::checksum::{ChecksumEngine, ChecksumWriter, CHECKSUM_ELEMENT_LENGTH};
use super::config::ReadOptions;
use super::element::{size_field_length, Element, LeafElement};
use super::errors::master::{MasterError, StructuralError};
use super::size::ElementSize;
use super::stream::{ElementHeader, ElementSink, ElementStream};
use super::tools::{self, Vint};

///
/// Lifecycle of a [`MasterElement`].
///
/// Any mutation made through the master's `&mut` api drops a finalized element back to `Populated` (or `Empty`).  The size is never recomputed behind the caller's back: call [`MasterElement::update_size`] again before rendering a header.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MasterState {
    Empty,
    Populated,
    SizeFinalized,
    Rendered,
}

///
/// An element that [`MasterElement::read`] could not place inside the master it was reading.
///
/// In both cases the header has already been consumed from the stream and the payload has not.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpperElement {
    ///
    /// The element belongs to an enclosing master.  `levels` counts how far up: `1` is the parent of the master that was read, and one more than the depth of the schema hierarchy means a root element.
    ///
    Ancestor { header: ElementHeader, levels: usize },

    ///
    /// No enclosing context claims the element and dummy wrapping is disabled.  `depth` is the nesting level of the master that stopped on it.
    ///
    Unclaimed { header: ElementHeader, depth: usize },
}

impl UpperElement {
    pub fn header(&self) -> &ElementHeader {
        match self {
            UpperElement::Ancestor { header, .. } => header,
            UpperElement::Unclaimed { header, .. } => header,
        }
    }
}

///
/// A container element: an ordered list of owned children bound to the schema context of its class.
///
/// Children are dropped with their master.  The CRC-32 pseudo-element is not kept in the child list; it is controlled through [`MasterElement::enable_checksum`] and counted in the size and rendered bytes whenever checksumming is enabled.
///
#[derive(Clone)]
pub struct MasterElement {
    id: u64,
    schema: &'static SchemaRegistry,
    children: Vec<Element>,
    position: Option<u64>,
    size_length: Option<usize>,
    size: ElementSize,
    finite: bool,
    state: MasterState,
    intact_size: bool,
    checksum: Option<ChecksumEngine>,
}

impl fmt::Debug for MasterElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterElement")
            .field("id", &format_args!("{:#x}", self.id))
            .field("size", &self.size)
            .field("state", &self.state)
            .field("checksum", &self.checksum)
            .field("children", &self.children)
            .finish()
    }
}

impl PartialEq for MasterElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.finite == other.finite
            && self.checksum.is_some() == other.checksum.is_some()
            && self.children == other.children
    }
}

impl<'a> IntoIterator for &'a MasterElement {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

impl MasterElement {
    ///
    /// Creates an empty master of class `id`.
    ///
    /// # Errors
    ///
    /// Fails if `id` is not declared in `schema` or is not a master class.
    ///
    pub fn new(schema: &'static SchemaRegistry, id: u64) -> Result<Self, MasterError> {
        match schema.data_type(id) {
            Some(DataType::Master) => Ok(MasterElement {
                id,
                schema,
                children: Vec::new(),
                position: None,
                size_length: None,
                size: ElementSize::Known(0),
                finite: true,
                state: MasterState::Empty,
                intact_size: false,
                checksum: None,
            }),
            Some(found) => Err(MasterError::ClassMismatch { id, expected: DataType::Master, found }),
            None => Err(MasterError::UnknownClass(id)),
        }
    }

    ///
    /// Creates an empty master for a header that was just read.  The stream must be left at the start of the payload so that [`MasterElement::read`] can follow.
    ///
    pub fn from_header(schema: &'static SchemaRegistry, header: &ElementHeader) -> Result<Self, MasterError> {
        let mut master = MasterElement::new(schema, header.id)?;
        master.position = Some(header.position);
        master.size_length = Some(header.size_length);
        master.size = header.size;
        master.finite = header.size.is_known();
        Ok(master)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn schema(&self) -> &'static SchemaRegistry {
        self.schema
    }

    ///
    /// Stream offset of the element, once read or written.
    ///
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    ///
    /// Stream offset of the first child: position plus the widths of the id and size fields.  `None` until the header has been read or written.
    ///
    pub fn data_start(&self) -> Option<u64> {
        Some(self.position? + tools::id_length(self.id) as u64 + self.size_length? as u64)
    }

    ///
    /// The payload size as last read or computed.  Only trustworthy in the `SizeFinalized` and `Rendered` states.
    ///
    pub fn size(&self) -> ElementSize {
        self.size
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    pub fn is_finite_size(&self) -> bool {
        self.finite
    }

    ///
    /// Switches the element in or out of streaming mode.  An infinite element is written with the "unknown size" sentinel.
    ///
    pub fn set_size_infinite(&mut self, infinite: bool) {
        self.finite = !infinite;
        if infinite {
            self.size = ElementSize::Unknown;
        } else if !self.size.is_known() {
            self.size = ElementSize::Known(0);
        }
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.state = if self.children.is_empty() { MasterState::Empty } else { MasterState::Populated };
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    ///
    /// A master holds its default value when it has no children.
    ///
    pub fn is_default_value(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.children.iter()
    }

    ///
    /// Mutable access to every child.  The finalized size is invalidated.
    ///
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Element> {
        self.invalidate();
        self.children.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Element> {
        self.children.get(index)
    }

    ///
    /// Mutable access to a child.  The finalized size is invalidated.
    ///
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Element> {
        self.invalidate();
        self.children.get_mut(index)
    }

    ///
    /// Index of `element` in the child list, compared by identity rather than by value.
    ///
    pub fn position_of(&self, element: &Element) -> Option<usize> {
        self.children.iter().position(|child| std::ptr::eq(child, element))
    }

    ///
    /// Moves `element` into the child list at `position`, shifting later children back.
    ///
    /// Schema legality is not checked here; see [`MasterElement::check_mandatory`] and [`MasterElement::check_multiplicity`].
    ///
    /// # Errors
    ///
    /// Returns [`MasterError::InsertionRejected`] and leaves the list untouched if `position` is past the end of the list or if `element` is a CRC-32 element (use [`MasterElement::enable_checksum`] instead).
    ///
    pub fn insert(&mut self, element: impl Into<Element>, position: usize) -> Result<(), MasterError> {
        let element = element.into();
        if position > self.children.len() {
            return Err(MasterError::InsertionRejected(format!("position {} is past the end of {} children", position, self.children.len())));
        }
        if element.id() == CRC32_ID {
            return Err(MasterError::InsertionRejected(String::from("the CRC-32 element is controlled by enable_checksum")));
        }
        self.children.insert(position, element);
        self.invalidate();
        Ok(())
    }

    ///
    /// Inserts `element` in front of the first child matching `before`.  To insert in front of a child you hold a reference to, pass its index from [`MasterElement::position_of`] to [`MasterElement::insert`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`MasterError::InsertionRejected`] and leaves the list untouched if no child matches, or for the reasons listed on [`MasterElement::insert`].
    ///
    pub fn insert_before(&mut self, element: impl Into<Element>, before: impl Fn(&Element) -> bool) -> Result<(), MasterError> {
        match self.children.iter().position(before) {
            Some(position) => self.insert(element, position),
            None => Err(MasterError::InsertionRejected(String::from("no child matches the insertion point"))),
        }
    }

    pub fn push(&mut self, element: impl Into<Element>) -> Result<(), MasterError> {
        self.insert(element, self.children.len())
    }

    ///
    /// Removes the child at `index` and hands it back, keeping the order of the others.
    ///
    pub fn remove(&mut self, index: usize) -> Option<Element> {
        if index >= self.children.len() {
            return None;
        }
        let element = self.children.remove(index);
        self.invalidate();
        Some(element)
    }

    pub fn remove_all(&mut self) {
        self.children.clear();
        self.invalidate();
    }

    ///
    /// Stable sort of the children by the sibling order of this class's schema context.  Children the context doesn't declare (globals, dummies) end up last.
    ///
    pub fn sort(&mut self) {
        let schema = self.schema;
        if let Some(context) = schema.context(self.id) {
            self.children.sort_by_key(|child| context.priority(child.id()));
        }
        self.invalidate();
    }

    pub fn find_first(&self, id: u64) -> Option<&Element> {
        self.children.iter().find(|child| child.id() == id)
    }

    ///
    /// Returns the first child of class `id`.  If there is none and `create_if_missing` is set, a default instance is appended and returned.
    ///
    pub fn find_first_mut(&mut self, id: u64, create_if_missing: bool) -> Result<Option<&mut Element>, MasterError> {
        match self.children.iter().position(|child| child.id() == id) {
            Some(index) => {
                self.invalidate();
                Ok(self.children.get_mut(index))
            },
            None if create_if_missing => self.add_new(id).map(Some),
            None => Ok(None),
        }
    }

    ///
    /// Returns the next child of the same class as `after`, which must be one of this master's children.
    ///
    pub fn find_next(&self, after: &Element) -> Option<&Element> {
        let start = self.position_of(after)?;
        self.children[start + 1..].iter().find(|child| child.id() == after.id())
    }

    ///
    /// Returns the next child of the same class as the child at index `after`, appending a default instance if there is none and `create_if_missing` is set.
    ///
    /// Returns `Ok(None)` if `after` is out of range.
    ///
    pub fn find_next_mut(&mut self, after: usize, create_if_missing: bool) -> Result<Option<&mut Element>, MasterError> {
        let id = match self.children.get(after) {
            Some(child) => child.id(),
            None => return Ok(None),
        };
        match self.children.iter().skip(after + 1).position(|child| child.id() == id) {
            Some(offset) => {
                self.invalidate();
                Ok(self.children.get_mut(after + 1 + offset))
            },
            None if create_if_missing => self.add_new(id).map(Some),
            None => Ok(None),
        }
    }

    ///
    /// Appends a default instance of class `id`, whether or not one already exists.
    ///
    pub fn add_new(&mut self, id: u64) -> Result<&mut Element, MasterError> {
        let element = Element::new(self.schema, id)?;
        self.push(element)?;
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    fn count_of(&self, id: u64) -> usize {
        self.children.iter().filter(|child| child.id() == id).count()
    }

    ///
    /// Returns whether every mandatory child class of this master's context has at least one direct child.  Nested masters are not checked.
    ///
    pub fn check_mandatory(&self) -> bool {
        match self.schema.context(self.id) {
            Some(context) => context.children().iter()
                .filter(|rule| rule.mandatory)
                .all(|rule| self.count_of(rule.id) > 0),
            None => true,
        }
    }

    ///
    /// Appends a default child for every mandatory class that declares a default value and has no instance yet.  Returns how many children were added, so a second call returns `0`.
    ///
    pub fn process_mandatory(&mut self) -> Result<usize, MasterError> {
        let schema = self.schema;
        let Some(context) = schema.context(self.id) else {
            return Ok(0);
        };

        let mut added = 0;
        for rule in context.children().iter().filter(|rule| rule.mandatory && rule.has_default) {
            if self.count_of(rule.id) == 0 {
                self.add_new(rule.id)?;
                added += 1;
            }
        }
        Ok(added)
    }

    ///
    /// Lists every mandatory child class that is missing, in this master and in every nested master.
    ///
    pub fn find_all_missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if let Some(context) = self.schema.context(self.id) {
            for rule in context.children().iter().filter(|rule| rule.mandatory) {
                if self.count_of(rule.id) == 0 {
                    missing.push(format!("Missing element \"{}\" in master \"{}\"", self.schema.name(rule.id), self.schema.name(self.id)));
                }
            }
        }
        for child in self.children.iter().filter_map(Element::as_master) {
            missing.extend(child.find_all_missing());
        }
        missing
    }

    ///
    /// Like [`MasterElement::find_all_missing`], but fails with [`MasterError::SchemaViolation`] if anything is missing.
    ///
    pub fn ensure_mandatory(&self) -> Result<(), MasterError> {
        let missing = self.find_all_missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MasterError::SchemaViolation { missing })
        }
    }

    ///
    /// Returns whether no child class occurs more often than its context allows.
    ///
    pub fn check_multiplicity(&self) -> bool {
        match self.schema.context(self.id) {
            Some(context) => context.children().iter()
                .all(|rule| rule.max_occurs.map_or(true, |max| self.count_of(rule.id) <= max)),
            None => true,
        }
    }

    ///
    /// Turns checksumming on or off.  The CRC-32 element counts towards the size, so a finalized size is invalidated.
    ///
    pub fn enable_checksum(&mut self, enabled: bool) {
        if enabled {
            self.checksum.get_or_insert_with(ChecksumEngine::new);
        } else {
            self.checksum = None;
        }
        self.invalidate();
    }

    pub fn has_checksum(&self) -> bool {
        self.checksum.is_some()
    }

    ///
    /// The stored checksum: from the last render, or as read from the stream.
    ///
    pub fn crc32(&self) -> Option<u32> {
        self.checksum.as_ref().map(ChecksumEngine::value)
    }

    ///
    /// Enables checksumming with a stored value of `value`, as though it had been read from a stream.  The next render replaces it with a computed value.
    ///
    pub fn force_checksum(&mut self, value: u32) {
        match self.checksum.as_mut() {
            Some(engine) => engine.force(value),
            None => {
                self.checksum = Some(ChecksumEngine::with_value(value));
                self.invalidate();
            },
        }
    }

    ///
    /// Recomputes the CRC-32 of the children as they would be rendered with their read layout preserved and compares it with the stored value.
    ///
    /// Nothing is modified.  Returns `true` if checksumming is disabled.
    ///
    /// # Errors
    ///
    /// Rendering fails on children whose payload was deferred and never loaded.
    ///
    pub fn verify_checksum(&self) -> Result<bool, MasterError> {
        match &self.checksum {
            Some(engine) => Ok(self.compute_checksum(true)? == engine.value()),
            None => Ok(true),
        }
    }

    ///
    /// Like [`MasterElement::verify_checksum`], but reports a mismatch as [`MasterError::ChecksumMismatch`].
    ///
    pub fn check_checksum(&self) -> Result<(), MasterError> {
        if let Some(engine) = &self.checksum {
            let computed = self.compute_checksum(true)?;
            if computed != engine.value() {
                return Err(MasterError::ChecksumMismatch { id: self.id, stored: engine.value(), computed });
            }
        }
        Ok(())
    }

    fn compute_checksum(&self, keep_intact: bool) -> Result<u32, MasterError> {
        let mut writer = ChecksumWriter::new();
        for child in self.children.iter() {
            child.write_to(&mut writer, keep_intact)?;
        }
        Ok(writer.finalize())
    }

    ///
    /// Payload size counted from the children as they are now, ignoring and leaving alone the cached size.
    ///
    fn computed_size(&self, keep_intact: bool) -> Result<u64, MasterError> {
        let mut total = if self.checksum.is_some() { CHECKSUM_ELEMENT_LENGTH } else { 0 };
        for child in self.children.iter() {
            total += child.computed_length(keep_intact)?;
        }
        Ok(total)
    }

    pub(crate) fn computed_length(&self, keep_intact: bool) -> Result<u64, MasterError> {
        let size = self.computed_size(keep_intact)?;
        Ok(tools::id_length(self.id) as u64 + self.head_width(size, keep_intact)? as u64 + size)
    }

    fn head_width(&self, size: u64, keep_intact: bool) -> Result<usize, MasterError> {
        if self.finite {
            return size_field_length(self.size_length, size, keep_intact);
        }
        match self.size_length {
            Some(width) if keep_intact => Ok(width),
            _ => Ok(tools::UNKNOWN_SIZE.len()),
        }
    }

    ///
    /// Serializes the element the way [`MasterElement::render`] with `force_render` would, but through a shared reference: sizes and checksums are computed on the fly and nothing cached is updated.
    ///
    pub(crate) fn write_to<W: Write>(&self, dest: &mut W, keep_intact: bool) -> Result<u64, MasterError> {
        let size = self.computed_size(keep_intact)?;
        let width = self.head_width(size, keep_intact)?;
        let head = encode_head(self.id, if self.finite { Some(size) } else { None }, width)?;
        dest.write_all(&head)?;

        let placement = self.schema.checksum_placement();
        let checksum = match self.checksum {
            Some(_) => Some(ChecksumEngine::element_bytes(self.compute_checksum(keep_intact)?)),
            None => None,
        };
        if let (Some(element), ChecksumPlacement::First) = (&checksum, placement) {
            dest.write_all(element)?;
        }
        for child in self.children.iter() {
            child.write_to(dest, keep_intact)?;
        }
        if let (Some(element), ChecksumPlacement::Last) = (&checksum, placement) {
            dest.write_all(element)?;
        }
        Ok(head.len() as u64 + size)
    }

    fn is_size_current(&self, keep_intact: bool) -> bool {
        matches!(self.state, MasterState::SizeFinalized | MasterState::Rendered) && self.intact_size == keep_intact
    }

    ///
    /// Sum of the encoded lengths of every child, plus the CRC-32 element if enabled.
    ///
    fn data_size(&mut self, keep_intact: bool, force_render: bool) -> Result<u64, MasterError> {
        if let ElementSize::Known(size) = self.size {
            if self.finite && !force_render && self.is_size_current(keep_intact) {
                return Ok(size);
            }
        }

        let mut total = 0;
        for child in self.children.iter_mut() {
            total += child.encoded_length(keep_intact, force_render)?;
        }
        if self.checksum.is_some() {
            total += CHECKSUM_ELEMENT_LENGTH;
        }
        Ok(total)
    }

    ///
    /// Computes the payload size from the children, recursing into nested masters, and moves the element to `SizeFinalized`.
    ///
    /// A master in streaming mode keeps the `Unknown` size.  A size finalized with the same `keep_intact` flag is reused unless `force_render` is set.
    ///
    pub fn update_size(&mut self, keep_intact: bool, force_render: bool) -> Result<ElementSize, MasterError> {
        if !self.finite {
            self.size = ElementSize::Unknown;
            self.intact_size = keep_intact;
            self.state = MasterState::SizeFinalized;
            return Ok(self.size);
        }
        if !force_render && self.is_size_current(keep_intact) && self.size.is_known() {
            return Ok(self.size);
        }

        let size = self.data_size(keep_intact, force_render)?;
        self.size = ElementSize::Known(size);
        self.intact_size = keep_intact;
        self.state = MasterState::SizeFinalized;
        Ok(self.size)
    }

    fn size_field_width(&self, keep_intact: bool) -> Result<usize, MasterError> {
        match self.size {
            ElementSize::Known(size) if self.finite => size_field_length(self.size_length, size, keep_intact),
            _ => match self.size_length {
                Some(width) if keep_intact => Ok(width),
                _ => Ok(tools::UNKNOWN_SIZE.len()),
            },
        }
    }

    ///
    /// Number of bytes [`MasterElement::render`] will write with the same flags.
    ///
    pub(crate) fn encoded_length(&mut self, keep_intact: bool, force_render: bool) -> Result<u64, MasterError> {
        self.update_size(keep_intact, force_render)?;
        let data_size = match self.size {
            ElementSize::Known(size) => size,
            ElementSize::Unknown => self.data_size(keep_intact, force_render)?,
        };
        Ok(tools::id_length(self.id) as u64 + self.size_field_width(keep_intact)? as u64 + data_size)
    }

    fn head_bytes(&self, width: usize) -> Result<Vec<u8>, MasterError> {
        match self.size {
            ElementSize::Known(size) if self.finite => encode_head(self.id, Some(size), width),
            _ => encode_head(self.id, None, width),
        }
    }

    ///
    /// Writes only the id and size fields of this element.
    ///
    /// The size written is the current one: call [`MasterElement::update_size`] first, or switch to streaming mode with [`MasterElement::set_size_infinite`] to announce an unknown size.  `size_length` forces the width of the size field, which lets a streaming writer reserve room to patch in the real size later with [`MasterElement::overwrite_head`].
    ///
    pub fn write_head<W: Write>(&mut self, sink: &mut ElementSink<W>, size_length: Option<usize>, keep_intact: bool) -> Result<u64, MasterError> {
        let width = match size_length {
            Some(width) => width,
            None => self.size_field_width(keep_intact)?,
        };
        let head = self.head_bytes(width)?;

        self.position = Some(sink.position());
        sink.write_all(&head)?;
        self.size_length = Some(width);
        Ok(head.len() as u64)
    }

    ///
    /// Rewrites the header written by [`MasterElement::write_head`] in place with the current size, keeping the size field width.
    ///
    /// # Errors
    ///
    /// Fails if no header was written yet, or if the current size doesn't fit the width that was used.
    ///
    pub fn overwrite_head<W: Write + Seek>(&mut self, sink: &mut ElementSink<W>) -> Result<u64, MasterError> {
        let (position, width) = match (self.position, self.size_length) {
            (Some(position), Some(width)) => (position, width),
            _ => return Err(MasterError::HeadNotWritten(self.id)),
        };
        let head = self.head_bytes(width)?;
        sink.patch(position, &head)?;
        Ok(head.len() as u64)
    }

    ///
    /// Writes every child in list order, and the CRC-32 element if checksumming is enabled.  Returns the number of bytes written.
    ///
    /// Missing mandatory children are not added: the tree is written as it is.  Only a master whose size was finalized moves to `Rendered`; otherwise the state is left alone so the next [`MasterElement::update_size`] still counts the children.
    ///
    pub fn render_data<W: Write>(&mut self, sink: &mut ElementSink<W>, force_render: bool, keep_intact: bool) -> Result<u64, MasterError> {
        let written = if self.checksum.is_some() {
            let placement = self.schema.checksum_placement();
            let offset = match placement {
                ChecksumPlacement::First => sink.position() + CHECKSUM_ELEMENT_LENGTH,
                ChecksumPlacement::Last => sink.position(),
            };

            let mut buffer = ElementSink::with_offset(Vec::new(), offset);
            for child in self.children.iter_mut() {
                child.render(&mut buffer, keep_intact, force_render)?;
            }
            let data = buffer.into_inner();

            let mut crc = 0;
            if let Some(engine) = self.checksum.as_mut() {
                engine.update(&data);
                crc = engine.finalize();
            }
            let element = ChecksumEngine::element_bytes(crc);
            match placement {
                ChecksumPlacement::First => {
                    sink.write_all(&element)?;
                    sink.write_all(&data)?;
                },
                ChecksumPlacement::Last => {
                    sink.write_all(&data)?;
                    sink.write_all(&element)?;
                },
            }
            data.len() as u64 + CHECKSUM_ELEMENT_LENGTH
        } else {
            let mut written = 0;
            for child in self.children.iter_mut() {
                written += child.render(sink, keep_intact, force_render)?;
            }
            written
        };

        if matches!(self.state, MasterState::SizeFinalized | MasterState::Rendered) {
            self.state = MasterState::Rendered;
        }
        Ok(written)
    }

    ///
    /// Writes the complete element: computes the size, writes the header and then the children.  Returns the number of bytes written.
    ///
    pub fn render<W: Write>(&mut self, sink: &mut ElementSink<W>, keep_intact: bool, force_render: bool) -> Result<u64, MasterError> {
        self.update_size(keep_intact, force_render)?;
        let head = self.write_head(sink, None, keep_intact)?;
        let data = self.render_data(sink, force_render, keep_intact)?;
        Ok(head + data)
    }

    ///
    /// Reads the children of this master from `stream`, which must be positioned at the start of its payload (see [`MasterElement::from_header`]).  Any existing children are replaced.
    ///
    /// Reading stops at the end of the declared size.  An unknown sized master stops at the end of the source, at the end of the nearest enclosing master with a known size, or at the first element that belongs to an enclosing context.  Such an element is handed back as an [`UpperElement`] so the caller can continue at the right level.
    ///
    /// # Errors
    ///
    /// Structural problems (truncation, bad fields, oversized children, nesting deeper than [`ReadOptions::max_depth`]) and undecodable values are errors.  Unknown elements are not: they are wrapped as dummy elements or handed back, depending on `options`.
    ///
    pub fn read<R: Read>(&mut self, stream: &mut ElementStream<R>, options: &ReadOptions) -> Result<Option<UpperElement>, MasterError> {
        self.read_at_depth(stream, options, 0, None)
    }

    fn read_at_depth<R: Read>(&mut self, stream: &mut ElementStream<R>, options: &ReadOptions, depth: usize, limit: Option<u64>) -> Result<Option<UpperElement>, MasterError> {
        if depth >= options.max_depth {
            return Err(MasterError::structural(stream.position(), StructuralError::NestingTooDeep(options.max_depth)));
        }

        self.children.clear();
        self.checksum = None;
        let schema = self.schema;
        let end = match self.size {
            ElementSize::Known(size) => Some(stream.position() + size),
            ElementSize::Unknown => limit,
        };

        let mut pending: Option<ElementHeader> = None;
        let upper = loop {
            let header = match pending.take() {
                Some(header) => header,
                None => {
                    if end.map_or(false, |end| stream.position() >= end) {
                        break None;
                    }
                    match stream.read_header()? {
                        Some(header) => header,
                        None if end.is_some() => return Err(MasterError::structural(stream.position(), StructuralError::UnexpectedEof)),
                        None => break None,
                    }
                }
            };

            if let (Some(end), Some(child_end)) = (end, header.data_end()) {
                if child_end > end {
                    let kind = StructuralError::OversizedChild {
                        id: header.id,
                        size: header.size.known().unwrap_or_default(),
                        available: end.saturating_sub(header.data_start()),
                    };
                    if !options.allow_oversized {
                        return Err(MasterError::structural(header.position, kind));
                    }
                    warn!("{} at byte {}", kind, header.position);
                }
            }

            if header.id == CRC32_ID {
                self.read_checksum(stream, &header)?;
                continue;
            }

            if schema.allows(self.id, header.id) {
                match schema.data_type(header.id) {
                    Some(DataType::Master) => {
                        let mut child = MasterElement::from_header(schema, &header)?;
                        let child_upper = child.read_at_depth(stream, options, depth + 1, end)?;
                        self.children.push(Element::Master(child));
                        match child_upper {
                            None => {},
                            Some(UpperElement::Ancestor { header, levels: 1 }) => pending = Some(header),
                            Some(UpperElement::Ancestor { header, levels }) => break Some(UpperElement::Ancestor { header, levels: levels - 1 }),
                            Some(unclaimed) => break Some(unclaimed),
                        }
                    },
                    Some(data_type) => self.children.push(Element::Leaf(LeafElement::read(stream, &header, data_type, options.scope)?)),
                    None => self.children.push(Element::Leaf(LeafElement::read_dummy(stream, &header, options.scope)?)),
                }
                continue;
            }

            match self.resolve_upper(header.id) {
                Some(levels) => {
                    debug!("element {:#x} at byte {} closes {} (belongs {} level(s) up)", header.id, header.position, schema.name(self.id), levels);
                    break Some(UpperElement::Ancestor { header, levels });
                },
                None if options.allow_dummy => {
                    warn!("wrapping unknown element {:#x} at byte {} in {} as a dummy", header.id, header.position, schema.name(self.id));
                    self.children.push(Element::Leaf(LeafElement::read_dummy(stream, &header, options.scope)?));
                },
                None => break Some(UpperElement::Unclaimed { header, depth }),
            }
        };

        self.invalidate();
        Ok(upper)
    }

    fn read_checksum<R: Read>(&mut self, stream: &mut ElementStream<R>, header: &ElementHeader) -> Result<(), MasterError> {
        let size = match header.size {
            ElementSize::Known(size) => size,
            ElementSize::Unknown => return Err(MasterError::structural(header.position, StructuralError::UnknownSizeLeaf { id: header.id })),
        };
        let payload = stream.read_payload(size)?;
        let value = ChecksumEngine::parse_value(&payload)
            .ok_or_else(|| MasterError::structural(header.position, StructuralError::InvalidChecksumElement(size)))?;
        debug!("read checksum {:#010x} for {}", value, self.schema.name(self.id));
        self.checksum = Some(ChecksumEngine::with_value(value));
        Ok(())
    }

    ///
    /// Walks up the schema hierarchy from this master looking for a context that claims `id`.  Returns how many levels up that context is.
    ///
    fn resolve_upper(&self, id: u64) -> Option<usize> {
        let mut levels = 1;
        let mut ancestor = self.schema.parent_of(self.id);
        while let Some(master) = ancestor {
            if self.schema.allows(master, id) {
                return Some(levels);
            }
            levels += 1;
            ancestor = self.schema.parent_of(master);
        }
        if self.schema.is_root(id) {
            Some(levels)
        } else {
            None
        }
    }
}

///
/// Id and size fields of a master.  A `None` size is written as the unknown size sentinel.
///
fn encode_head(id: u64, size: Option<u64>, width: usize) -> Result<Vec<u8>, MasterError> {
    let mut head = tools::id_to_bytes(id);
    match size {
        Some(size) => head.extend(size.as_vint_with_length(width)?),
        None => head.extend(tools::unknown_size_with_length(width)?),
    }
    Ok(head)
}
