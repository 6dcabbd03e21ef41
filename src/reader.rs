use std::io::Read;

use log::warn;
use ebml_master_schema::{DataType, SchemaRegistry};

use super::config::ReadOptions;
use super::element::{Element, LeafElement};
use super::errors::master::{MasterError, StructuralError};
use super::master::{MasterElement, UpperElement};
use super::stream::{ElementHeader, ElementStream};

///
/// Reads the top level elements of an EBML document (read from a source implementing [`std::io::Read`]) as complete element trees.
///
/// Masters are read recursively with [`MasterElement::read`].  When a master stops on an element that belongs to the top level (for example because an unknown sized master has ended), the reader picks that element up on the next call.
///
/// Unknown elements are wrapped as dummy elements by default.  With strict [`ReadOptions`] they are skipped and reported as [`MasterError::UnknownElement`] instead; this does not end the iteration.  Every other error is fatal and ends the iteration.
///
/// A root element that contains an unclaimed element is cut short: the children read before it are kept and can be collected with [`ElementReader::take_partial`] right after the error, and the rest of the root is skipped.  A root of unknown size cannot be skipped, so its remaining children are read as top level elements and, since no root claims them, come back as further `UnknownElement` errors.
///
/// ## Example
///
/// ```
/// use std::io::Cursor;
/// use ebml_master::{ElementReader, ReadOptions};
/// use ebml_master::schema::{DataType, ElementClass, SchemaBuilder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let schema = SchemaBuilder::new()
///     .element(ElementClass::new(0x1A45DFA3, "Header", DataType::Master))
///     .element(ElementClass::new(0x4286, "Version", DataType::UnsignedInt).parent(0x1A45DFA3))
///     .build()?
///     .leak();
///
/// let data = vec![0x1A, 0x45, 0xDF, 0xA3, 0x84, 0x42, 0x86, 0x81, 0x01];
/// let mut reader = ElementReader::new(Cursor::new(data), schema, ReadOptions::default());
/// let header = reader.next().expect("one element")?;
/// assert_eq!(Some(&1), header.as_master().expect("master").find_child::<u64>(0x4286)?);
/// assert!(reader.next().is_none());
/// # Ok(())
/// # }
/// ```
///
pub struct ElementReader<R: Read> {
    stream: ElementStream<R>,
    schema: &'static SchemaRegistry,
    options: ReadOptions,
    pending: Option<ElementHeader>,
    partial: Option<MasterElement>,
    finished: bool,
}

impl<R: Read> ElementReader<R> {
    pub fn new(source: R, schema: &'static SchemaRegistry, options: ReadOptions) -> Self {
        ElementReader {
            stream: ElementStream::new(source),
            schema,
            options,
            pending: None,
            partial: None,
            finished: false,
        }
    }

    ///
    /// Number of bytes consumed from the source so far.
    ///
    pub fn position(&self) -> u64 {
        self.stream.position()
    }

    ///
    /// The root element interrupted by the last [`MasterError::UnknownElement`], holding the children read before the unclaimed element.  Cleared by the next call to `next`.
    ///
    pub fn take_partial(&mut self) -> Option<MasterElement> {
        self.partial.take()
    }

    pub fn into_inner(self) -> R {
        self.stream.into_inner()
    }

    fn read_element(&mut self, header: ElementHeader) -> Result<Element, MasterError> {
        let schema = self.schema;
        if !schema.is_root(header.id) && !schema.is_global(header.id) {
            return self.read_unknown(header, 0);
        }

        match schema.data_type(header.id) {
            Some(DataType::Master) => {
                let mut master = MasterElement::from_header(schema, &header)?;
                match master.read(&mut self.stream, &self.options)? {
                    None => Ok(Element::Master(master)),
                    Some(UpperElement::Ancestor { header, .. }) => {
                        self.pending = Some(header);
                        Ok(Element::Master(master))
                    },
                    Some(UpperElement::Unclaimed { header: unclaimed, depth }) => {
                        let result = self.read_unknown(unclaimed, depth);
                        if let Some(end) = header.data_end() {
                            if self.stream.position() < end {
                                self.stream.skip(end - self.stream.position())?;
                            }
                        }
                        if result.is_err() {
                            self.partial = Some(master);
                        }
                        result
                    },
                }
            },
            Some(data_type) => Ok(Element::Leaf(LeafElement::read(&mut self.stream, &header, data_type, self.options.scope)?)),
            None => self.read_unknown(header, 0),
        }
    }

    fn read_unknown(&mut self, header: ElementHeader, depth: usize) -> Result<Element, MasterError> {
        if self.options.allow_dummy {
            warn!("wrapping unknown top level element {:#x} at byte {} as a dummy", header.id, header.position);
            return Ok(Element::Leaf(LeafElement::read_dummy(&mut self.stream, &header, self.options.scope)?));
        }

        let size = header.size.known()
            .ok_or_else(|| MasterError::structural(header.position, StructuralError::UnknownSizeLeaf { id: header.id }))?;
        warn!("skipping unknown element {:#x} at byte {}", header.id, header.position);
        self.stream.skip(size)?;
        Err(MasterError::UnknownElement { id: header.id, position: header.position, depth })
    }
}

impl<R: Read> Iterator for ElementReader<R> {
    type Item = Result<Element, MasterError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.partial = None;

        let header = match self.pending.take() {
            Some(header) => header,
            None => match self.stream.read_header() {
                Ok(Some(header)) => header,
                Ok(None) => {
                    self.finished = true;
                    return None;
                },
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                },
            },
        };

        let result = self.read_element(header);
        if let Err(err) = &result {
            if !matches!(err, MasterError::UnknownElement { .. }) {
                self.finished = true;
            }
        }
        Some(result)
    }
}
