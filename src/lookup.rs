//!
//! Typed access to the children of a master element.
//!
//! These are thin wrappers over [`MasterElement::find_first_mut`], [`MasterElement::find_next_mut`] and [`MasterElement::add_new`].  The requested Rust type is checked against the class declared in the schema, so asking for a `String` out of an unsigned integer class is an error rather than a reinterpretation.
//!

use ebml_master_schema::DataType;

use super::element::{Element, LeafData};
use super::errors::master::MasterError;
use super::master::MasterElement;

///
/// A Rust type that holds the value of one EBML data type.
///
pub trait ChildValue {
    const DATA_TYPE: DataType;

    fn from_element(element: &Element) -> Option<&Self>;
    fn from_element_mut(element: &mut Element) -> Option<&mut Self>;
}

macro_rules! leaf_value {
    ($ty:ty, $variant:ident) => {
        impl ChildValue for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn from_element(element: &Element) -> Option<&Self> {
                match element.as_leaf()?.data() {
                    LeafData::$variant(val) => Some(val),
                    _ => None,
                }
            }

            fn from_element_mut(element: &mut Element) -> Option<&mut Self> {
                match element.as_leaf_mut()?.data_mut() {
                    LeafData::$variant(val) => Some(val),
                    _ => None,
                }
            }
        }
    };
}

leaf_value!(u64, UnsignedInt);
leaf_value!(i64, Integer);
leaf_value!(String, Utf8);
leaf_value!(Vec<u8>, Binary);
leaf_value!(f64, Float);

impl ChildValue for MasterElement {
    const DATA_TYPE: DataType = DataType::Master;

    fn from_element(element: &Element) -> Option<&Self> {
        element.as_master()
    }

    fn from_element_mut(element: &mut Element) -> Option<&mut Self> {
        element.as_master_mut()
    }
}

fn cast_error(element: &Element, expected: DataType) -> MasterError {
    match element {
        Element::Leaf(leaf) if !leaf.is_loaded() => MasterError::DeferredPayload(leaf.id()),
        _ => MasterError::ClassMismatch { id: element.id(), expected, found: element.data_type() },
    }
}

fn cast<T: ChildValue>(element: &Element) -> Result<&T, MasterError> {
    T::from_element(element).ok_or_else(|| cast_error(element, T::DATA_TYPE))
}

fn cast_mut<T: ChildValue>(element: &mut Element) -> Result<&mut T, MasterError> {
    let error = cast_error(element, T::DATA_TYPE);
    T::from_element_mut(element).ok_or(error)
}

impl MasterElement {
    fn check_class<T: ChildValue>(&self, id: u64) -> Result<(), MasterError> {
        match self.schema().data_type(id) {
            None => Err(MasterError::UnknownClass(id)),
            Some(found) if found != T::DATA_TYPE => Err(MasterError::ClassMismatch { id, expected: T::DATA_TYPE, found }),
            Some(_) => Ok(()),
        }
    }

    ///
    /// Returns the value of the first child of class `id`, appending a default one if there is none.
    ///
    /// # Errors
    ///
    /// Fails if `id` isn't declared, if it isn't declared as `T`'s data type, or if the child's payload was deferred and not loaded.
    ///
    pub fn get_child<T: ChildValue>(&mut self, id: u64) -> Result<&mut T, MasterError> {
        self.check_class::<T>(id)?;
        let element = self.find_first_mut(id, true)?.ok_or(MasterError::UnknownClass(id))?;
        cast_mut(element)
    }

    ///
    /// Returns the value of the first child of class `id`, if there is one.
    ///
    pub fn find_child<T: ChildValue>(&self, id: u64) -> Result<Option<&T>, MasterError> {
        self.check_class::<T>(id)?;
        self.find_first(id).map(cast::<T>).transpose()
    }

    ///
    /// Returns the values of every child of class `id`, in list order.
    ///
    pub fn find_children<T: ChildValue>(&self, id: u64) -> Result<Vec<&T>, MasterError> {
        self.check_class::<T>(id)?;
        self.iter().filter(|child| child.id() == id).map(cast::<T>).collect()
    }

    ///
    /// Returns the value of the next child with the same class as the child at index `after`, appending a default one if there is none.
    ///
    /// Returns `Ok(None)` if `after` is out of range.
    ///
    pub fn get_next_child<T: ChildValue>(&mut self, after: usize) -> Result<Option<&mut T>, MasterError> {
        let id = match self.get(after) {
            Some(child) => child.id(),
            None => return Ok(None),
        };
        self.check_class::<T>(id)?;
        match self.find_next_mut(after, true)? {
            Some(element) => cast_mut(element).map(Some),
            None => Ok(None),
        }
    }

    ///
    /// Appends a default child of class `id` and returns its value.
    ///
    pub fn add_new_child<T: ChildValue>(&mut self, id: u64) -> Result<&mut T, MasterError> {
        self.check_class::<T>(id)?;
        cast_mut(self.add_new(id)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::OnceLock;

    use ebml_master_schema::{DefaultValue, ElementClass, SchemaBuilder, SchemaRegistry};

    use super::*;
    use crate::config::{ReadOptions, ReadScope};
    use crate::element::LeafElement;
    use crate::stream::{ElementSink, ElementStream};

    const ROOT: u64 = 0x1A45DFA3;
    const COUNT: u64 = 0x4286;
    const NAME: u64 = 0x4287;
    const GAIN: u64 = 0x4288;
    const TRACK: u64 = 0xAE;
    const CODEC: u64 = 0x86;
    const PRIVATE: u64 = 0x63A2;

    fn schema() -> &'static SchemaRegistry {
        static SCHEMA: OnceLock<SchemaRegistry> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaBuilder::new()
                .element(ElementClass::new(ROOT, "Root", DataType::Master))
                .element(ElementClass::new(COUNT, "Count", DataType::UnsignedInt).parent(ROOT).default_value(DefaultValue::UnsignedInt(4)))
                .element(ElementClass::new(NAME, "Name", DataType::Utf8).parent(ROOT))
                .element(ElementClass::new(GAIN, "Gain", DataType::Float).parent(ROOT))
                .element(ElementClass::new(TRACK, "Track", DataType::Master).parent(ROOT))
                .element(ElementClass::new(CODEC, "Codec", DataType::Utf8).parent(TRACK))
                .element(ElementClass::new(PRIVATE, "Private", DataType::Binary).parent(TRACK))
                .build()
                .expect("valid schema")
        })
    }

    fn root() -> MasterElement {
        MasterElement::new(schema(), ROOT).unwrap()
    }

    #[test]
    fn get_child_creates_default() {
        let mut master = root();
        assert_eq!(None, master.find_child::<u64>(COUNT).unwrap());
        assert_eq!(4, *master.get_child::<u64>(COUNT).unwrap());

        *master.get_child::<u64>(COUNT).unwrap() = 10;
        assert_eq!(Some(&10), master.find_child::<u64>(COUNT).unwrap());
        assert_eq!(1, master.len());
    }

    #[test]
    fn class_mismatch_is_an_error() {
        let mut master = root();
        assert!(matches!(
            master.get_child::<String>(COUNT),
            Err(MasterError::ClassMismatch { id: COUNT, expected: DataType::Utf8, found: DataType::UnsignedInt })
        ));
        assert!(matches!(master.find_child::<f64>(0x4F00), Err(MasterError::UnknownClass(0x4F00))));
        assert!(master.is_empty());

        master.push(LeafElement::utf8(COUNT, "wrong")).unwrap();
        assert!(matches!(master.find_child::<u64>(COUNT), Err(MasterError::ClassMismatch { found: DataType::Utf8, .. })));
    }

    #[test]
    fn nested_masters_are_typed() {
        let mut master = root();
        let track = master.add_new_child::<MasterElement>(TRACK).unwrap();
        track.get_child::<String>(CODEC).unwrap().push_str("V_VP9");
        *master.add_new_child::<f64>(GAIN).unwrap() = 0.5;

        let track = master.find_child::<MasterElement>(TRACK).unwrap().unwrap();
        assert_eq!(Some(&String::from("V_VP9")), track.find_child::<String>(CODEC).unwrap());
        assert_eq!(Some(&0.5), master.find_child::<f64>(GAIN).unwrap());
    }

    #[test]
    fn next_child_walks_and_creates() {
        let mut master = root();
        master.push(LeafElement::utf8(NAME, "one")).unwrap();
        master.push(LeafElement::unsigned_int(COUNT, 1)).unwrap();
        master.push(LeafElement::utf8(NAME, "two")).unwrap();

        assert_eq!("two", master.get_next_child::<String>(0).unwrap().unwrap().as_str());
        assert_eq!("", master.get_next_child::<String>(2).unwrap().unwrap().as_str());
        assert_eq!(4, master.len());
        assert!(master.get_next_child::<String>(7).unwrap().is_none());
        assert!(matches!(master.get_next_child::<u64>(0), Err(MasterError::ClassMismatch { .. })));

        let names = master.find_children::<String>(NAME).unwrap();
        assert_eq!(vec!["one", "two", ""], names.iter().map(|name| name.as_str()).collect::<Vec<_>>());
    }

    #[test]
    fn deferred_payloads_must_be_loaded() {
        let mut master = root();
        let track = master.add_new_child::<MasterElement>(TRACK).unwrap();
        track.add_new_child::<Vec<u8>>(PRIVATE).unwrap().extend_from_slice(&[1, 2, 3]);

        let mut sink = ElementSink::new(Vec::new());
        master.render(&mut sink, false, false).unwrap();
        let mut cursor = Cursor::new(sink.into_inner());

        let mut stream = ElementStream::new(&mut cursor);
        let header = stream.read_header().unwrap().unwrap();
        let mut read_back = MasterElement::from_header(schema(), &header).unwrap();
        read_back.read(&mut stream, &ReadOptions::default().with_scope(ReadScope::PartialData)).unwrap();

        let track = read_back.get_child::<MasterElement>(TRACK).unwrap();
        assert!(matches!(track.find_child::<Vec<u8>>(PRIVATE), Err(MasterError::DeferredPayload(PRIVATE))));

        track.get_mut(0).unwrap().as_leaf_mut().unwrap().load(&mut cursor).unwrap();
        assert_eq!(Some(&vec![1, 2, 3]), track.find_child::<Vec<u8>>(PRIVATE).unwrap());
    }
}
