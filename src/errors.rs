pub mod tool {
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    pub enum ToolError {
        #[error("Unrepresentable Vint size encountered.")]
        ReadVintOverflow,

        #[error("Value too large to be written as a vint: {0}")]
        WriteVintOverflow(u64),

        #[error("Vint width {0} is outside of the supported range.")]
        InvalidVintLength(usize),

        #[error("Could not read unsigned int from array: {0:?}")]
        ReadU64Overflow(Vec<u8>),

        #[error("Could not read int from array: {0:?}")]
        ReadI64Overflow(Vec<u8>),

        #[error("Could not read float from array: {0:?}")]
        ReadF64Mismatch(Vec<u8>),

        #[error("Could not read utf8 string.")]
        ReadUtf8 {
            #[source]
            source: std::string::FromUtf8Error,
        },
    }
}

pub mod master {
    use std::io;
    use thiserror::Error;
    use ebml_master_schema::DataType;

    use super::tool::ToolError;

    ///
    /// Ways in which the bytes of a stream can fail to form an element tree.
    ///
    #[derive(Debug, Error, PartialEq)]
    pub enum StructuralError {
        #[error("invalid element id")]
        InvalidId,

        #[error("element id of {0} bytes exceeds the maximum id length")]
        IdTooLong(usize),

        #[error("invalid element size")]
        InvalidSize,

        #[error("reached end of source in the middle of an element")]
        UnexpectedEof,

        #[error("child {id:#x} of {size} bytes does not fit in the {available} bytes left in its parent")]
        OversizedChild { id: u64, size: u64, available: u64 },

        #[error("element {id:#x} is not a master but has an unknown size")]
        UnknownSizeLeaf { id: u64 },

        #[error("elements are nested deeper than the maximum of {0} levels")]
        NestingTooDeep(usize),

        #[error("checksum element holds {0} bytes instead of 4")]
        InvalidChecksumElement(u64),
    }

    #[derive(Debug, Error)]
    pub enum MasterError {
        #[error("Encountered corrupted data at byte {position}: {kind}")]
        Structural {
            position: u64,
            kind: StructuralError,
        },

        #[error("Missing mandatory elements: {}", .missing.join("; "))]
        SchemaViolation {
            missing: Vec<String>,
        },

        #[error("Checksum mismatch in element {id:#x}: stored {stored:#010x}, computed {computed:#010x}")]
        ChecksumMismatch {
            id: u64,
            stored: u32,
            computed: u32,
        },

        #[error("Unknown element id {id:#x} at byte {position} (nesting level {depth})")]
        UnknownElement {
            id: u64,
            position: u64,
            depth: usize,
        },

        #[error("Insertion rejected: {0}")]
        InsertionRejected(String),

        #[error("Element id {0:#x} is not declared in the schema")]
        UnknownClass(u64),

        #[error("Element {id:#x} is declared as {found}, but {expected} was requested")]
        ClassMismatch {
            id: u64,
            expected: DataType,
            found: DataType,
        },

        #[error("Source data does not seem to match the schema for element id ({id:#x}).")]
        InvalidValue {
            id: u64,
            #[source]
            source: ToolError,
        },

        #[error("Payload of element {0:#x} has not been loaded")]
        DeferredPayload(u64),

        #[error("Header of element {0:#x} has not been written yet")]
        HeadNotWritten(u64),

        #[error(transparent)]
        Tool(#[from] ToolError),

        #[error("Error reading from source or writing to destination.")]
        Io {
            #[from]
            source: io::Error,
        },
    }

    impl MasterError {
        pub(crate) fn structural(position: u64, kind: StructuralError) -> Self {
            MasterError::Structural { position, kind }
        }
    }
}
