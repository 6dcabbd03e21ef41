use std::fmt;
use std::io::{self, Write};

use crc32fast::Hasher;

pub use ebml_master_schema::CRC32_ID;

///
/// Full encoded length of the CRC-32 pseudo-element: one id byte, one size byte and the 4 byte value.
///
pub const CHECKSUM_ELEMENT_LENGTH: u64 = 6;

///
/// Incremental CRC-32 accumulator owned by a master element while checksumming is enabled.
///
/// EBML uses the IEEE 802.3 polynomial and stores the value little endian.
///
#[derive(Clone, Default)]
pub struct ChecksumEngine {
    hasher: Hasher,
    value: u32,
}

impl fmt::Debug for ChecksumEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumEngine").field("value", &format_args!("{:#010x}", self.value)).finish()
    }
}

impl ChecksumEngine {
    pub fn new() -> Self {
        ChecksumEngine::default()
    }

    ///
    /// Creates an engine holding a value read from a stream.
    ///
    pub fn with_value(value: u32) -> Self {
        ChecksumEngine {
            hasher: Hasher::new(),
            value,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    ///
    /// Stores the value accumulated so far and resets the accumulator.
    ///
    pub fn finalize(&mut self) -> u32 {
        let hasher = std::mem::take(&mut self.hasher);
        self.value = hasher.finalize();
        self.value
    }

    ///
    /// The stored value - from the last render or as read from the stream.
    ///
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn force(&mut self, value: u32) {
        self.value = value;
    }

    pub fn compute(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }

    ///
    /// Complete binary form of the pseudo-element holding `value`.
    ///
    pub fn element_bytes(value: u32) -> [u8; CHECKSUM_ELEMENT_LENGTH as usize] {
        let crc = value.to_le_bytes();
        [CRC32_ID as u8, 0x84, crc[0], crc[1], crc[2], crc[3]]
    }

    pub fn parse_value(payload: &[u8]) -> Option<u32> {
        let bytes: [u8; 4] = payload.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

///
/// A [`Write`] destination that discards the bytes and only feeds them to a CRC-32 accumulator.
///
#[derive(Default)]
pub struct ChecksumWriter {
    hasher: Hasher,
}

impl ChecksumWriter {
    pub fn new() -> Self {
        ChecksumWriter::default()
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

impl Write for ChecksumWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
