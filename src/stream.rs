use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

use log::trace;

use super::errors::master::{MasterError, StructuralError};
use super::size::ElementSize;
use super::tools;

///
/// The identity and size fields that precede every element's payload.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ElementHeader {
    pub id: u64,
    pub size: ElementSize,
    pub position: u64,
    pub id_length: usize,
    pub size_length: usize,
}

impl ElementHeader {
    pub fn header_length(&self) -> usize {
        self.id_length + self.size_length
    }

    ///
    /// Stream offset of the first payload byte.
    ///
    pub fn data_start(&self) -> u64 {
        self.position + self.header_length() as u64
    }

    ///
    /// Stream offset just past the payload, `None` for unknown sized elements.
    ///
    pub fn data_end(&self) -> Option<u64> {
        self.size.known().map(|size| self.data_start() + size)
    }
}

///
/// A sequential byte source that keeps track of its offset.
///
/// Reads go straight to the wrapped source in small chunks, so wrap unbuffered sources (files, sockets) in a [`std::io::BufReader`] first.
///
pub struct ElementStream<R: Read> {
    source: R,
    position: u64,
}

impl<R: Read> ElementStream<R> {
    pub fn new(source: R) -> Self {
        ElementStream::with_offset(source, 0)
    }

    ///
    /// Creates a stream whose first byte sits at `offset` in the overall document.
    ///
    pub fn with_offset(source: R, offset: u64) -> Self {
        ElementStream {
            source,
            position: offset,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<(), MasterError> {
        match self.source.read_exact(buffer) {
            Ok(()) => {
                self.position += buffer.len() as u64;
                Ok(())
            },
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(MasterError::structural(self.position, StructuralError::UnexpectedEof)),
            Err(source) => Err(MasterError::Io { source }),
        }
    }

    ///
    /// Reads one byte, returning `None` at a clean end of source.
    ///
    fn read_first_byte(&mut self) -> Result<Option<u8>, MasterError> {
        let mut byte = [0u8];
        loop {
            match self.source.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(byte[0]));
                },
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => return Err(MasterError::Io { source }),
            }
        }
    }

    fn read_vint_rest(&mut self, first: u8, length: usize) -> Result<[u8; 8], MasterError> {
        let mut buffer = [0u8; 8];
        buffer[0] = first;
        self.read_exact(&mut buffer[1..length])?;
        Ok(buffer)
    }

    ///
    /// Reads the id and size fields of the next element.
    ///
    /// Returns `None` if the source is exhausted before the first byte of the id.  Running out of data anywhere after that is a structural error.
    ///
    pub fn read_header(&mut self) -> Result<Option<ElementHeader>, MasterError> {
        let position = self.position;
        let first = match self.read_first_byte()? {
            Some(byte) => byte,
            None => return Ok(None),
        };

        let id_length = tools::vint_length_from_marker(first)
            .map_err(|_| MasterError::structural(position, StructuralError::InvalidId))?;
        if id_length > tools::MAX_ID_LENGTH {
            return Err(MasterError::structural(position, StructuralError::IdTooLong(id_length)));
        }
        let id_bytes = self.read_vint_rest(first, id_length)?;
        let id = tools::arr_to_u64(&id_bytes[..id_length])?;

        let size_position = self.position;
        let first = match self.read_first_byte()? {
            Some(byte) => byte,
            None => return Err(MasterError::structural(size_position, StructuralError::UnexpectedEof)),
        };
        let size_length = tools::vint_length_from_marker(first)
            .map_err(|_| MasterError::structural(size_position, StructuralError::InvalidSize))?;
        let size_bytes = self.read_vint_rest(first, size_length)?;
        let (value, size_length) = tools::read_vint(&size_bytes[..size_length])?
            .ok_or_else(|| MasterError::structural(size_position, StructuralError::InvalidSize))?;

        let header = ElementHeader {
            id,
            size: ElementSize::new(value, size_length),
            position,
            id_length,
            size_length,
        };
        trace!("read header {:#x} ({:?}) at byte {}", header.id, header.size, position);
        Ok(Some(header))
    }

    pub(crate) fn read_payload(&mut self, size: u64) -> Result<Vec<u8>, MasterError> {
        let position = self.position;
        let length: usize = size.try_into()
            .map_err(|_| MasterError::structural(position, StructuralError::InvalidSize))?;
        let mut data = Vec::new();
        let read = (&mut self.source).take(size).read_to_end(&mut data).map_err(|source| MasterError::Io { source })?;
        self.position += read as u64;
        if read < length {
            return Err(MasterError::structural(self.position, StructuralError::UnexpectedEof));
        }
        Ok(data)
    }

    ///
    /// Skips over `size` bytes without keeping them.
    ///
    pub(crate) fn skip(&mut self, size: u64) -> Result<(), MasterError> {
        let skipped = io::copy(&mut (&mut self.source).take(size), &mut io::sink()).map_err(|source| MasterError::Io { source })?;
        self.position += skipped;
        if skipped < size {
            return Err(MasterError::structural(self.position, StructuralError::UnexpectedEof));
        }
        Ok(())
    }
}

///
/// A sequential byte sink that keeps track of its offset, used when rendering elements.
///
pub struct ElementSink<W: Write> {
    dest: W,
    position: u64,
}

impl<W: Write> ElementSink<W> {
    pub fn new(dest: W) -> Self {
        ElementSink::with_offset(dest, 0)
    }

    ///
    /// Creates a sink whose first byte lands at `offset` in the overall document.
    ///
    pub fn with_offset(dest: W, offset: u64) -> Self {
        ElementSink {
            dest,
            position: offset,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &W {
        &self.dest
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.dest
    }

    pub fn into_inner(self) -> W {
        self.dest
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), MasterError> {
        self.dest.write_all(data).map_err(|source| MasterError::Io { source })?;
        self.position += data.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), MasterError> {
        self.dest.flush().map_err(|source| MasterError::Io { source })
    }
}

impl<W: Write + Seek> ElementSink<W> {
    ///
    /// Overwrites bytes that were already written at `position`, then returns to the end of the written data.
    ///
    /// `position` is an offset in the same coordinates as [`ElementSink::position`].  The sink's current position is unchanged.
    ///
    pub fn patch(&mut self, position: u64, data: &[u8]) -> Result<(), MasterError> {
        if position + data.len() as u64 > self.position {
            return Err(MasterError::Io { source: io::Error::new(ErrorKind::InvalidInput, "patch extends past the written data") });
        }
        let back = (self.position - position) as i64;
        self.dest.seek(SeekFrom::Current(-back)).map_err(|source| MasterError::Io { source })?;
        self.dest.write_all(data).map_err(|source| MasterError::Io { source })?;
        let forward = back - data.len() as i64;
        self.dest.seek(SeekFrom::Current(forward)).map_err(|source| MasterError::Io { source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_header_fields() {
        let mut stream = ElementStream::new(Cursor::new(vec![0x1a, 0x45, 0xdf, 0xa3, 0x84, 1, 2, 3, 4]));
        let header = stream.read_header().unwrap().expect("header");
        assert_eq!(0x1a45dfa3, header.id);
        assert_eq!(ElementSize::Known(4), header.size);
        assert_eq!(5, header.data_start());
        assert_eq!(Some(9), header.data_end());
        assert_eq!(vec![1, 2, 3, 4], stream.read_payload(4).unwrap());
        assert!(stream.read_header().unwrap().is_none());
    }

    #[test]
    fn reads_unknown_size() {
        let mut data = vec![0x18, 0x53, 0x80, 0x67];
        data.extend_from_slice(&tools::UNKNOWN_SIZE);
        let mut stream = ElementStream::new(Cursor::new(data));
        let header = stream.read_header().unwrap().unwrap();
        assert_eq!(ElementSize::Unknown, header.size);
        assert_eq!(8, header.size_length);
    }

    #[test]
    fn truncated_header_is_structural() {
        let mut stream = ElementStream::new(Cursor::new(vec![0x1a, 0x45]));
        assert!(matches!(stream.read_header(), Err(MasterError::Structural { kind: StructuralError::UnexpectedEof, .. })));

        let mut stream = ElementStream::new(Cursor::new(vec![0x81]));
        assert!(matches!(stream.read_header(), Err(MasterError::Structural { kind: StructuralError::UnexpectedEof, .. })));
    }

    #[test]
    fn zero_id_byte_is_invalid() {
        let mut stream = ElementStream::new(Cursor::new(vec![0x00, 0x81]));
        assert!(matches!(stream.read_header(), Err(MasterError::Structural { position: 0, kind: StructuralError::InvalidId })));
    }

    #[test]
    fn skip_past_end_is_structural() {
        let mut stream = ElementStream::new(Cursor::new(vec![1, 2, 3]));
        assert!(stream.skip(2).is_ok());
        assert_eq!(2, stream.position());
        assert!(stream.skip(2).is_err());
    }

    #[test]
    fn patch_rewrites_in_place() {
        let mut sink = ElementSink::new(Cursor::new(Vec::new()));
        sink.write_all(&[1, 2, 3, 4]).unwrap();
        sink.patch(1, &[9, 9]).unwrap();
        sink.write_all(&[5]).unwrap();
        assert_eq!(5, sink.position());
        assert_eq!(vec![1, 9, 9, 4, 5], sink.into_inner().into_inner());
    }
}
