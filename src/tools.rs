//!
//! Contains a number of tools that are useful when working with EBML encoded files.
//!
//! These cover the variable-width integer ("vint") fields used for element ids and sizes, as well as the scalar payload codecs of leaf elements.
//!

use std::convert::TryInto;

use super::errors::tool::ToolError;

///
/// Maximum width of an element id field.
///
pub const MAX_ID_LENGTH: usize = 4;

///
/// Maximum width of an element size field.
///
pub const MAX_SIZE_LENGTH: usize = 8;

///
/// The "unknown size" sentinel as written by this crate: the widest size field with every value bit set.
///
pub const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

///
/// Trait to enable easy serialization to a vint.
///
/// This is only available for types that can be cast as `u64`.  Values whose bits are all ones at a given width are reserved for the unknown size sentinel, so those values are written one byte wider.
///
pub trait Vint: Into<u64> + Copy {
    ///
    /// Returns a representation of the current value as a vint array.
    ///
    /// # Errors
    ///
    /// This can return an error if the value is too large to be representable as a vint.
    ///
    fn as_vint(&self) -> Result<Vec<u8>, ToolError> {
        let val: u64 = (*self).into();
        let length = vint_length(val)?;
        Ok(as_vint_no_check_u64(val, length))
    }

    ///
    /// Returns a representation of the current value as a vint array with a specified length.
    ///
    /// # Errors
    ///
    /// This can return an error if the value is too large to be representable as a vint of that length.
    ///
    fn as_vint_with_length(&self, length: usize) -> Result<Vec<u8>, ToolError> {
        let val: u64 = (*self).into();
        if length == 0 || length > MAX_SIZE_LENGTH {
            return Err(ToolError::InvalidVintLength(length));
        }
        check_size_u64(val, length)?;
        Ok(as_vint_no_check_u64(val, length))
    }
}

impl Vint for u64 { }
impl Vint for u32 { }
impl Vint for u16 { }
impl Vint for u8 { }

///
/// Returns the smallest vint width able to hold `val`.
///
/// # Errors
///
/// This returns an error if `val` does not fit in an 8 byte vint.
///
pub fn vint_length(val: u64) -> Result<usize, ToolError> {
    check_size_u64(val, MAX_SIZE_LENGTH)?;
    let mut length = 1;
    while val >= (1 << (7 * length)) - 1 {
        length += 1;
    }
    Ok(length)
}

#[inline]
fn check_size_u64(val: u64, max_length: usize) -> Result<(), ToolError> {
    if val >= (1 << (max_length * 7)) - 1 {
        Err(ToolError::WriteVintOverflow(val))
    } else {
        Ok(())
    }
}

#[inline]
fn as_vint_no_check_u64(val: u64, length: usize) -> Vec<u8> {
    let bytes: [u8; 8] = val.to_be_bytes();
    let mut result: Vec<u8> = Vec::from(&bytes[(8-length)..]);
    result[0] |= 1 << (8 - length);
    result
}

///
/// Reads a vint from the beginning of the input array slice.
///
/// This method returns an option with the `None` variant used to indicate there was not enough data in the buffer to completely read a vint.
///
/// The returned tuple contains the value of the vint (`u64`) and the length of the vint (`usize`).  The length will be less than or equal to the length of the input slice.
///
/// # Errors
///
/// This method can return a `ToolError` if the input array cannot be read as a vint.
///
pub fn read_vint(buffer: &[u8]) -> Result<Option<(u64, usize)>, ToolError> {
    if buffer.is_empty() {
        return Ok(None);
    }

    let length = vint_length_from_marker(buffer[0])?;

    if length > buffer.len() {
        // Not enough data in the buffer to read out the vint value
        return Ok(None);
    }

    let mut value = buffer[0] as u64;
    value -= 1 << (8 - length);

    for item in buffer.iter().take(length).skip(1) {
        value <<= 8;
        value += *item as u64;
    }

    Ok(Some((value, length)))
}

///
/// Returns the total width of a vint given its first byte.
///
/// # Errors
///
/// A first byte of zero does not carry a length marker and can't begin a vint.
///
#[inline]
pub fn vint_length_from_marker(first: u8) -> Result<usize, ToolError> {
    if first == 0 {
        return Err(ToolError::ReadVintOverflow);
    }
    Ok(first.leading_zeros() as usize + 1)
}

///
/// Returns whether a size field value of the given width is the "unknown size" sentinel.
///
pub fn is_unknown_size(value: u64, length: usize) -> bool {
    length > 0 && length <= MAX_SIZE_LENGTH && value == (1 << (7 * length)) - 1
}

///
/// Returns an "unknown size" sentinel of the given width.
///
/// # Errors
///
/// Returns an error if `length` is not between 1 and 8.
///
pub fn unknown_size_with_length(length: usize) -> Result<Vec<u8>, ToolError> {
    if length == 0 || length > MAX_SIZE_LENGTH {
        return Err(ToolError::InvalidVintLength(length));
    }
    let mut result = vec![0xFF; length];
    result[0] >>= length - 1;
    Ok(result)
}

///
/// Returns the number of bytes an element id occupies.  Ids keep their vint marker, so this is simply the count of significant bytes.
///
pub fn id_length(id: u64) -> usize {
    std::cmp::max(1, (64 - id.leading_zeros() as usize + 7) / 8)
}

///
/// Returns the binary representation of an element id.
///
pub fn id_to_bytes(id: u64) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    bytes[(8 - id_length(id))..].to_vec()
}

///
/// Reads a `u64` value from any length array slice.
///
/// Rather than forcing the input to be a `[u8; 8]` like standard library methods, this can interpret a `u64` from a slice of any length <= 8.  Bytes are assumed to be big endian - i.e. an array of `[4, 0]` would return a value of `1024`.  An empty slice reads as zero.
///
/// # Errors
///
/// This method will return an error if the input slice has a length > 8.
///
/// ## Example
///
/// ```
/// # use ebml_master::tools::arr_to_u64;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let result = arr_to_u64(&[16,0])?;
/// assert_eq!(result, 4096);
/// # Ok(())
/// # }
/// ```
///
pub fn arr_to_u64(arr: &[u8]) -> Result<u64, ToolError> {
    if arr.len() > 8 {
        return Err(ToolError::ReadU64Overflow(Vec::from(arr)));
    }

    let mut val = 0u64;
    for byte in arr {
        val = (val << 8) | *byte as u64;
    }
    Ok(val)
}

///
/// Reads an `i64` value from any length array slice.
///
/// The slice holds a big endian two's complement value of any length <= 8.  An empty slice reads as zero.
///
/// # Errors
///
/// This method will return an error if the input slice has a length > 8.
///
/// ## Example
///
/// ```
/// # use ebml_master::tools::arr_to_i64;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// assert_eq!(arr_to_i64(&[4,0])?, 1024);
/// assert_eq!(arr_to_i64(&[0xFF, 0xFE])?, -2);
/// # Ok(())
/// # }
/// ```
///
pub fn arr_to_i64(arr: &[u8]) -> Result<i64, ToolError> {
    if arr.len() > 8 {
        return Err(ToolError::ReadI64Overflow(Vec::from(arr)));
    }
    if arr.is_empty() {
        return Ok(0);
    }

    let fill = if arr[0] > 127 { 0xFF } else { 0x00 };
    let mut bytes = [fill; 8];
    bytes[(8 - arr.len())..].copy_from_slice(arr);
    Ok(i64::from_be_bytes(bytes))
}

///
/// Reads an `f64` value from an array slice of length 0, 4 or 8.
///
/// This method wraps `f32` and `f64` conversions from big endian byte arrays and casts the result as an `f64`.  An empty slice reads as zero.
///
/// # Errors
///
/// This method will return an error if the input slice length is not 0, 4 or 8.
///
pub fn arr_to_f64(arr: &[u8]) -> Result<f64, ToolError> {
    match arr.len() {
        0 => Ok(0.0),
        4 => Ok(f32::from_be_bytes(arr.try_into().map_err(|_| ToolError::ReadF64Mismatch(Vec::from(arr)))?) as f64),
        8 => Ok(f64::from_be_bytes(arr.try_into().map_err(|_| ToolError::ReadF64Mismatch(Vec::from(arr)))?)),
        _ => Err(ToolError::ReadF64Mismatch(Vec::from(arr))),
    }
}

///
/// Minimal number of bytes needed to write `val` as an unsigned integer payload.  Zero is written as a single byte.
///
pub fn u64_length(val: u64) -> usize {
    std::cmp::max(1, (64 - val.leading_zeros() as usize + 7) / 8)
}

///
/// Minimal number of bytes needed to write `val` as a two's complement payload.
///
pub fn i64_length(val: i64) -> usize {
    let mut length = 1;
    while length < 8 && (val < -(1i64 << (8 * length - 1)) || val >= (1i64 << (8 * length - 1))) {
        length += 1;
    }
    length
}

///
/// Writes `val` as a big endian unsigned integer of exactly `length` bytes.
///
/// # Errors
///
/// Returns an error if `val` does not fit in `length` bytes.
///
pub fn u64_to_arr(val: u64, length: usize) -> Result<Vec<u8>, ToolError> {
    if length > 8 || u64_length(val) > length && !(val == 0 && length == 0) {
        return Err(ToolError::WriteVintOverflow(val));
    }
    Ok(val.to_be_bytes()[(8 - length)..].to_vec())
}

///
/// Writes `val` as a big endian two's complement integer of exactly `length` bytes.
///
/// # Errors
///
/// Returns an error if `val` does not fit in `length` bytes.
///
pub fn i64_to_arr(val: i64, length: usize) -> Result<Vec<u8>, ToolError> {
    if length > 8 || i64_length(val) > length && !(val == 0 && length == 0) {
        return Err(ToolError::ReadI64Overflow(val.to_be_bytes().to_vec()));
    }
    Ok(val.to_be_bytes()[(8 - length)..].to_vec())
}
