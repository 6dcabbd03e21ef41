use crate::size::ElementSize::{Known, Unknown};
use crate::tools;

///
/// The payload length of an element: either an exact byte count or the "unknown size" sentinel used by streaming writers.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ElementSize {
    Known(u64),
    Unknown
}

impl ElementSize {
    ///
    /// Interprets a decoded size field of `vint_length` bytes.
    ///
    pub fn new(size: u64, vint_length: usize) -> Self {
        if tools::is_unknown_size(size, vint_length) {
            Unknown
        } else {
            Known(size)
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Known(_))
    }

    pub fn known(&self) -> Option<u64> {
        match self {
            Known(size) => Some(*size),
            Unknown => None,
        }
    }
}
