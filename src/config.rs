//!
//! Options that control how master elements are read from a stream.
//!

///
/// Default limit on how deeply masters may nest while reading.
///
pub const DEFAULT_MAX_DEPTH: usize = 64;

///
/// How much of each leaf payload is read while building a tree.
///
/// Deferred payloads only record where they live in the stream; they can be loaded later with [`LeafElement::load`](crate::LeafElement::load).  Choosing a lazy scope is the way to bound memory use on files with large binary payloads.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum ReadScope {
    ///
    /// Every leaf payload is read and decoded.
    ///
    #[default]
    AllData,

    ///
    /// Binary payloads are deferred, every other leaf is decoded.
    ///
    PartialData,

    ///
    /// Every leaf payload is deferred.  Masters are still read in full.
    ///
    NoData,
}

///
/// Used to relax rules on how strictly a master element should validate the read stream.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AllowableErrors {
    ///
    /// Wraps elements whose id is not known to any enclosing context as opaque "dummy" elements rather than stopping.
    ///
    UnknownElements,

    ///
    /// Reads children whose declared size runs past the end of their parent rather than failing.
    ///
    OversizedChildren,
}

///
/// Configuration for [`MasterElement::read`](crate::MasterElement::read) and [`ElementReader`](crate::ElementReader).
///
/// By default every payload is read, unknown elements are kept as dummy elements, oversized children are an error and nesting is limited to [`DEFAULT_MAX_DEPTH`] levels.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadOptions {
    pub scope: ReadScope,
    pub max_depth: usize,
    pub allow_dummy: bool,
    pub allow_oversized: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            scope: ReadScope::AllData,
            max_depth: DEFAULT_MAX_DEPTH,
            allow_dummy: true,
            allow_oversized: false,
        }
    }
}

impl ReadOptions {
    pub fn with_scope(mut self, scope: ReadScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    ///
    /// Replaces the set of tolerated problems.  Passing an empty slice makes reading strict: unknown elements stop the read and are reported to the caller.
    ///
    pub fn allow_errors(mut self, errors: &[AllowableErrors]) -> Self {
        self.allow_dummy = errors.contains(&AllowableErrors::UnknownElements);
        self.allow_oversized = errors.contains(&AllowableErrors::OversizedChildren);
        self
    }
}
