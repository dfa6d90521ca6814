
//! Error type definitions.

use std::borrow::Cow;
use std::error;
use std::fmt;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// A result that may contain a layout error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains a layout error.
pub type UnitResult = Result<()>;


/// An error that may happen while planning the layout of a file
/// or while assembling the bytes of a streamed write.
/// Every error is detected before any internal state is modified.
#[derive(Debug)]
pub enum Error {

    /// The requested row range does not start or end on a block row
    /// of one of the segments it touches.
    UnalignedRange {

        /// First global row of the rejected range.
        start_row: usize,

        /// Number of rows of the rejected range.
        row_count: usize,
    },

    /// The byte size of this block has not been recorded yet.
    UnknownBlockSize {

        /// Index of the image segment.
        segment: usize,

        /// Row-major index of the block inside the segment.
        block: usize,
    },

    /// The requested bytes lie behind a segment
    /// whose image data length still depends on unknown block sizes.
    LayoutNotFinalized {

        /// Index of the first segment that is not finalized.
        segment: usize,
    },

    /// The requested rows exceed the image.
    RangeOutOfBounds {

        /// Exclusive end row of the rejected range.
        end_row: usize,

        /// Number of rows in the whole image.
        total_rows: usize,
    },

    /// The payload does not contain exactly the bytes of the covered blocks.
    PayloadSizeMismatch {

        /// Sum of the recorded sizes of all covered blocks.
        expected: u64,

        /// Length of the payload supplied by the caller.
        actual: u64,
    },

    /// A block size was recorded twice with different values.
    DuplicateBlockSize {

        /// Index of the image segment.
        segment: usize,

        /// Row-major index of the block inside the segment.
        block: usize,

        /// The size that was recorded first.
        existing: u64,

        /// The conflicting size.
        rejected: u64,
    },

    /// The segment policy would produce a segment without any rows.
    DegenerateSegmentSplit(Cow<'static, str>),

    /// The arguments are contradictory or malformed.
    Invalid(Cow<'static, str>),

    /// Writing the assembled buffers failed.
    Io(IoError),
}


impl Error {

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `DegenerateSegmentSplit`.
    pub(crate) fn degenerate(message: impl Into<Cow<'static, str>>) -> Self {
        Error::DegenerateSegmentSplit(message.into())
    }
}


/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnalignedRange { start_row, row_count } => write!(
                formatter, "rows {}..{} are not aligned to block rows",
                start_row, start_row + row_count
            ),

            Error::UnknownBlockSize { segment, block } => write!(
                formatter, "size of block {} in segment {} is unknown", block, segment
            ),

            Error::LayoutNotFinalized { segment } => write!(
                formatter, "layout is not finalized: segment {} has blocks of unknown size", segment
            ),

            Error::RangeOutOfBounds { end_row, total_rows } => write!(
                formatter, "row {} exceeds the image of {} rows", end_row, total_rows
            ),

            Error::PayloadSizeMismatch { expected, actual } => write!(
                formatter, "payload has {} bytes but the covered blocks have {} bytes", actual, expected
            ),

            Error::DuplicateBlockSize { segment, block, existing, rejected } => write!(
                formatter, "block {} in segment {} already has {} bytes, cannot set {} bytes",
                block, segment, existing, rejected
            ),

            Error::DegenerateSegmentSplit(message) => write!(formatter, "degenerate segment split: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid argument: {}", message),
            Error::Io(error) => write!(formatter, "{}", error),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}


/// Lossless on every platform with at most 64 bit pointers.
#[inline]
pub(crate) fn usize_to_u64(value: usize) -> u64 {
    value as u64
}

/// Return error on invalid range.
#[inline]
pub(crate) fn u64_to_usize(value: u64, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}
