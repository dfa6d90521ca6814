//! Contains the interface to block compression codecs.
//! The layout engine never looks into compressed bytes,
//! it only needs to know how many bytes each block occupies.

// private modules make non-breaking changes easier
mod zip;

pub use self::zip::ZlibCodec;

use crate::error::Result;


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];


/// Compresses a single padded block into a self-contained byte sequence.
/// Implementations must be usable from multiple threads at once,
/// as blocks may be compressed in parallel.
pub trait BlockCodec: Sync {

    /// Compress the padded pixels of a single block.
    fn compress_block(&self, padded_block: Bytes<'_>) -> Result<ByteVec>;
}

/// Stores blocks without compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Uncompressed;

impl BlockCodec for Uncompressed {
    fn compress_block(&self, padded_block: Bytes<'_>) -> Result<ByteVec> {
        Ok(padded_block.to_vec())
    }
}

impl<C: BlockCodec + ?Sized> BlockCodec for &C {
    fn compress_block(&self, padded_block: Bytes<'_>) -> Result<ByteVec> {
        (**self).compress_block(padded_block)
    }
}
