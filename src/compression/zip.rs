// zlib compression of a whole block at once

use super::*;
use crate::error::Error;


/// Compresses each block with zlib.
/// Stands in for an image codec where the real codec is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZlibCodec {

    /// Compression level from 0 (fast) to 10 (small).
    pub level: u8,
}

impl Default for ZlibCodec {
    fn default() -> Self { ZlibCodec { level: 4 } }
}

impl ZlibCodec {

    /// Decompress a block produced by this codec, used to verify round trips.
    pub fn decompress_block(&self, compressed: Bytes<'_>) -> Result<ByteVec> {
        miniz_oxide::inflate::decompress_to_vec_zlib(compressed)
            .map_err(|_| Error::invalid("zlib-compressed data malformed"))
    }
}

impl BlockCodec for ZlibCodec {
    fn compress_block(&self, padded_block: Bytes<'_>) -> Result<ByteVec> {
        Ok(miniz_oxide::deflate::compress_to_vec_zlib(padded_block, self.level))
    }
}
