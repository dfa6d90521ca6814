//! Describes the image that is written and the structural bytes around its pixels.
//! The structural bytes (file header, image subheaders, trailing metadata segments)
//! are encoded elsewhere and handled here only as opaque byte blobs.

use smallvec::SmallVec;

use crate::block::BlockDims;
use crate::compression::ByteVec;
use crate::error::{Error, Result, UnitResult};
use crate::math::RowCol;
use crate::segment::Segments;


/// Whether block sizes are known before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {

    /// Store padded blocks verbatim.
    /// Every block has the same size, which is known when the layout is created.
    #[default]
    Uncompressed,

    /// Every block is compressed independently by a codec outside of this crate.
    /// The size of each block must be recorded before the block can be written.
    Compressed,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Compression::Uncompressed => "uncompressed",
            Compression::Compressed => "compressed",
        })
    }
}


/// Describes the logical image, before it is split into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescription {

    /// Rows and columns of the whole image.
    pub extent: RowCol<usize>,

    /// Requested block size. Zero means a single block for that axis.
    pub block_dims: BlockDims,

    /// Size of a single pixel in bytes.
    pub bytes_per_pixel: usize,

    /// If set, the image is split into several segments
    /// with at most this many rows each.
    pub max_rows_per_segment: Option<usize>,

    /// How the blocks are stored.
    pub compression: Compression,
}

impl ImageDescription {

    /// An uncompressed image of a single segment and a single block.
    /// Use `with_blocking` and similar methods to add further properties.
    pub fn new(extent: impl Into<RowCol<usize>>, bytes_per_pixel: usize) -> Self {
        ImageDescription {
            extent: extent.into(),
            block_dims: BlockDims::WHOLE,
            bytes_per_pixel,
            max_rows_per_segment: None,
            compression: Compression::Uncompressed,
        }
    }

    /// Divide each segment into blocks of this size.
    pub fn with_blocking(self, block_dims: BlockDims) -> Self {
        Self { block_dims, .. self }
    }

    /// Split the image into segments of at most this many rows.
    pub fn with_max_rows_per_segment(self, max_rows_per_segment: usize) -> Self {
        Self { max_rows_per_segment: Some(max_rows_per_segment), .. self }
    }

    /// Set how the blocks are stored.
    pub fn with_compression(self, compression: Compression) -> Self {
        Self { compression, .. self }
    }

    /// Check the values that do not depend on the segment policy.
    pub fn validate(&self) -> UnitResult {
        if self.bytes_per_pixel == 0 {
            return Err(Error::invalid("pixels must have at least one byte"));
        }

        if self.extent.cols == 0 {
            return Err(Error::invalid("image must have at least one column"));
        }

        Ok(())
    }

    /// Split this image into segments and blocks.
    pub fn split(&self) -> Result<Segments> {
        Segments::new(self)
    }
}


/// One trailing segment of the file that does not contain pixels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataSegment {

    /// The encoded subheader of this segment.
    pub header: ByteVec,

    /// The contents of this segment.
    pub data: ByteVec,
}

impl MetadataSegment {

    /// Total number of bytes of header and data.
    pub fn byte_len(&self) -> usize {
        self.header.len() + self.data.len()
    }
}


/// All bytes of the file that are not derived from pixels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuralBytes {

    /// The encoded file header, at the start of the file.
    pub file_header: ByteVec,

    /// One encoded subheader for each image segment, in segment order.
    pub image_subheaders: SmallVec<[ByteVec; 3]>,

    /// Segments that follow the last image segment, in file order.
    pub metadata_segments: Vec<MetadataSegment>,
}

impl StructuralBytes {

    /// Structural bytes without trailing metadata segments.
    pub fn new(file_header: ByteVec, image_subheaders: impl IntoIterator<Item = ByteVec>) -> Self {
        StructuralBytes {
            file_header,
            image_subheaders: image_subheaders.into_iter().collect(),
            metadata_segments: Vec::new(),
        }
    }

    /// Append these segments after the image data.
    pub fn with_metadata_segments(self, metadata_segments: Vec<MetadataSegment>) -> Self {
        Self { metadata_segments, .. self }
    }

    /// Requires exactly one subheader per image segment.
    pub fn validate(&self, segment_count: usize) -> UnitResult {
        if self.image_subheaders.len() != segment_count {
            return Err(Error::invalid(format!(
                "image has {} segments but {} subheaders were supplied",
                segment_count, self.image_subheaders.len()
            )));
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_methods(){
        let description = ImageDescription::new((123, 56), 1)
            .with_blocking(BlockDims::new(40, 0))
            .with_max_rows_per_segment(50)
            .with_compression(Compression::Compressed);

        assert_eq!(description.extent, RowCol::new(123, 56));
        assert_eq!(description.block_dims, BlockDims::new(40, 0));
        assert_eq!(description.max_rows_per_segment, Some(50));
        assert_eq!(description.compression, Compression::Compressed);
    }

    #[test]
    fn reject_empty_pixels(){
        assert!(ImageDescription::new((10, 10), 0).validate().is_err());
        assert!(ImageDescription::new((10, 0), 1).validate().is_err());
        assert!(ImageDescription::new((10, 10), 2).validate().is_ok());
    }

    #[test]
    fn subheader_count_must_match(){
        let structure = StructuralBytes::new(vec![ 1, 2 ], vec![ vec![ 3 ], vec![ 4 ] ]);
        assert!(structure.validate(2).is_ok());
        assert!(structure.validate(3).is_err());
    }
}
