//! Plan where each part of the file is placed.
//! The skeleton (file header, subheaders, metadata segments) is known up front,
//! while the image data length of a compressed segment is only fixed
//! after every block of that segment has been compressed.

use std::ops::Range;
use std::sync::OnceLock;

use smallvec::SmallVec;
use tracing::debug;

use crate::error::{Error, Result, UnitResult, usize_to_u64};
use crate::meta::StructuralBytes;
use crate::segment::Segments;
use crate::sizes::BlockSizeTable;


/// The kind of a contiguous byte range in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {

    /// The file header, always at the start of the file.
    FileHeader,

    /// The subheader of the image segment with this index.
    ImageSubheader(usize),

    /// All blocks of the image segment with this index.
    ImageData(usize),

    /// The subheader of the trailing metadata segment with this index.
    MetadataHeader(usize),

    /// The contents of the trailing metadata segment with this index.
    MetadataData(usize),
}

/// A contiguous byte range in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {

    /// What the bytes contain.
    pub kind: RegionKind,

    /// Absolute byte positions in the file.
    pub bytes: Range<u64>,
}

/// Whether the image data length of a segment is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {

    /// Some blocks of this segment have an unknown size.
    Draft {

        /// Number of blocks whose size is known.
        known_blocks: usize,

        /// Number of blocks in this segment.
        block_count: usize,
    },

    /// All block sizes of this segment are known.
    Finalized {

        /// Sum of all block sizes of this segment.
        image_data_len: u64,
    },
}


/// Byte positions of all parts of the file.
/// Each segment is finalized on its own, as soon as all of its blocks are known,
/// and stays finalized, because block sizes are never changed once recorded.
#[derive(Debug)]
pub struct Layout {
    file_header_len: u64,
    subheader_lens: SmallVec<[u64; 3]>,
    metadata_lens: Vec<(u64, u64)>,
    image_data_lens: SmallVec<[OnceLock<u64>; 3]>,
}

impl Layout {

    /// Plan the skeleton of the file.
    /// Only the lengths of the structural bytes are used.
    pub fn new(segments: &Segments, structure: &StructuralBytes) -> Result<Self> {
        structure.validate(segments.len())?;

        Ok(Layout {
            file_header_len: usize_to_u64(structure.file_header.len()),

            subheader_lens: structure.image_subheaders.iter()
                .map(|subheader| usize_to_u64(subheader.len()))
                .collect(),

            metadata_lens: structure.metadata_segments.iter()
                .map(|segment| (usize_to_u64(segment.header.len()), usize_to_u64(segment.data.len())))
                .collect(),

            image_data_lens: segments.iter().map(|_| OnceLock::new()).collect(),
        })
    }

    /// Number of image segments.
    pub fn segment_count(&self) -> usize { self.subheader_lens.len() }

    /// Byte length of the file header.
    pub fn file_header_len(&self) -> u64 { self.file_header_len }

    fn check_segment(&self, segment: usize) -> UnitResult {
        if segment >= self.segment_count() {
            return Err(Error::invalid(format!("no segment {}", segment)));
        }

        Ok(())
    }

    /// Byte length of the subheader of this segment.
    pub fn subheader_len(&self, segment: usize) -> Result<u64> {
        self.subheader_lens.get(segment).copied()
            .ok_or_else(|| Error::invalid(format!("no segment {}", segment)))
    }

    /// Byte length of all trailing metadata segments.
    pub fn metadata_len(&self) -> u64 {
        self.metadata_lens.iter().map(|(header, data)| header + data).sum()
    }

    /// Whether the image data length of this segment is fixed.
    /// Finalizes the segment if all of its block sizes became known.
    pub fn segment_state(&self, segment: usize, table: &BlockSizeTable) -> Result<RegionState> {
        let finalized = self.image_data_lens.get(segment)
            .ok_or_else(|| Error::invalid(format!("no segment {}", segment)))?;

        if let Some(&image_data_len) = finalized.get() {
            return Ok(RegionState::Finalized { image_data_len });
        }

        match table.segment_byte_size(segment) {
            Ok(image_data_len) => {
                if finalized.set(image_data_len).is_ok() {
                    debug!(segment, image_data_len, "finalized segment layout");
                }

                Ok(RegionState::Finalized { image_data_len })
            },

            Err(_) => {
                let block_count = table.block_count(segment);
                let known_blocks = (0 .. block_count)
                    .filter(|&block| table.is_known(segment, block))
                    .count();

                Ok(RegionState::Draft { known_blocks, block_count })
            }
        }
    }

    /// The byte length of all blocks of this segment.
    pub fn image_data_len(&self, segment: usize, table: &BlockSizeTable) -> Result<u64> {
        match self.segment_state(segment, table)? {
            RegionState::Finalized { image_data_len } => Ok(image_data_len),
            RegionState::Draft { .. } => Err(Error::LayoutNotFinalized { segment }),
        }
    }

    /// Absolute byte position of the subheader of this segment.
    /// Requires all previous segments to be finalized.
    pub fn subheader_offset(&self, segment: usize, table: &BlockSizeTable) -> Result<u64> {
        if segment > self.segment_count() {
            return Err(Error::invalid(format!("no segment {}", segment)));
        }

        (0 .. segment).try_fold(self.file_header_len, |offset, previous| {
            Ok(offset + self.subheader_lens[previous] + self.image_data_len(previous, table)?)
        })
    }

    /// Absolute byte position of the first block of this segment.
    /// Requires all previous segments to be finalized.
    pub fn image_data_offset(&self, segment: usize, table: &BlockSizeTable) -> Result<u64> {
        self.check_segment(segment)?;
        Ok(self.subheader_offset(segment, table)? + self.subheader_lens[segment])
    }

    /// Absolute byte position of the first trailing metadata segment.
    /// Requires all segments to be finalized.
    pub fn metadata_offset(&self, table: &BlockSizeTable) -> Result<u64> {
        self.subheader_offset(self.segment_count(), table)
    }

    /// Total byte length of the file.
    /// Requires all segments to be finalized.
    pub fn file_len(&self, table: &BlockSizeTable) -> Result<u64> {
        Ok(self.metadata_offset(table)? + self.metadata_len())
    }

    /// Fails with the first segment that still has blocks of unknown size.
    pub fn finalize(&self, table: &BlockSizeTable) -> UnitResult {
        for segment in 0 .. self.segment_count() {
            self.image_data_len(segment, table)?;
        }

        Ok(())
    }

    /// All byte ranges of the file, in file order.
    /// Requires all segments to be finalized.
    pub fn regions(&self, table: &BlockSizeTable) -> Result<Vec<Region>> {
        let mut regions = Vec::with_capacity(1 + 2 * self.segment_count() + 2 * self.metadata_lens.len());
        let mut offset = 0;

        let mut push = |kind: RegionKind, len: u64| {
            regions.push(Region { kind, bytes: offset .. offset + len });
            offset += len;
        };

        push(RegionKind::FileHeader, self.file_header_len);

        for segment in 0 .. self.segment_count() {
            push(RegionKind::ImageSubheader(segment), self.subheader_lens[segment]);
            push(RegionKind::ImageData(segment), self.image_data_len(segment, table)?);
        }

        for (index, &(header, data)) in self.metadata_lens.iter().enumerate() {
            push(RegionKind::MetadataHeader(index), header);
            push(RegionKind::MetadataData(index), data);
        }

        Ok(regions)
    }
}
