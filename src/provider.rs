//! Assemble the bytes of a file from block payloads that arrive in any grouping.
//! For a range of image rows, the provider computes where in the file the bytes belong
//! and which structural bytes (file header, subheaders, metadata segments)
//! must be written together with the blocks of these rows.
//!
//! Writing all row ranges of an image, in any decomposition,
//! produces the same file as writing the whole image at once.

use std::ops::Range;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::block::BlockIndex;
use crate::compression::{ByteVec, Bytes};
use crate::error::{Error, Result, UnitResult, u64_to_usize, usize_to_u64};
use crate::layout::{Layout, Region, RegionState};
use crate::meta::StructuralBytes;
use crate::segment::Segments;
use crate::sizes::BlockSizeTable;


/// An ordered list of byte slices.
/// Writing all slices one after another, starting at the associated file offset,
/// places the bytes correctly in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferList<'b> {
    buffers: SmallVec<[Bytes<'b>; 8]>,
}

impl<'b> BufferList<'b> {

    /// A list without any buffers.
    pub fn new() -> Self { Self::default() }

    /// Append a slice. Empty slices are skipped.
    pub fn push(&mut self, bytes: Bytes<'b>) {
        if !bytes.is_empty() {
            self.buffers.push(bytes);
        }
    }

    /// All slices, in file order.
    pub fn as_slice(&self) -> &[Bytes<'b>] { &self.buffers }

    /// Number of slices.
    pub fn len(&self) -> usize { self.buffers.len() }

    /// Whether there are no slices.
    pub fn is_empty(&self) -> bool { self.buffers.is_empty() }

    /// Iterate all slices, in file order.
    pub fn iter(&self) -> impl Iterator<Item = Bytes<'b>> + '_ {
        self.buffers.iter().copied()
    }

    /// Total number of bytes in all slices.
    pub fn num_bytes(&self) -> u64 {
        self.buffers.iter().map(|buffer| usize_to_u64(buffer.len())).sum()
    }

    /// Concatenate all slices into a single vector.
    pub fn to_vec(&self) -> ByteVec {
        self.buffers.concat()
    }
}

impl<'b> IntoIterator for BufferList<'b> {
    type Item = Bytes<'b>;
    type IntoIter = smallvec::IntoIter<[Bytes<'b>; 8]>;
    fn into_iter(self) -> Self::IntoIter { self.buffers.into_iter() }
}


/// The blocks of one segment covered by a row range.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CoveredBlocks {
    segment: usize,
    blocks: Range<usize>,
    includes_subheader: bool,
}

/// The part of the file that a write of a row range covers.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Span {
    includes_file_header: bool,
    covered: SmallVec<[CoveredBlocks; 3]>,
    includes_metadata: bool,
}


/// Computes file offsets and assembles write buffers for streamed block payloads.
///
/// A write of the rows `start .. end` covers
/// the file header if `start` is the first image row,
/// the subheader of each segment whose first row is included,
/// the blocks of all included rows,
/// and the trailing metadata segments if `end` is the last image row.
///
/// The provider can be shared between threads,
/// which may record block sizes and request buffers for disjoint rows concurrently.
#[derive(Debug)]
pub struct ByteProvider {
    segments: Segments,
    structure: StructuralBytes,
    table: BlockSizeTable,
    layout: Layout,
}

impl ByteProvider {

    /// Plan the file for these segments and structural bytes.
    /// For uncompressed images, all block sizes are known immediately.
    pub fn new(segments: Segments, structure: StructuralBytes) -> Result<Self> {
        let layout = Layout::new(&segments, &structure)?;
        let table = BlockSizeTable::new(&segments);

        debug!(
            segments = segments.len(), blocks = segments.block_count(),
            rows = segments.total_rows(), compression = %segments.compression(),
            "created byte provider"
        );

        Ok(ByteProvider { segments, structure, table, layout })
    }

    /// Plan the file and immediately record the sizes of all blocks,
    /// listed per segment in row-major block order.
    pub fn with_block_sizes(segments: Segments, structure: StructuralBytes, block_sizes: &[Vec<u64>]) -> Result<Self> {
        let provider = Self::new(segments, structure)?;

        if block_sizes.len() != provider.segments.len() {
            return Err(Error::invalid("block sizes must be listed for every segment"));
        }

        for (segment, sizes) in block_sizes.iter().enumerate() {
            if sizes.len() != provider.table.block_count(segment) {
                return Err(Error::invalid(format!("segment {} has a different number of blocks", segment)));
            }

            for (block, &size) in sizes.iter().enumerate() {
                provider.set_block_size(segment, block, size)?;
            }
        }

        Ok(provider)
    }

    /// The segments of the image.
    pub fn segments(&self) -> &Segments { &self.segments }

    /// The structural bytes written around the pixels.
    pub fn structure(&self) -> &StructuralBytes { &self.structure }

    /// The recorded block sizes.
    pub fn block_sizes(&self) -> &BlockSizeTable { &self.table }

    /// The planned positions of all file parts.
    pub fn layout(&self) -> &Layout { &self.layout }

    /// Number of rows of the whole image.
    pub fn total_rows(&self) -> usize { self.segments.total_rows() }

    /// Record the byte size of a block. May be called from multiple threads.
    /// Recording a different size for the same block again is an error.
    pub fn set_block_size(&self, segment: usize, block: usize, byte_size: u64) -> UnitResult {
        self.table.set_block_size(segment, block, byte_size)
    }

    /// The recorded byte size of a block.
    pub fn block_size(&self, segment: usize, block: usize) -> Result<u64> {
        self.table.block_size(segment, block)
    }

    /// Absolute position of a block in the file.
    /// Requires all previous segments to be finalized
    /// and the sizes of all previous blocks of this segment.
    pub fn block_file_offset(&self, segment: usize, block: usize) -> Result<u64> {
        if segment >= self.segments.len() {
            return Err(Error::invalid(format!("no segment {}", segment)));
        }

        let relative = self.table.relative_offset(segment, block)?;
        Ok(self.layout.image_data_offset(segment, &self.table)? + relative)
    }

    /// Whether the image data length of this segment is fixed.
    pub fn segment_state(&self, segment: usize) -> Result<RegionState> {
        self.layout.segment_state(segment, &self.table)
    }

    /// Fails with the first segment that has blocks of unknown size.
    pub fn finalize(&self) -> UnitResult {
        self.layout.finalize(&self.table)
    }

    /// Total byte length of the file. Requires a finalized layout.
    pub fn file_len(&self) -> Result<u64> {
        self.layout.file_len(&self.table)
    }

    /// All byte ranges of the file, in file order. Requires a finalized layout.
    pub fn regions(&self) -> Result<Vec<Region>> {
        self.layout.regions(&self.table)
    }

    /// The image data length of every segment, in segment order.
    /// The file header usually contains these numbers.
    pub fn segment_data_lengths(&self) -> Result<SmallVec<[u64; 3]>> {
        (0 .. self.segments.len())
            .map(|segment| self.layout.image_data_len(segment, &self.table))
            .collect()
    }

    /// Replace the file header, after the segment lengths are known.
    /// The new header must have exactly the same length as the old one,
    /// as all offsets in the file depend on it.
    pub fn replace_file_header(&mut self, file_header: ByteVec) -> UnitResult {
        if file_header.len() != self.structure.file_header.len() {
            return Err(Error::invalid(format!(
                "file header must have {} bytes, not {}",
                self.structure.file_header.len(), file_header.len()
            )));
        }

        self.structure.file_header = file_header;
        Ok(())
    }


    /// Validates the rows and finds the covered parts of the file.
    /// Does not require any block sizes.
    fn span(&self, start_row: usize, row_count: usize) -> Result<Span> {
        if row_count == 0 {
            return Err(Error::invalid("row range must not be empty"));
        }

        self.segments.check_bounds(start_row, row_count)?;
        let end_row = start_row + row_count;

        let covered = self.segments.intersecting(start_row .. end_row)
            .map(|(segment, local_rows)| {
                let includes_subheader = local_rows.start == 0;

                let blocks = segment.partition.aligned_blocks(local_rows)
                    .ok_or(Error::UnalignedRange { start_row, row_count })?;

                Ok(CoveredBlocks { segment: segment.index, blocks, includes_subheader })
            })
            .collect::<Result<SmallVec<[CoveredBlocks; 3]>>>()?;

        Ok(Span {
            includes_file_header: start_row == 0,
            includes_metadata: end_row == self.segments.total_rows(),
            covered,
        })
    }

    /// The byte length of the covered blocks of each touched segment.
    fn payload_lengths(&self, span: &Span) -> Result<SmallVec<[u64; 3]>> {
        span.covered.iter()
            .map(|covered| self.table.sum(covered.segment, covered.blocks.clone()))
            .collect()
    }

    /// The byte length of all structural bytes covered by the span.
    fn structural_len(&self, span: &Span) -> Result<u64> {
        let file_header = if span.includes_file_header { self.layout.file_header_len() } else { 0 };
        let metadata = if span.includes_metadata { self.layout.metadata_len() } else { 0 };

        let subheaders: u64 = span.covered.iter()
            .filter(|covered| covered.includes_subheader)
            .map(|covered| self.layout.subheader_len(covered.segment))
            .sum::<Result<u64>>()?;

        Ok(file_header + subheaders + metadata)
    }

    /// The absolute position of the first byte covered by the span.
    fn span_offset(&self, span: &Span) -> Result<u64> {
        if span.includes_file_header {
            return Ok(0);
        }

        let first = span.covered.first()
            .ok_or_else(|| Error::invalid("row range does not touch any segment"))?;

        if first.includes_subheader {
            self.layout.subheader_offset(first.segment, &self.table)
        }
        else {
            self.block_file_offset(first.segment, first.blocks.start)
        }
    }

    /// The blocks whose bytes make up the payload of a write of these rows, in file order.
    pub fn covered_blocks(&self, start_row: usize, row_count: usize) -> Result<Vec<BlockIndex>> {
        let span = self.span(start_row, row_count)?;

        Ok(span.covered.iter()
            .flat_map(|covered| covered.blocks.clone().map(move |block| BlockIndex { segment: covered.segment, block }))
            .collect())
    }

    /// The total number of bytes that a write of these rows covers,
    /// including all structural bytes inside that part of the file.
    /// Requires the sizes of all covered blocks.
    pub fn num_bytes(&self, start_row: usize, row_count: usize) -> Result<u64> {
        let span = self.span(start_row, row_count)?;
        let payload: u64 = self.payload_lengths(&span)?.iter().sum();
        Ok(payload + self.structural_len(&span)?)
    }

    /// Assemble the write for these rows.
    ///
    /// The `payload` contains the bytes of every block of these rows,
    /// concatenated in file order, and nothing else.
    /// The rows must start and end on block rows of all touched segments,
    /// although the last block row of a segment may be short.
    ///
    /// Returns the absolute file offset where writing starts,
    /// and the buffers to be written there, one after another.
    /// The buffers borrow from the payload and from this provider.
    pub fn get_bytes<'b>(&'b self, payload: Bytes<'b>, start_row: usize, row_count: usize) -> Result<(u64, BufferList<'b>)> {
        let span = self.span(start_row, row_count)?;
        let payload_lengths = self.payload_lengths(&span)?;

        let expected: u64 = payload_lengths.iter().sum();
        let actual = usize_to_u64(payload.len());
        if payload.is_empty() || actual != expected {
            return Err(Error::PayloadSizeMismatch { expected, actual });
        }

        let file_offset = self.span_offset(&span)?;

        let mut buffers = BufferList::new();
        let mut remaining_payload = payload;

        if span.includes_file_header {
            buffers.push(&self.structure.file_header);
        }

        for (covered, &byte_len) in span.covered.iter().zip(&payload_lengths) {
            if covered.includes_subheader {
                buffers.push(&self.structure.image_subheaders[covered.segment]);
            }

            let (blocks, rest) = remaining_payload.split_at(u64_to_usize(byte_len, "payload too large")?);
            buffers.push(blocks);
            remaining_payload = rest;
        }

        if span.includes_metadata {
            for segment in &self.structure.metadata_segments {
                buffers.push(&segment.header);
                buffers.push(&segment.data);
            }
        }

        debug_assert!(remaining_payload.is_empty(), "payload not consumed");
        debug_assert!(
            self.structural_len(&span).map_or(false, |len| buffers.num_bytes() == expected + len),
            "buffer length mismatch"
        );

        trace!(start_row, row_count, file_offset, buffers = buffers.len(), "assembled write buffers");
        Ok((file_offset, buffers))
    }
}
