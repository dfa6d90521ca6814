//! The byte size of every block in the file.
//! Sizes of compressed blocks are only known after compression,
//! so the table is filled in while compression runs, possibly on many threads.

use std::ops::Range;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{Error, Result, UnitResult, usize_to_u64};
use crate::meta::Compression;
use crate::segment::Segments;


/// Marks a slot whose size has not been recorded yet.
const UNKNOWN: u64 = u64::MAX;


/// Write-once byte sizes of all blocks, indexed by segment and row-major block index.
/// Each slot transitions from unknown to known exactly once.
/// Recording sizes only requires a shared reference,
/// so that compressor threads can fill the table concurrently.
#[derive(Debug)]
pub struct BlockSizeTable {
    segments: SmallVec<[Box<[AtomicU64]>; 3]>,

    /// Per segment, the relative offsets of the leading blocks whose sizes are all known.
    /// Starts with a single zero and only ever grows, as sizes never change once recorded.
    offsets: SmallVec<[Mutex<Vec<u64>>; 3]>,
}

impl BlockSizeTable {

    /// An empty table for compressed images,
    /// or a complete table for uncompressed images.
    pub fn new(segments: &Segments) -> Self {
        let bytes_per_pixel = segments.bytes_per_pixel();

        BlockSizeTable {
            segments: segments.iter()
                .map(|segment| {
                    let initial = match segments.compression() {
                        Compression::Uncompressed => usize_to_u64(
                            segment.partition.uncompressed_block_byte_size(bytes_per_pixel)
                        ),

                        Compression::Compressed => UNKNOWN,
                    };

                    (0 .. segment.block_count()).map(|_| AtomicU64::new(initial)).collect()
                })
                .collect(),

            offsets: segments.iter()
                .map(|segment| {
                    let mut offsets = Vec::with_capacity(segment.block_count() + 1);
                    offsets.push(0);
                    Mutex::new(offsets)
                })
                .collect(),
        }
    }

    /// Number of segments in this table.
    pub fn segment_count(&self) -> usize { self.segments.len() }

    /// Number of blocks in this segment.
    pub fn block_count(&self, segment: usize) -> usize {
        self.segments.get(segment).map_or(0, |blocks| blocks.len())
    }

    fn slot(&self, segment: usize, block: usize) -> Result<&AtomicU64> {
        self.segments.get(segment)
            .and_then(|blocks| blocks.get(block))
            .ok_or_else(|| Error::invalid(format!("no block {} in segment {}", block, segment)))
    }

    /// Record the byte size of a block.
    /// Recording the same size again has no effect,
    /// recording a different size is an error.
    pub fn set_block_size(&self, segment: usize, block: usize, byte_size: u64) -> UnitResult {
        if byte_size == UNKNOWN {
            return Err(Error::invalid("block size too large"));
        }

        let slot = self.slot(segment, block)?;

        match slot.compare_exchange(UNKNOWN, byte_size, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                trace!(segment, block, byte_size, "recorded block size");
                Ok(())
            },

            Err(existing) if existing == byte_size => Ok(()),
            Err(existing) => Err(Error::DuplicateBlockSize { segment, block, existing, rejected: byte_size }),
        }
    }

    /// The recorded byte size of a block.
    pub fn block_size(&self, segment: usize, block: usize) -> Result<u64> {
        match self.slot(segment, block)?.load(Ordering::Acquire) {
            UNKNOWN => Err(Error::UnknownBlockSize { segment, block }),
            size => Ok(size),
        }
    }

    /// Whether the size of this block has been recorded.
    pub fn is_known(&self, segment: usize, block: usize) -> bool {
        self.block_size(segment, block).is_ok()
    }

    /// The sum of the sizes of these blocks of a segment.
    /// Fails with the first block whose size is unknown.
    pub fn sum(&self, segment: usize, blocks: Range<usize>) -> Result<u64> {
        blocks.map(|block| self.block_size(segment, block)).sum()
    }

    /// The summed size of the first `end` blocks of a segment, where `end` may be the block count.
    /// Each block size is added to the cached offsets only once,
    /// so repeated queries for later blocks do not sum the whole segment again.
    fn offset_before(&self, segment: usize, end: usize) -> Result<u64> {
        let offsets = self.offsets.get(segment)
            .ok_or_else(|| Error::invalid(format!("no segment {}", segment)))?;

        // the cached offsets stay valid even if another thread panicked while extending them
        let mut offsets = offsets.lock().unwrap_or_else(PoisonError::into_inner);

        while offsets.len() <= end {
            let block = offsets.len() - 1;
            let offset = offsets[block] + self.block_size(segment, block)?;
            offsets.push(offset);
        }

        Ok(offsets[end])
    }

    /// The byte position of a block relative to the start of its segment's image data.
    /// Requires the sizes of all preceding blocks in the segment.
    pub fn relative_offset(&self, segment: usize, block: usize) -> Result<u64> {
        self.slot(segment, block)?;
        self.offset_before(segment, block)
    }

    /// The size of the image data of this segment,
    /// if all of its block sizes are known.
    pub fn segment_byte_size(&self, segment: usize) -> Result<u64> {
        self.offset_before(segment, self.block_count(segment))
    }

    /// The first block in this segment whose size is unknown.
    pub fn first_unknown(&self, segment: usize) -> Option<usize> {
        (0 .. self.block_count(segment)).find(|&block| !self.is_known(segment, block))
    }
}



#[cfg(test)]
mod test {
    use super::*;
    use crate::block::BlockDims;
    use crate::meta::ImageDescription;

    fn table(compression: Compression) -> BlockSizeTable {
        let segments = ImageDescription::new((123, 56), 1)
            .with_blocking(BlockDims::new(40, 0))
            .with_max_rows_per_segment(50)
            .with_compression(compression)
            .split().unwrap();

        BlockSizeTable::new(&segments)
    }

    #[test]
    fn uncompressed_sizes_are_prefilled(){
        let table = table(Compression::Uncompressed);
        assert_eq!(table.block_size(0, 1).unwrap(), 40 * 56);
        assert_eq!(table.block_size(2, 0).unwrap(), 23 * 56);
        assert_eq!(table.segment_byte_size(1).unwrap(), 2 * 40 * 56);

        // same value is accepted, different value is rejected
        assert!(table.set_block_size(0, 0, 40 * 56).is_ok());
        assert!(matches!(table.set_block_size(0, 0, 7), Err(Error::DuplicateBlockSize { existing: 2240, rejected: 7, .. })));
    }

    #[test]
    fn compressed_sizes_are_write_once(){
        let table = table(Compression::Compressed);
        assert!(matches!(table.block_size(1, 1), Err(Error::UnknownBlockSize { segment: 1, block: 1 })));

        table.set_block_size(1, 1, 17).unwrap();
        assert_eq!(table.block_size(1, 1).unwrap(), 17);

        table.set_block_size(1, 1, 17).unwrap();
        assert!(matches!(table.set_block_size(1, 1, 18), Err(Error::DuplicateBlockSize { .. })));
        assert_eq!(table.block_size(1, 1).unwrap(), 17);
    }

    #[test]
    fn relative_offset_requires_prefix(){
        let table = table(Compression::Compressed);
        table.set_block_size(0, 1, 11).unwrap();

        assert_eq!(table.relative_offset(0, 0).unwrap(), 0);
        assert!(matches!(table.relative_offset(0, 1), Err(Error::UnknownBlockSize { segment: 0, block: 0 })));

        table.set_block_size(0, 0, 5).unwrap();
        assert_eq!(table.relative_offset(0, 1).unwrap(), 5);
        assert_eq!(table.segment_byte_size(0).unwrap(), 16);
        assert_eq!(table.first_unknown(0), None);
        assert_eq!(table.first_unknown(1), Some(0));
    }

    #[test]
    fn reject_missing_blocks(){
        let table = table(Compression::Compressed);
        assert!(matches!(table.set_block_size(3, 0, 1), Err(Error::Invalid(_))));
        assert!(matches!(table.set_block_size(2, 1, 1), Err(Error::Invalid(_))));
        assert!(matches!(table.relative_offset(0, 2), Err(Error::Invalid(_))));
    }

    #[test]
    fn concurrent_insertion(){
        let table = table(Compression::Compressed);

        std::thread::scope(|scope| {
            for segment in 0 .. table.segment_count() {
                let table = &table;
                scope.spawn(move || {
                    for block in 0 .. table.block_count(segment) {
                        table.set_block_size(segment, block, (segment * 10 + block) as u64).unwrap();
                    }
                });
            }
        });

        assert_eq!(table.segment_byte_size(0).unwrap(), 1);
        assert_eq!(table.segment_byte_size(1).unwrap(), 21);
        assert_eq!(table.segment_byte_size(2).unwrap(), 20);
    }

    #[test]
    fn offsets_extend_as_sizes_arrive(){
        let segments = ImageDescription::new((100, 4), 1)
            .with_blocking(BlockDims::new(10, 0))
            .with_compression(Compression::Compressed)
            .split().unwrap();

        let table = BlockSizeTable::new(&segments);
        for block in 0 .. 5 {
            table.set_block_size(0, block, block as u64 + 1).unwrap();
        }

        assert_eq!(table.relative_offset(0, 4).unwrap(), 1 + 2 + 3 + 4);
        assert!(matches!(table.relative_offset(0, 9), Err(Error::UnknownBlockSize { segment: 0, block: 5 })));
        assert!(matches!(table.segment_byte_size(0), Err(Error::UnknownBlockSize { segment: 0, block: 5 })));

        // earlier offsets are answered from the cache while later blocks are still unknown
        assert_eq!(table.relative_offset(0, 2).unwrap(), 3);
        assert_eq!(table.relative_offset(0, 5).unwrap(), 15);

        for block in 5 .. 10 {
            table.set_block_size(0, block, 100).unwrap();
        }

        assert_eq!(table.relative_offset(0, 9).unwrap(), 15 + 4 * 100);
        assert_eq!(table.segment_byte_size(0).unwrap(), 15 + 5 * 100);
        assert_eq!(table.relative_offset(0, 7).unwrap(), 15 + 2 * 100);
        assert_eq!(table.sum(0, 3 .. 7).unwrap(), 4 + 5 + 100 + 100);

        assert!(matches!(table.segment_byte_size(1), Err(Error::Invalid(_))));
    }

    #[test]
    fn concurrent_offset_queries(){
        let table = table(Compression::Uncompressed);

        std::thread::scope(|scope| {
            for _ in 0 .. 4 {
                let table = &table;
                scope.spawn(move || {
                    for block in (0 .. 2).rev() {
                        assert_eq!(table.relative_offset(1, block).unwrap(), block as u64 * 40 * 56);
                    }

                    assert_eq!(table.segment_byte_size(2).unwrap(), 23 * 56);
                });
            }
        });
    }
}
