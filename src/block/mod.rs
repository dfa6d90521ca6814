//! Divide an image segment into row-major blocks of pixels.
//! Computes how many blocks an image has, which pixels each block covers,
//! and how the source rows are rearranged into padded blocks before compression.

pub mod writer;

use std::ops::Range;

use crate::error::{Error, Result, UnitResult};
use crate::math::{RoundingMode, RowCol};


/// Identifies a single block inside the file.
#[derive(Clone, Copy, Eq, Hash, PartialEq, Debug, PartialOrd, Ord)]
pub struct BlockIndex {

    /// Index of the image segment that contains the block.
    pub segment: usize,

    /// Row-major index of the block inside its segment.
    pub block: usize,
}

/// The requested number of pixel rows and columns per block.
/// A zero in either axis means that a single block spans the whole axis.
#[derive(Clone, Copy, Eq, Hash, PartialEq, Debug, Default)]
pub struct BlockDims {

    /// Pixel rows per block, or zero for the whole segment height.
    pub rows: usize,

    /// Pixel columns per block, or zero for the whole image width.
    pub cols: usize,
}

impl BlockDims {

    /// One block covers the complete segment.
    pub const WHOLE: BlockDims = BlockDims { rows: 0, cols: 0 };

    /// Blocks of the specified size. Zero means "whole axis".
    pub fn new(rows: usize, cols: usize) -> Self {
        BlockDims { rows, cols }
    }

    /// Replace the whole-axis sentinel with the actual extent
    /// and never exceed the extent.
    pub fn resolve(self, extent: RowCol<usize>) -> RowCol<usize> {
        let resolve_axis = |nominal: usize, full: usize| {
            if nominal == 0 { full } else { nominal.min(full) }
        };

        RowCol::new(
            resolve_axis(self.rows, extent.rows),
            resolve_axis(self.cols, extent.cols),
        )
    }
}


/// Number of blocks along one axis. The last block may reach past the image.
pub fn compute_block_count(full_res: usize, block_size: usize) -> usize {
    RoundingMode::Up.divide(full_res, block_size)
}

/// First pixel and valid pixel count of a block along one axis.
#[inline]
pub fn calculate_block_position_and_size(total_size: usize, block_size: usize, block_index: usize) -> Result<(usize, usize)> {
    let block_position = block_size.checked_mul(block_index)
        .ok_or_else(|| Error::invalid("block index"))?;

    Ok((
        block_position,
        calculate_block_size(total_size, block_size, block_position)?
    ))
}

/// Valid pixels of the block starting at this position.
/// Only the last block along an axis is cut off by the image edge, the rest is padding.
#[inline]
pub fn calculate_block_size(total_size: usize, block_size: usize, block_position: usize) -> Result<usize> {
    if block_position >= total_size {
        return Err(Error::invalid("block index"))
    }

    Ok(block_size.min(total_size - block_position))
}


/// How the pixels of one image segment are divided into blocks.
/// Every block occupies the full block size in memory,
/// the last block row and block column may contain pad pixels.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct BlockPartition {
    extent: RowCol<usize>,
    block_size: RowCol<usize>,
    block_counts: RowCol<usize>,
}

impl BlockPartition {

    /// Partition an image of the specified extent.
    /// Block dimensions larger than the extent are clamped to the extent.
    pub fn new(extent: RowCol<usize>, block_dims: BlockDims) -> Result<Self> {
        if extent.rows == 0 || extent.cols == 0 {
            return Err(Error::invalid("image extent must contain at least one pixel"));
        }

        let block_size = block_dims.resolve(extent);

        Ok(BlockPartition {
            extent,
            block_size,
            block_counts: RowCol::new(
                compute_block_count(extent.rows, block_size.rows),
                compute_block_count(extent.cols, block_size.cols),
            ),
        })
    }

    /// Rows and columns of the partitioned image.
    pub fn extent(&self) -> RowCol<usize> { self.extent }

    /// The padded extent of every block.
    pub fn block_size(&self) -> RowCol<usize> { self.block_size }

    /// Number of blocks in horizontal direction.
    pub fn blocks_per_row(&self) -> usize { self.block_counts.cols }

    /// Number of blocks in vertical direction.
    pub fn blocks_per_col(&self) -> usize { self.block_counts.rows }

    /// Total number of blocks.
    pub fn block_count(&self) -> usize { self.block_counts.area() }

    /// The row-major index of the block at this block row and block column.
    pub fn block_index(&self, block_row: usize, block_col: usize) -> usize {
        debug_assert!(block_col < self.blocks_per_row(), "block column out of range");
        block_row * self.blocks_per_row() + block_col
    }

    /// The block row and block column of the block at this row-major index.
    pub fn block_position(&self, block_index: usize) -> RowCol<usize> {
        RowCol::new(block_index / self.blocks_per_row(), block_index % self.blocks_per_row())
    }

    /// The pixels of the source image covered by this block, excluding padding.
    pub fn valid_extent(&self, block_row: usize, block_col: usize) -> Result<RowCol<usize>> {
        let (_, rows) = calculate_block_position_and_size(self.extent.rows, self.block_size.rows, block_row)?;
        let (_, cols) = calculate_block_position_and_size(self.extent.cols, self.block_size.cols, block_col)?;
        Ok(RowCol::new(rows, cols))
    }

    /// Byte size of a single block, including padding, before compression.
    pub fn uncompressed_block_byte_size(&self, bytes_per_pixel: usize) -> usize {
        self.block_size.area() * bytes_per_pixel
    }

    /// Byte size of one complete row of blocks, including padding.
    fn block_row_byte_size(&self, bytes_per_pixel: usize) -> usize {
        self.uncompressed_block_byte_size(bytes_per_pixel) * self.blocks_per_row()
    }

    /// The block rows exactly covered by these pixel rows.
    /// Returns `None` if the rows do not begin and end on block boundaries.
    /// The last block row may be short, so the rows may end at the image height.
    pub fn aligned_block_rows(&self, rows: Range<usize>) -> Option<Range<usize>> {
        let block_rows = self.block_size.rows;

        let start_aligned = rows.start % block_rows == 0;
        let end_aligned = rows.end % block_rows == 0 || rows.end == self.extent.rows;

        if !start_aligned || !end_aligned || rows.end > self.extent.rows || rows.start > rows.end {
            return None;
        }

        Some(rows.start / block_rows .. compute_block_count(rows.end, block_rows))
    }

    /// The row-major block indices exactly covered by these pixel rows.
    pub fn aligned_blocks(&self, rows: Range<usize>) -> Option<Range<usize>> {
        let block_rows = self.aligned_block_rows(rows)?;
        Some(block_rows.start * self.blocks_per_row() .. block_rows.end * self.blocks_per_row())
    }

    fn end_row(&self, start_row: usize, row_count: usize) -> Result<usize> {
        let total_rows = self.extent.rows;
        let end_row = start_row.checked_add(row_count)
            .ok_or(Error::RangeOutOfBounds { end_row: usize::MAX, total_rows })?;

        if end_row > total_rows {
            return Err(Error::RangeOutOfBounds { end_row, total_rows });
        }

        Ok(end_row)
    }

    fn check_rows(&self, start_row: usize, row_count: usize) -> Result<Range<usize>> {
        let end_row = self.end_row(start_row, row_count)?;

        self.aligned_block_rows(start_row .. end_row)
            .ok_or(Error::UnalignedRange { start_row, row_count })
    }

    /// The number of bytes needed to hold these source rows as whole padded blocks.
    /// The row count is rounded up to complete block rows.
    /// The first row must be the first row of a block.
    pub fn num_bytes_required(&self, start_row: usize, row_count: usize, bytes_per_pixel: usize) -> Result<usize> {
        self.end_row(start_row, row_count)?;

        if start_row % self.block_size.rows != 0 {
            return Err(Error::UnalignedRange { start_row, row_count });
        }

        let block_rows = compute_block_count(row_count, self.block_size.rows);
        Ok(block_rows * self.block_row_byte_size(bytes_per_pixel))
    }

    /// Rearrange full-width source rows into consecutive padded blocks.
    /// The `source` contains `row_count` rows of `extent.cols` pixels.
    /// Pixels outside the image are set to `fill`.
    /// The `output` must have exactly `num_bytes_required` bytes.
    pub fn block(
        &self, source: &[u8], start_row: usize, row_count: usize,
        bytes_per_pixel: usize, fill: u8, output: &mut [u8]
    ) -> UnitResult
    {
        let block_rows = self.check_rows(start_row, row_count)?;

        let source_row_bytes = self.extent.cols * bytes_per_pixel;
        if source.len() < row_count * source_row_bytes {
            return Err(Error::invalid("source contains fewer rows than requested"));
        }

        if output.len() != block_rows.len() * self.block_row_byte_size(bytes_per_pixel) {
            return Err(Error::invalid("output size does not match the covered blocks"));
        }

        let block_row_bytes = self.block_size.cols * bytes_per_pixel;
        let mut output_blocks = output.chunks_exact_mut(self.uncompressed_block_byte_size(bytes_per_pixel));

        for block_row in block_rows {
            for block_col in 0 .. self.blocks_per_row() {
                let valid = self.valid_extent(block_row, block_col)?;
                let block = output_blocks.next()
                    .ok_or_else(|| Error::invalid("output block count mismatch"))?;

                let first_source_row = block_row * self.block_size.rows - start_row;
                let first_source_byte = block_col * block_row_bytes;
                let valid_row_bytes = valid.cols * bytes_per_pixel;

                for (row_in_block, block_line) in block.chunks_exact_mut(block_row_bytes).enumerate() {
                    let (valid_bytes, pad_bytes) = block_line.split_at_mut(
                        if row_in_block < valid.rows { valid_row_bytes } else { 0 }
                    );

                    if !valid_bytes.is_empty() {
                        let line_start = (first_source_row + row_in_block) * source_row_bytes + first_source_byte;
                        valid_bytes.copy_from_slice(&source[line_start .. line_start + valid_row_bytes]);
                    }

                    pad_bytes.fill(fill);
                }
            }
        }

        Ok(())
    }
}



#[cfg(test)]
mod test {
    use super::*;

    fn partition(rows: usize, cols: usize, block_rows: usize, block_cols: usize) -> BlockPartition {
        BlockPartition::new(RowCol::new(rows, cols), BlockDims::new(block_rows, block_cols)).unwrap()
    }

    #[test]
    fn zero_block_dims_span_whole_image(){
        let whole = partition(123, 56, 0, 0);
        assert_eq!(whole.block_size(), RowCol::new(123, 56));
        assert_eq!(whole.block_count(), 1);

        let exact = partition(123, 56, 123, 56);
        assert_eq!(exact, whole);

        let clamped = partition(23, 56, 40, 100);
        assert_eq!(clamped.block_size(), RowCol::new(23, 56));
        assert_eq!(clamped.block_count(), 1);
    }

    #[test]
    fn short_last_block(){
        let partition = partition(123, 56, 40, 0);
        assert_eq!(partition.blocks_per_col(), 4);
        assert_eq!(partition.blocks_per_row(), 1);

        let valid_rows: Vec<usize> = (0..4)
            .map(|block_row| partition.valid_extent(block_row, 0).unwrap().rows)
            .collect();

        assert_eq!(valid_rows, vec![ 40, 40, 40, 3 ]);
        assert_eq!(partition.block_size(), RowCol::new(40, 56));
        assert!(partition.valid_extent(4, 0).is_err());
    }

    #[test]
    fn column_blocks_are_row_major(){
        let partition = partition(10, 10, 4, 3);
        assert_eq!(partition.blocks_per_row(), 4);
        assert_eq!(partition.blocks_per_col(), 3);
        assert_eq!(partition.block_index(1, 2), 6);
        assert_eq!(partition.block_position(6), RowCol::new(1, 2));
        assert_eq!(partition.valid_extent(2, 3).unwrap(), RowCol::new(2, 1));
    }

    #[test]
    fn bytes_required_round_up_to_blocks(){
        let partition = partition(123, 56, 40, 0);
        assert_eq!(partition.num_bytes_required(0, 40, 1).unwrap(), 40 * 56);
        assert_eq!(partition.num_bytes_required(0, 41, 1).unwrap(), 2 * 40 * 56);
        assert_eq!(partition.num_bytes_required(120, 3, 2).unwrap(), 40 * 56 * 2);

        assert!(matches!(partition.num_bytes_required(1, 3, 1), Err(Error::UnalignedRange { .. })));
        assert!(matches!(partition.num_bytes_required(120, 4, 1), Err(Error::RangeOutOfBounds { .. })));
    }

    #[test]
    fn aligned_rows(){
        let partition = partition(123, 56, 40, 0);
        assert_eq!(partition.aligned_block_rows(0 .. 40), Some(0 .. 1));
        assert_eq!(partition.aligned_block_rows(40 .. 123), Some(1 .. 4));
        assert_eq!(partition.aligned_block_rows(120 .. 123), Some(3 .. 4));
        assert_eq!(partition.aligned_block_rows(0 .. 39), None);
        assert_eq!(partition.aligned_block_rows(1 .. 40), None);
        assert_eq!(partition.aligned_block_rows(120 .. 160), None);
    }

    #[test]
    fn block_pads_rows_and_columns(){
        // 3 x 5 pixels, blocks of 2 x 3 pixels
        let partition = partition(3, 5, 2, 3);
        let source: Vec<u8> = (1 ..= 15).collect();

        let mut output = vec![ 0_u8; partition.num_bytes_required(0, 3, 1).unwrap() ];
        partition.block(&source, 0, 3, 1, 0xff, &mut output).unwrap();

        assert_eq!(output, vec![
            1, 2, 3,  6, 7, 8,
            4, 5, 0xff,  9, 10, 0xff,
            11, 12, 13,  0xff, 0xff, 0xff,
            14, 15, 0xff,  0xff, 0xff, 0xff,
        ]);
    }

    #[test]
    fn block_later_rows_with_multiple_bytes_per_pixel(){
        let partition = partition(3, 2, 2, 0);
        let source = [ 1, 1, 2, 2 ]; // only the last row

        let mut output = vec![ 9_u8; partition.num_bytes_required(2, 1, 2).unwrap() ];
        partition.block(&source, 2, 1, 2, 0, &mut output).unwrap();
        assert_eq!(output, vec![ 1, 1, 2, 2,  0, 0, 0, 0 ]);
    }

    #[test]
    fn block_rejects_partial_block_rows(){
        let partition = partition(123, 56, 40, 0);
        let source = vec![ 0_u8; 123 * 56 ];
        let mut output = vec![ 0_u8; 40 * 56 ];

        assert!(matches!(
            partition.block(&source, 0, 20, 1, 0, &mut output),
            Err(Error::UnalignedRange { start_row: 0, row_count: 20 })
        ));
    }

    #[test]
    fn rows_beyond_address_space(){
        let partition = partition(123, 56, 40, 0);
        let mut output = vec![ 0_u8; 40 * 56 ];

        assert!(matches!(
            partition.num_bytes_required(usize::MAX, 1, 1),
            Err(Error::RangeOutOfBounds { end_row: usize::MAX, total_rows: 123 })
        ));

        assert!(matches!(
            partition.block(&[], usize::MAX, 1, 1, 0, &mut output),
            Err(Error::RangeOutOfBounds { end_row: usize::MAX, total_rows: 123 })
        ));

        assert!(calculate_block_position_and_size(123, 40, usize::MAX).is_err());
        assert_eq!(calculate_block_position_and_size(123, 40, 3).unwrap(), (120, 3));
    }
}
