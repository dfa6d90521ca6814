//! Split an image that is too tall for a single segment
//! into several full-width image segments, each blocked independently.

use std::ops::Range;

use smallvec::SmallVec;
use tracing::debug;

use crate::block::BlockPartition;
use crate::error::{Error, Result, UnitResult};
use crate::math::{RoundingMode, RowCol};
use crate::meta::{Compression, ImageDescription};


/// A contiguous range of full-width rows of the image,
/// stored in the file with its own subheader and its own blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {

    /// Position of this segment in the file.
    pub index: usize,

    /// The global rows of the image contained in this segment.
    pub rows: Range<usize>,

    /// How the pixels of this segment are divided into blocks.
    pub partition: BlockPartition,
}

impl Segment {

    /// Number of rows in this segment.
    pub fn row_count(&self) -> usize { self.rows.len() }

    /// Rows and columns of this segment.
    pub fn extent(&self) -> RowCol<usize> { self.partition.extent() }

    /// Number of blocks in this segment.
    pub fn block_count(&self) -> usize { self.partition.block_count() }

    /// Converts a global row range into rows local to this segment.
    /// The range must intersect this segment.
    fn local_rows(&self, global_rows: &Range<usize>) -> Range<usize> {
        let start = global_rows.start.max(self.rows.start);
        let end = global_rows.end.min(self.rows.end);
        start - self.rows.start .. end - self.rows.start
    }
}


/// Compute the row ranges of all segments.
/// Without a maximum, a single segment contains all rows.
/// Every segment but the last has exactly `max_rows_per_segment` rows.
pub fn split_rows(total_rows: usize, max_rows_per_segment: Option<usize>) -> Result<SmallVec<[Range<usize>; 3]>> {
    if total_rows == 0 {
        return Err(Error::degenerate("an image without rows produces an empty segment"));
    }

    let max_rows = match max_rows_per_segment {
        None => return Ok(smallvec::smallvec![ 0 .. total_rows ]),
        Some(0) => return Err(Error::degenerate("maximum rows per segment must not be zero")),
        Some(max_rows) => max_rows,
    };

    let segment_count = RoundingMode::Up.divide(total_rows, max_rows);
    let last_rows = total_rows - (segment_count - 1) * max_rows;
    debug_assert!(last_rows > 0 && last_rows <= max_rows, "segment split arithmetic");

    Ok((0 .. segment_count)
        .map(|index| {
            let start = index * max_rows;
            start .. (start + max_rows).min(total_rows)
        })
        .collect())
}


/// All image segments of a file, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    segments: SmallVec<[Segment; 3]>,
    cols: usize,
    bytes_per_pixel: usize,
    compression: Compression,
}

impl Segments {

    /// Split the described image into segments and block each segment.
    pub fn new(description: &ImageDescription) -> Result<Self> {
        description.validate()?;

        let cols = description.extent.cols;
        let segments = split_rows(description.extent.rows, description.max_rows_per_segment)?
            .into_iter().enumerate()
            .map(|(index, rows)| Ok(Segment {
                partition: BlockPartition::new(RowCol::new(rows.len(), cols), description.block_dims)?,
                index, rows,
            }))
            .collect::<Result<SmallVec<[Segment; 3]>>>()?;

        debug!(
            rows = description.extent.rows, cols, segments = segments.len(),
            compression = %description.compression, "split image into segments"
        );

        Ok(Segments {
            segments, cols,
            bytes_per_pixel: description.bytes_per_pixel,
            compression: description.compression,
        })
    }

    /// Number of segments.
    pub fn len(&self) -> usize { self.segments.len() }

    /// Always false, as every image has at least one segment.
    pub fn is_empty(&self) -> bool { self.segments.is_empty() }

    /// Iterate all segments in file order.
    pub fn iter(&self) -> std::slice::Iter<'_, Segment> { self.segments.iter() }

    /// The segment at this index, if any.
    pub fn get(&self, index: usize) -> Option<&Segment> { self.segments.get(index) }

    /// All segments in file order.
    pub fn as_slice(&self) -> &[Segment] { &self.segments }

    /// Number of rows of the whole image.
    pub fn total_rows(&self) -> usize {
        self.segments.last().map_or(0, |segment| segment.rows.end)
    }

    /// Number of columns of every segment.
    pub fn cols(&self) -> usize { self.cols }

    /// Size of a single pixel in bytes.
    pub fn bytes_per_pixel(&self) -> usize { self.bytes_per_pixel }

    /// Whether block sizes are known up front.
    pub fn compression(&self) -> Compression { self.compression }

    /// Total number of blocks in all segments.
    pub fn block_count(&self) -> usize {
        self.segments.iter().map(Segment::block_count).sum()
    }

    /// Find the segment containing this global row,
    /// and the row index relative to that segment.
    pub fn locate(&self, global_row: usize) -> Result<(usize, usize)> {
        let total_rows = self.total_rows();
        if global_row >= total_rows {
            return Err(Error::RangeOutOfBounds { end_row: global_row.saturating_add(1), total_rows });
        }

        let index = self.segments.partition_point(|segment| segment.rows.end <= global_row);
        Ok((index, global_row - self.segments[index].rows.start))
    }

    /// Checks that the rows exist in this image.
    pub(crate) fn check_bounds(&self, start_row: usize, row_count: usize) -> UnitResult {
        let total_rows = self.total_rows();
        let end_row = start_row.checked_add(row_count)
            .ok_or(Error::RangeOutOfBounds { end_row: usize::MAX, total_rows })?;

        if end_row > total_rows {
            return Err(Error::RangeOutOfBounds { end_row, total_rows });
        }

        Ok(())
    }

    /// All segments intersecting the global rows,
    /// together with the intersection in local row coordinates.
    /// The rows must exist in this image.
    pub fn intersecting(&self, global_rows: Range<usize>) -> impl Iterator<Item = (&Segment, Range<usize>)> + '_ {
        let first = self.segments.partition_point(|segment| segment.rows.end <= global_rows.start);
        let end = global_rows.end;

        self.segments[first ..].iter()
            .take_while(move |segment| segment.rows.start < end)
            .map(move |segment| (segment, segment.local_rows(&global_rows)))
    }

    /// The number of bytes needed to hold these global rows as whole padded blocks.
    /// In every segment, the row count is rounded up to complete block rows.
    pub fn num_bytes_required(&self, start_row: usize, row_count: usize) -> Result<usize> {
        self.check_bounds(start_row, row_count)?;

        self.intersecting(start_row .. start_row + row_count)
            .map(|(segment, local)| {
                segment.partition.num_bytes_required(local.start, local.len(), self.bytes_per_pixel)
                    .map_err(|error| match error {
                        Error::UnalignedRange { .. } => Error::UnalignedRange { start_row, row_count },
                        other => other,
                    })
            })
            .sum()
    }

    /// Rearrange full-width source rows into the padded blocks of all touched segments,
    /// one segment after another. The `source` contains `row_count` rows starting at `start_row`.
    /// The `output` must contain exactly `num_bytes_required` bytes.
    pub fn block(&self, source: &[u8], start_row: usize, row_count: usize, fill: u8, output: &mut [u8]) -> UnitResult {
        self.check_bounds(start_row, row_count)?;

        let row_bytes = self.cols * self.bytes_per_pixel;
        if source.len() < row_count * row_bytes {
            return Err(Error::invalid("source contains fewer rows than requested"));
        }

        let mut source = source;
        let mut output = output;

        for (segment, local) in self.intersecting(start_row .. start_row + row_count) {
            let output_len = segment.partition.num_bytes_required(local.start, local.len(), self.bytes_per_pixel)
                .map_err(|_| Error::UnalignedRange { start_row, row_count })?;

            if output.len() < output_len {
                return Err(Error::invalid("output size does not match the covered blocks"));
            }

            let (segment_source, remaining_source) = source.split_at(local.len() * row_bytes);
            let (segment_output, remaining_output) = std::mem::take(&mut output).split_at_mut(output_len);

            segment.partition.block(segment_source, local.start, local.len(), self.bytes_per_pixel, fill, segment_output)
                .map_err(|error| match error {
                    Error::UnalignedRange { .. } => Error::UnalignedRange { start_row, row_count },
                    other => other,
                })?;

            source = remaining_source;
            output = remaining_output;
        }

        if !output.is_empty() {
            return Err(Error::invalid("output size does not match the covered blocks"));
        }

        Ok(())
    }
}

impl std::ops::Index<usize> for Segments {
    type Output = Segment;
    fn index(&self, index: usize) -> &Segment { &self.segments[index] }
}

impl<'s> IntoIterator for &'s Segments {
    type Item = &'s Segment;
    type IntoIter = std::slice::Iter<'s, Segment>;
    fn into_iter(self) -> Self::IntoIter { self.segments.iter() }
}



#[cfg(test)]
mod test {
    use super::*;
    use crate::block::BlockDims;

    fn split(max_rows: Option<usize>) -> Segments {
        let mut description = ImageDescription::new((123, 56), 1)
            .with_blocking(BlockDims::new(40, 0));

        description.max_rows_per_segment = max_rows;
        description.split().unwrap()
    }

    #[test]
    fn single_segment_without_maximum(){
        let segments = split(None);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].rows, 0 .. 123);
        assert_eq!(segments[0].block_count(), 4);
    }

    #[test]
    fn segment_counts(){
        for &max_rows in &[ 100, 80, 50 ] {
            let segments = split(Some(max_rows));
            assert_eq!(segments.len(), (123 + max_rows - 1) / max_rows);

            let row_counts: Vec<usize> = segments.iter().map(Segment::row_count).collect();
            assert_eq!(row_counts.iter().sum::<usize>(), 123);

            let (last, full) = row_counts.split_last().unwrap();
            assert!(full.iter().all(|&rows| rows == max_rows));
            assert!(*last > 0 && *last <= max_rows);
        }
    }

    #[test]
    fn evenly_dividing_maximum(){
        let ranges = split_rows(120, Some(40)).unwrap();
        assert_eq!(ranges.as_slice(), &[ 0 .. 40, 40 .. 80, 80 .. 120 ]);
    }

    #[test]
    fn degenerate_splits(){
        assert!(matches!(split_rows(123, Some(0)), Err(Error::DegenerateSegmentSplit(_))));
        assert!(matches!(split_rows(0, None), Err(Error::DegenerateSegmentSplit(_))));
        assert!(matches!(split_rows(0, Some(10)), Err(Error::DegenerateSegmentSplit(_))));
    }

    #[test]
    fn blocks_are_clamped_per_segment(){
        let segments = split(Some(50));
        let block_rows: Vec<usize> = segments.iter()
            .map(|segment| segment.partition.block_size().rows).collect();

        assert_eq!(block_rows, vec![ 40, 40, 23 ]);
        assert_eq!(segments[0].block_count(), 2);
        assert_eq!(segments[2].block_count(), 1);
    }

    #[test]
    fn locate_rows(){
        let segments = split(Some(50));
        assert_eq!(segments.locate(0).unwrap(), (0, 0));
        assert_eq!(segments.locate(49).unwrap(), (0, 49));
        assert_eq!(segments.locate(50).unwrap(), (1, 0));
        assert_eq!(segments.locate(122).unwrap(), (2, 22));
        assert!(matches!(segments.locate(123), Err(Error::RangeOutOfBounds { .. })));
    }

    #[test]
    fn intersecting_segments(){
        let segments = split(Some(50));
        let touched: Vec<(usize, Range<usize>)> = segments.intersecting(40 .. 110)
            .map(|(segment, local)| (segment.index, local)).collect();

        assert_eq!(touched, vec![ (0, 40 .. 50), (1, 0 .. 50), (2, 0 .. 10) ]);
    }

    #[test]
    fn bytes_required_across_segments(){
        let segments = split(Some(50));

        // segment 0: 2 blocks of 40 rows, segment 1: 2 blocks, segment 2: 1 block of 23 rows
        assert_eq!(segments.num_bytes_required(0, 123).unwrap(), (4 * 40 + 23) * 56);
        assert_eq!(segments.num_bytes_required(40, 10).unwrap(), 40 * 56);
        assert!(matches!(segments.num_bytes_required(45, 5), Err(Error::UnalignedRange { .. })));
    }

    #[test]
    fn block_across_segments(){
        let segments = ImageDescription::new((5, 2), 1)
            .with_blocking(BlockDims::new(2, 0))
            .with_max_rows_per_segment(3)
            .split().unwrap();

        let source: Vec<u8> = (1 ..= 10).collect();
        let mut output = vec![ 0_u8; segments.num_bytes_required(0, 5).unwrap() ];
        segments.block(&source, 0, 5, 0, &mut output).unwrap();

        assert_eq!(output, vec![
            1, 2, 3, 4,   5, 6, 0, 0, // segment 0, rows 0..3
            7, 8, 9, 10, // segment 1, rows 3..5
        ]);
    }

    #[test]
    fn rows_beyond_address_space(){
        let segments = split(Some(50));
        let mut output = vec![ 0_u8; 40 * 56 ];

        assert!(matches!(segments.locate(usize::MAX), Err(Error::RangeOutOfBounds { end_row: usize::MAX, total_rows: 123 })));
        assert!(matches!(segments.num_bytes_required(usize::MAX, 1), Err(Error::RangeOutOfBounds { end_row: usize::MAX, .. })));
        assert!(matches!(segments.block(&[], usize::MAX, 1, 0, &mut output), Err(Error::RangeOutOfBounds { .. })));
        assert!(matches!(segments.block(&[], 1, usize::MAX, 0, &mut output), Err(Error::RangeOutOfBounds { .. })));
    }
}
