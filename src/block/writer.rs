//! Pad and compress all blocks of an image,
//! recording each compressed size in the byte provider as soon as it is known.
//! Blocks can be compressed on one thread or on a thread pool.

use tracing::debug;

use crate::compression::{BlockCodec, ByteVec};
use crate::error::{Error, Result, usize_to_u64};
use crate::provider::ByteProvider;
use crate::segment::{Segment, Segments};


/// The compressed blocks of all segments, in file order.
/// Each segment contains its blocks in row-major block order.
pub type CompressedBlocks = Vec<Vec<ByteVec>>;


fn check_source(segments: &Segments, source: &[u8]) -> Result<()> {
    let expected = segments.total_rows() * segments.cols() * segments.bytes_per_pixel();

    if source.len() != expected {
        return Err(Error::invalid(format!(
            "source image must contain {} bytes, not {}", expected, source.len()
        )));
    }

    Ok(())
}

/// Rearrange the source rows of this segment into its padded blocks, one after another.
fn pad_segment(segments: &Segments, segment: &Segment, source: &[u8], fill: u8) -> Result<ByteVec> {
    let bytes_per_pixel = segments.bytes_per_pixel();
    let row_bytes = segments.cols() * bytes_per_pixel;
    let segment_source = &source[segment.rows.start * row_bytes .. segment.rows.end * row_bytes];

    let mut padded = vec![ 0_u8; segment.partition.num_bytes_required(0, segment.row_count(), bytes_per_pixel)? ];
    segment.partition.block(segment_source, 0, segment.row_count(), bytes_per_pixel, fill, &mut padded)?;
    Ok(padded)
}

fn compress_and_record(
    provider: &ByteProvider, codec: &impl BlockCodec,
    segment: usize, block: usize, padded_block: &[u8]
) -> Result<ByteVec>
{
    let compressed = codec.compress_block(padded_block)?;
    provider.set_block_size(segment, block, usize_to_u64(compressed.len()))?;
    Ok(compressed)
}


/// Compress all blocks of the whole image in this thread.
/// The `source` contains all rows of the image, each with all columns.
/// Pixels outside the image are padded with `fill` before compression.
///
/// The codec must agree with the compression of the image.
/// For uncompressed images, use `compression::Uncompressed`,
/// as any other block size conflicts with the known sizes.
pub fn compress_blocks_sequential(
    provider: &ByteProvider, source: &[u8], fill: u8, codec: &impl BlockCodec
) -> Result<CompressedBlocks>
{
    let segments = provider.segments();
    check_source(segments, source)?;

    segments.iter()
        .map(|segment| {
            let padded = pad_segment(segments, segment, source, fill)?;
            let block_bytes = segment.partition.uncompressed_block_byte_size(segments.bytes_per_pixel());

            padded.chunks_exact(block_bytes).enumerate()
                .map(|(block, padded_block)| compress_and_record(provider, codec, segment.index, block, padded_block))
                .collect::<Result<Vec<ByteVec>>>()
        })
        .collect()
}


/// Compress all blocks of the whole image on a thread pool.
/// Behaves like `compress_blocks_sequential`, but the sizes of the blocks
/// are recorded in the order in which their compression finishes.
/// Falls back to sequential compression if no thread pool can be created.
#[cfg(feature = "rayon")]
pub fn compress_blocks_parallel(
    provider: &ByteProvider, source: &[u8], fill: u8, codec: &impl BlockCodec
) -> Result<CompressedBlocks>
{
    let segments = provider.segments();
    check_source(segments, source)?;

    let pool = rayon_core::ThreadPoolBuilder::new()
        .thread_name(|index| format!("Block Compressor Thread #{}", index))
        .build();

    // in case thread pool creation fails (for example on WASM currently),
    // we revert to sequential compression
    let pool = match pool {
        Ok(pool) => pool,
        Err(error) => {
            debug!(%error, "cannot create thread pool, compressing sequentially");
            return compress_blocks_sequential(provider, source, fill, codec);
        }
    };

    let padded_segments = segments.iter()
        .map(|segment| pad_segment(segments, segment, source, fill))
        .collect::<Result<Vec<ByteVec>>>()?;

    debug!(blocks = segments.block_count(), threads = pool.current_num_threads(), "compressing blocks in parallel");

    let (sender, receiver) = std::sync::mpsc::channel();

    pool.scope(|scope| {
        for (segment, padded) in segments.iter().zip(&padded_segments) {
            let block_bytes = segment.partition.uncompressed_block_byte_size(segments.bytes_per_pixel());

            for (block, padded_block) in padded.chunks_exact(block_bytes).enumerate() {
                let sender = sender.clone();
                let segment = segment.index;

                scope.spawn(move |_| {
                    let compressed = compress_and_record(provider, codec, segment, block, padded_block);

                    // the receiver is only dropped after the scope ends
                    let _ = sender.send((segment, block, compressed));
                });
            }
        }
    });

    drop(sender);

    let mut compressed_segments: Vec<Vec<Option<ByteVec>>> = segments.iter()
        .map(|segment| vec![ None; segment.block_count() ])
        .collect();

    for (segment, block, compressed) in receiver {
        compressed_segments[segment][block] = Some(compressed?);
    }

    compressed_segments.into_iter()
        .map(|blocks| {
            blocks.into_iter()
                .map(|block| block.ok_or_else(|| Error::invalid("block compression did not finish")))
                .collect::<Result<Vec<ByteVec>>>()
        })
        .collect()
}
