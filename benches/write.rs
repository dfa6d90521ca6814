#[macro_use]
extern crate bencher;

extern crate nitf_stream;
use nitf_stream::prelude::*;
use nitf_stream::block::writer::CompressedBlocks;
use nitf_stream::compression::ByteVec;

use bencher::Bencher;
use std::io::Cursor;


fn compressed_image() -> (ByteProvider, CompressedBlocks) {
    let description = ImageDescription::new((2048, 1024), 1)
        .with_blocking(BlockDims::new(64, 256))
        .with_max_rows_per_segment(500)
        .with_compression(Compression::Compressed);

    let segments = description.split().unwrap();
    let subheaders = (0 .. segments.len()).map(|_| vec![ 0_u8; 499 ]);
    let structure = StructuralBytes::new(vec![ 0_u8; 400 ], subheaders);

    let source: ByteVec = (0 .. 2048 * 1024).map(|index: usize| (index % 253) as u8).collect();
    let provider = ByteProvider::new(segments, structure).unwrap();
    let blocks = compress_blocks_sequential(&provider, &source, 0, &ZlibCodec { level: 1 }).unwrap();

    (provider, blocks)
}

fn stream_block_rows(bench: &mut Bencher) {
    let (provider, blocks) = compressed_image();

    let payloads: Vec<(usize, usize, ByteVec)> = provider.segments().iter()
        .flat_map(|segment| {
            let block_rows = segment.partition.block_size().rows;
            (segment.rows.start .. segment.rows.end).step_by(block_rows)
                .map(move |start| (start, block_rows.min(segment.rows.end - start)))
        })
        .map(|(start, count)| {
            let payload = provider.covered_blocks(start, count).unwrap().into_iter()
                .flat_map(|index| blocks[index.segment][index.block].iter().copied())
                .collect();

            (start, count, payload)
        })
        .collect();

    bench.iter(||{
        let mut write = Tracking::new(Cursor::new(Vec::new()));

        for (start, count, payload) in &payloads {
            let (offset, buffers) = provider.get_bytes(payload, *start, *count).unwrap();
            write_buffers_at(&mut write, offset, &buffers).unwrap();
        }

        bencher::black_box(write.into_inner());
    })
}

fn block_offsets(bench: &mut Bencher) {
    let (provider, _) = compressed_image();
    let last_segment = provider.segments().len() - 1;
    let last_block = provider.segments()[last_segment].block_count() - 1;

    bench.iter(||{
        bencher::black_box(provider.block_file_offset(last_segment, last_block).unwrap());
    })
}

fn compress_parallel(bench: &mut Bencher) {
    let description = ImageDescription::new((1024, 512), 1)
        .with_blocking(BlockDims::new(64, 128))
        .with_compression(Compression::Compressed);

    let source: ByteVec = (0 .. 1024 * 512).map(|index: usize| (index % 251) as u8).collect();

    bench.iter(||{
        let provider = ByteProvider::new(description.split().unwrap(), StructuralBytes::new(Vec::new(), vec![ Vec::new() ])).unwrap();
        bencher::black_box(compress_blocks_parallel(&provider, &source, 0, &ZlibCodec::default()).unwrap());
    })
}

benchmark_group!(write,
    stream_block_rows,
    block_offsets,
    compress_parallel
);

benchmark_main!(write);
