//! Stream the compressed blocks of a large raster image into a segmented, blocked container file,
//! without holding the whole file in memory.
//!
//! The image is split into full-width segments of limited height,
//! each segment is divided into row-major blocks of pixels,
//! and every block is compressed independently.
//! The `ByteProvider` computes where in the file each block belongs,
//! and assembles the buffers for any block-aligned range of rows,
//! including the structural bytes (file header, subheaders, trailing metadata segments)
//! that surround the pixels.
//!
//! Start with `meta::ImageDescription::split()` and `provider::ByteProvider::new()`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]


pub mod io;
pub mod math;
pub mod compression;
pub mod meta;
pub mod block;
pub mod segment;
pub mod sizes;
pub mod layout;
pub mod provider;
pub mod reference;
pub mod error;


/// Re-exports the most frequently used types.
pub mod prelude {

    // main exports
    pub use crate::provider::{ByteProvider, BufferList};
    pub use crate::meta::{ImageDescription, StructuralBytes, MetadataSegment, Compression};

    // core data types
    pub use crate::block::{BlockDims, BlockIndex, BlockPartition};
    pub use crate::segment::{Segment, Segments};
    pub use crate::layout::{Region, RegionKind, RegionState};
    pub use crate::compression::{BlockCodec, Uncompressed, ZlibCodec};

    pub use crate::block::writer::compress_blocks_sequential;

    #[cfg(feature = "rayon")]
    pub use crate::block::writer::compress_blocks_parallel;

    pub use crate::io::{Tracking, write_buffers_at};

    // secondary data types
    pub use crate::meta;
    pub use crate::error::{self, Error, Result};
    pub use crate::math::RowCol;
}
