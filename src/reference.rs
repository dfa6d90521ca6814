//! Write a whole file in one pass, from structural bytes and all compressed blocks.
//! Files produced by streaming row ranges through the `ByteProvider`
//! are byte-identical to files written by this conventional writer.

use std::io::Write;

use crate::compression::ByteVec;
use crate::error::{Error, Result, UnitResult};
use crate::meta::StructuralBytes;


/// Write the file header, each subheader followed by the blocks of its segment,
/// and finally all trailing metadata segments.
/// Assumes the write destination is buffered.
pub fn write_buffered(write: &mut impl Write, structure: &StructuralBytes, blocks: &[Vec<ByteVec>]) -> UnitResult {
    structure.validate(blocks.len())?;

    write.write_all(&structure.file_header)?;

    for (subheader, segment_blocks) in structure.image_subheaders.iter().zip(blocks) {
        write.write_all(subheader)?;

        for block in segment_blocks {
            write.write_all(block)?;
        }
    }

    for segment in &structure.metadata_segments {
        write.write_all(&segment.header)?;
        write.write_all(&segment.data)?;
    }

    write.flush()?; // make sure we catch all (possibly delayed) io errors before returning
    Ok(())
}

/// Write the whole file into a new byte vector.
pub fn write_to_vec(structure: &StructuralBytes, blocks: &[Vec<ByteVec>]) -> Result<ByteVec> {
    let mut bytes = Vec::new();

    write_buffered(&mut bytes, structure, blocks)
        .map_err(|error| match error {
            Error::Io(_) => Error::invalid("cannot write to memory"),
            other => other,
        })?;

    Ok(bytes)
}
