//! Write assembled buffers to their position in a seekable destination.
//! Uses the error handling for this crate.

pub use ::std::io::{Write, Seek, SeekFrom};

use crate::error::{Result, IoResult};
use crate::provider::BufferList;


/// Keep track of what byte we are at, and how far the destination has been written.
/// Writes may arrive in any order, so seeking forward past the written end
/// fills the gap with zeroes, while seeking anywhere before it keeps the existing bytes.
#[derive(Debug)]
pub struct Tracking<T> {

    /// Do not expose to prevent seeking without updating position
    inner: T,

    position: u64,
    written_end: u64,
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> IoResult<usize> {
        let count = self.inner.write(buffer)?;
        self.position += count as u64;
        self.written_end = self.written_end.max(self.position);
        Ok(count)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

impl<T> Tracking<T> {

    /// The `inner` destination must be empty and must never be seeked directly,
    /// but only through this `Tracking` instance.
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0, written_end: 0 }
    }

    /// Current byte position of the cursor.
    pub fn byte_position(&self) -> u64 {
        self.position
    }

    /// The byte position after the last byte that was ever written.
    pub fn written_len(&self) -> u64 {
        self.written_end
    }

    /// Unwrap the destination.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Move the writing cursor to the specified target byte index.
    /// If seeking past the written end, this will write zeroes.
    pub fn seek_write_to(&mut self, target_position: u64) -> IoResult<()> {
        if target_position == self.position {
            return Ok(());
        }

        if target_position <= self.written_end {
            self.inner.seek(SeekFrom::Start(target_position))?;
            self.position = target_position;
        }
        else {
            if self.position != self.written_end {
                self.inner.seek(SeekFrom::Start(self.written_end))?;
                self.position = self.written_end;
            }

            std::io::copy(
                &mut std::io::Read::take(std::io::repeat(0), target_position - self.position),
                self
            )?;
        }

        debug_assert_eq!(self.position, target_position, "seek position mismatch");
        Ok(())
    }
}


/// Write all buffers one after another, starting at the file offset.
/// Returns the number of bytes written.
pub fn write_buffers_at<W: Write + Seek>(write: &mut Tracking<W>, file_offset: u64, buffers: &BufferList<'_>) -> Result<u64> {
    write.seek_write_to(file_offset)?;

    for buffer in buffers.iter() {
        write.write_all(buffer)?;
    }

    Ok(buffers.num_bytes())
}



#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn forward_seek_fills_zeroes(){
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        write.seek_write_to(3).unwrap();
        write.write_all(&[ 7, 7 ]).unwrap();

        assert_eq!(write.byte_position(), 5);
        assert_eq!(write.into_inner().into_inner(), vec![ 0, 0, 0, 7, 7 ]);
    }

    #[test]
    fn out_of_order_writes_keep_existing_bytes(){
        let mut write = Tracking::new(Cursor::new(Vec::new()));

        let mut middle = BufferList::new();
        middle.push(&[ 2, 2 ]);
        assert_eq!(write_buffers_at(&mut write, 2, &middle).unwrap(), 2);

        let mut start = BufferList::new();
        start.push(&[ 1 ]);
        start.push(&[]);
        start.push(&[ 1 ]);
        write_buffers_at(&mut write, 0, &start).unwrap();

        let mut end = BufferList::new();
        end.push(&[ 4 ]);
        write_buffers_at(&mut write, 6, &end).unwrap();

        assert_eq!(write.written_len(), 7);
        assert_eq!(write.into_inner().into_inner(), vec![ 1, 1, 2, 2, 0, 0, 4 ]);
    }
}
