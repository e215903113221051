/// Index represents a file where we index each record in the store file.
///
/// The file is memory mapped at its maximum size when the index is
/// created; the populated byte count is the logical end. On close the
/// file is truncated back to the logical end so that the last entry's
/// relative offset is recoverable when the index is reopened.
use std::{fs::File, io::Write};

use memmap2::MmapMut;

use crate::error::{Error, Result};

/// WIDTH constants define the number of bytes that
/// make up each index entry.
///
/// Index entries contain two fields:
///
/// The record's offset relative to the segment's base offset and its
/// position in the store file. The offset is stored as 4 bytes and the
/// position as 8.
const OFFSET_WIDTH: u64 = 4;
const POSITION_WIDTH: u64 = 8;
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

#[derive(Debug)]
pub struct Index {
  file: File,
  /// Contains the number of populated bytes in the index and
  /// where to write the next entry appended to the index.
  size: u64,
  mmap: MmapMut,
}

impl Index {
  pub fn new(file: File, max_index_bytes: u64) -> Result<Self> {
    let size = file.metadata()?.len();

    // Grow the file to the max index size before memory mapping it
    // because we cannot resize the file after it is memory mapped.
    file.set_len(max_index_bytes)?;

    let mmap = unsafe { MmapMut::map_mut(&file)? };

    Ok(Self { file, mmap, size })
  }

  /// Returns how many entries the index contains.
  pub fn len(&self) -> u64 {
    self.size / ENTRY_WIDTH
  }

  /// Returns true when the index contains no entries.
  pub fn is_empty(&self) -> bool {
    self.size == 0
  }

  /// Returns the logical end of the index in bytes.
  pub fn size(&self) -> u64 {
    self.size
  }

  fn is_full(&self) -> bool {
    (self.mmap.len() as u64) < self.size + ENTRY_WIDTH
  }

  /// Appends the given relative offset and store position to the index.
  ///
  /// Signals `Eof` when the mapped file has no room left for another
  /// entry.
  pub fn write(&mut self, offset: u32, position: u64) -> Result<()> {
    if self.is_full() {
      return Err(Error::Eof);
    }

    let start = self.size as usize;
    let offset_ends_at = start + OFFSET_WIDTH as usize;
    let position_ends_at = offset_ends_at + POSITION_WIDTH as usize;

    (&mut self.mmap[start..offset_ends_at]).write_all(&offset.to_be_bytes())?;
    (&mut self.mmap[offset_ends_at..position_ends_at]).write_all(&position.to_be_bytes())?;

    self.size += ENTRY_WIDTH;

    Ok(())
  }

  /// Returns the entry stored at `n`; `-1` reads the last entry.
  ///
  /// Reading from an empty index or past the logical end signals `Eof`.
  pub fn read(&self, n: i64) -> Result<(u32, u64)> {
    if self.is_empty() {
      return Err(Error::Eof);
    }

    let n = if n == -1 { self.len() - 1 } else { n as u64 };
    if n >= self.len() {
      return Err(Error::Eof);
    }

    let start = (n * ENTRY_WIDTH) as usize;
    let offset_ends_at = start + OFFSET_WIDTH as usize;
    let position_ends_at = offset_ends_at + POSITION_WIDTH as usize;

    let mut offset_buffer = [0u8; OFFSET_WIDTH as usize];
    offset_buffer.copy_from_slice(&self.mmap[start..offset_ends_at]);

    let mut position_buffer = [0u8; POSITION_WIDTH as usize];
    position_buffer.copy_from_slice(&self.mmap[offset_ends_at..position_ends_at]);

    Ok((
      u32::from_be_bytes(offset_buffer),
      u64::from_be_bytes(position_buffer),
    ))
  }

  /// Syncs the memory-mapped file to the persisted file, truncates the
  /// persisted file to the amount of data that's actually in it and
  /// then closes the file.
  pub fn close(self) -> Result<()> {
    self.mmap.flush()?;

    self.file.set_len(self.size)?;
    self.file.sync_all()?;

    Ok(())
  }
}
