/// Store represents a file where records are stored.
use std::{
  fs::File,
  io::{BufWriter, Write},
  os::unix::prelude::FileExt,
  sync::Mutex,
};

use crate::error::Result;

/// Number of bytes in the big-endian length prefix written before each
/// record payload.
pub const LEN_WIDTH: u64 = 8;

/// File is wrapped in a BufWriter because it can be inefficient
/// to work directly with something that implements Write
/// because it may issue too many system calls.
///
/// BufWriter will keep an in-memory buffer of data
/// and write it to the underlying writer in batches.
#[derive(Debug)]
pub struct Store {
  inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
  writer: BufWriter<File>,
  /// Size of the file including buffered bytes; doubles as the position
  /// the next append starts at.
  size: u64,
}

impl Store {
  pub fn new(file: File) -> Result<Self> {
    let size = file.metadata()?.len();

    Ok(Self {
      inner: Mutex::new(Inner {
        writer: BufWriter::new(file),
        size,
      }),
    })
  }

  /// Appends the length-prefixed payload to the store.
  ///
  /// Returns the number of bytes written and the position the record
  /// starts at, which the index keeps to find the record again.
  pub fn append(&self, payload: &[u8]) -> Result<(u64, u64)> {
    let mut inner = self.inner.lock().unwrap();

    let position = inner.size;

    inner
      .writer
      .write_all(&(payload.len() as u64).to_be_bytes())?;
    inner.writer.write_all(payload)?;

    let written = LEN_WIDTH + payload.len() as u64;
    inner.size += written;

    Ok((written, position))
  }

  /// Reads the record stored at `position`.
  pub fn read(&self, position: u64) -> Result<Vec<u8>> {
    let mut inner = self.inner.lock().unwrap();

    // Flush the writer so a read cannot observe a record that is still
    // sitting in the write buffer.
    inner.writer.flush()?;

    let file = inner.writer.get_ref();

    let mut len_buffer = [0u8; LEN_WIDTH as usize];
    file.read_exact_at(&mut len_buffer, position)?;

    let mut payload = vec![0u8; u64::from_be_bytes(len_buffer) as usize];
    file.read_exact_at(&mut payload, position + LEN_WIDTH)?;

    Ok(payload)
  }

  /// Reads raw store bytes starting at `position`, flushing buffered
  /// writes first.
  pub fn read_at(&self, buffer: &mut [u8], position: u64) -> std::io::Result<usize> {
    let mut inner = self.inner.lock().unwrap();

    inner.writer.flush()?;

    inner.writer.get_ref().read_at(buffer, position)
  }

  pub fn size(&self) -> u64 {
    self.inner.lock().unwrap().size
  }

  /// Flushes buffered writes to the file before the store is dropped.
  pub fn flush(&self) -> Result<()> {
    self.inner.lock().unwrap().writer.flush()?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::NamedTempFile;

  #[test_log::test]
  fn append_returns_bytes_written_and_position() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.into_file()).unwrap();

    let (written, position) = store.append(b"hello").unwrap();
    assert_eq!(LEN_WIDTH + 5, written);
    assert_eq!(0, position);

    let (written, position) = store.append(b"world!").unwrap();
    assert_eq!(LEN_WIDTH + 6, written);
    assert_eq!(LEN_WIDTH + 5, position);

    assert_eq!(2 * LEN_WIDTH + 11, store.size());
  }

  #[test_log::test]
  fn read_returns_record_at_position() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.into_file()).unwrap();

    let (_, first) = store.append(b"hello").unwrap();
    let (_, second) = store.append(b"world").unwrap();

    // Reads must observe appends even though writes are buffered.
    assert_eq!(b"hello".to_vec(), store.read(first).unwrap());
    assert_eq!(b"world".to_vec(), store.read(second).unwrap());
  }

  #[test_log::test]
  fn store_recovers_size_from_existing_file() {
    let file = NamedTempFile::new().unwrap();
    let reopened = file.reopen().unwrap();

    let store = Store::new(file.into_file()).unwrap();
    let (_, position) = store.append(b"persisted").unwrap();
    store.flush().unwrap();

    let store = Store::new(reopened).unwrap();
    assert_eq!(LEN_WIDTH + 9, store.size());
    assert_eq!(b"persisted".to_vec(), store.read(position).unwrap());
  }

  #[test_log::test]
  fn read_at_reads_raw_bytes() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::new(file.into_file()).unwrap();

    store.append(b"abc").unwrap();

    let mut buffer = [0u8; LEN_WIDTH as usize];
    let n = store.read_at(&mut buffer, 0).unwrap();
    assert_eq!(LEN_WIDTH as usize, n);
    assert_eq!(3u64.to_be_bytes(), buffer);
  }
}
