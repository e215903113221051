use std::{
  fs::{self, OpenOptions},
  path::{Path, PathBuf},
  sync::Arc,
};

use prost::Message;

use crate::{
  api,
  error::{Error, Result},
  index::Index,
  store::Store,
};

/// The segment wraps the index and store types to coordinate operations
/// across the two.
///
/// When the log appends a record to the active segment,
/// the segment needs to write the data to its store and add
/// a new entry in the index.
///
/// For reads, the segment needs to lookup the entry from the index
/// and then fetch the data from the store.
#[derive(Debug, Clone, Copy)]
pub struct Config {
  pub max_store_bytes: u64,
  pub max_index_bytes: u64,
  pub initial_offset: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      max_store_bytes: 1024,
      max_index_bytes: 1024,
      initial_offset: 0,
    }
  }
}

#[derive(Debug)]
pub struct Segment {
  store: Arc<Store>,
  index: Index,
  store_path: PathBuf,
  index_path: PathBuf,
  base_offset: u64,
  /// First unused absolute offset; the next appended record gets it.
  next_offset: u64,
  config: Config,
}

impl Segment {
  pub fn new(dir: impl AsRef<Path>, base_offset: u64, config: Config) -> Result<Self> {
    let store_path = dir.as_ref().join(format!("{base_offset:020}.store"));
    let store_file = OpenOptions::new()
      .read(true)
      .create(true)
      .append(true)
      .open(&store_path)?;
    let store = Arc::new(Store::new(store_file)?);

    let index_path = dir.as_ref().join(format!("{base_offset:020}.index"));
    let index_file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .open(&index_path)?;
    let index = Index::new(index_file, config.max_index_bytes)?;

    // The last index entry tells us how far a pre-existing segment got.
    let next_offset = match index.read(-1) {
      Ok((relative_offset, _)) => base_offset + relative_offset as u64 + 1,
      Err(Error::Eof) => base_offset,
      Err(e) => return Err(e),
    };

    Ok(Self {
      store,
      index,
      store_path,
      index_path,
      base_offset,
      next_offset,
      config,
    })
  }

  /// Appends the record to the segment, assigning it the segment's next
  /// offset.
  pub fn append(&mut self, record: &mut api::v1::Record) -> Result<u64> {
    let offset = self.next_offset;
    record.offset = offset;

    let (_, position) = self.store.append(&record.encode_to_vec())?;
    self
      .index
      .write((offset - self.base_offset) as u32, position)?;

    self.next_offset += 1;

    Ok(offset)
  }

  /// Reads the record stored at the given absolute offset.
  pub fn read(&self, offset: u64) -> Result<api::v1::Record> {
    if offset < self.base_offset {
      return Err(Error::OffsetOutOfRange(offset));
    }

    let (_, position) = self.index.read((offset - self.base_offset) as i64)?;
    let payload = self.store.read(position)?;

    Ok(api::v1::Record::decode(payload.as_slice())?)
  }

  /// Returns true when either the store or the index reached its
  /// configured maximum size and the log should roll over to a new
  /// segment.
  pub fn is_maxed(&self) -> bool {
    self.store.size() >= self.config.max_store_bytes
      || self.index.size() >= self.config.max_index_bytes
  }

  pub fn base_offset(&self) -> u64 {
    self.base_offset
  }

  pub fn next_offset(&self) -> u64 {
    self.next_offset
  }

  pub(crate) fn store(&self) -> Arc<Store> {
    Arc::clone(&self.store)
  }

  /// Flushes and seals the segment's files.
  pub fn close(self) -> Result<()> {
    self.index.close()?;
    self.store.flush()?;

    Ok(())
  }

  /// Closes the segment and then deletes its files.
  pub fn remove(self) -> Result<()> {
    let store_path = self.store_path.clone();
    let index_path = self.index_path.clone();

    self.close()?;

    fs::remove_file(index_path)?;
    fs::remove_file(store_path)?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::index::ENTRY_WIDTH;

  fn record(value: &[u8]) -> api::v1::Record {
    api::v1::Record {
      value: value.to_vec(),
      ..Default::default()
    }
  }

  #[test_log::test]
  fn append_assigns_sequential_offsets_from_base() {
    let dir = tempfile::tempdir().unwrap();
    let mut segment = Segment::new(dir.path(), 16, Config::default()).unwrap();

    for want in 16..19 {
      let mut r = record(b"hello");
      assert_eq!(want, segment.append(&mut r).unwrap());
      assert_eq!(want, r.offset);
    }

    assert_eq!(19, segment.next_offset());
  }

  #[test_log::test]
  fn read_returns_appended_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut segment = Segment::new(dir.path(), 0, Config::default()).unwrap();

    let mut r = record(b"hello world");
    let offset = segment.append(&mut r).unwrap();

    let got = segment.read(offset).unwrap();
    assert_eq!(b"hello world".to_vec(), got.value);
    assert_eq!(offset, got.offset);
  }

  #[test_log::test]
  fn read_below_base_offset_is_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let mut segment = Segment::new(dir.path(), 10, Config::default()).unwrap();

    segment.append(&mut record(b"a")).unwrap();

    assert!(matches!(
      segment.read(9),
      Err(Error::OffsetOutOfRange(9))
    ));
  }

  #[test_log::test]
  fn segment_is_maxed_by_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
      max_store_bytes: 1024,
      max_index_bytes: 3 * ENTRY_WIDTH,
      initial_offset: 0,
    };
    let mut segment = Segment::new(dir.path(), 0, config).unwrap();

    assert!(!segment.is_maxed());

    for _ in 0..3 {
      segment.append(&mut record(b"a")).unwrap();
    }

    assert!(segment.is_maxed());
  }

  #[test_log::test]
  fn segment_is_maxed_by_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
      max_store_bytes: 32,
      max_index_bytes: 1024,
      initial_offset: 0,
    };
    let mut segment = Segment::new(dir.path(), 0, config).unwrap();

    while !segment.is_maxed() {
      segment.append(&mut record(b"0123456789")).unwrap();
    }

    assert!(segment.store.size() >= 32);
  }

  #[test_log::test]
  fn segment_recovers_next_offset_on_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let mut segment = Segment::new(dir.path(), 5, Config::default()).unwrap();
    segment.append(&mut record(b"one")).unwrap();
    segment.append(&mut record(b"two")).unwrap();
    segment.close().unwrap();

    let segment = Segment::new(dir.path(), 5, Config::default()).unwrap();
    assert_eq!(7, segment.next_offset());
    assert_eq!(b"two".to_vec(), segment.read(6).unwrap().value);
  }

  #[test_log::test]
  fn remove_deletes_segment_files() {
    let dir = tempfile::tempdir().unwrap();

    let mut segment = Segment::new(dir.path(), 0, Config::default()).unwrap();
    segment.append(&mut record(b"gone")).unwrap();

    let store_path = segment.store_path.clone();
    let index_path = segment.index_path.clone();
    segment.remove().unwrap();

    assert!(!store_path.exists());
    assert!(!index_path.exists());
  }
}
