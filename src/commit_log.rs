/// A commit log is a data structure for an append-only sequence
/// of records ordered by time.
use std::{
  fs,
  path::{Path, PathBuf},
  sync::{Arc, RwLock},
};

use crate::{
  api,
  error::{Error, Result},
  segment::{self, Segment},
  store::Store,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
  pub segment: segment::Config,
}

#[derive(Debug)]
pub struct Log {
  dir: PathBuf,
  config: Config,
  /// Segments are ordered from oldest to newest and the newest segment
  /// is the active one.
  segments: RwLock<Vec<Segment>>,
}

impl Log {
  pub fn new(dir: impl AsRef<Path>, config: Config) -> Result<Self> {
    fs::create_dir_all(&dir)?;

    let log = Self {
      dir: dir.as_ref().to_path_buf(),
      config,
      segments: RwLock::new(Vec::new()),
    };

    {
      let mut segments = log.segments.write().unwrap();
      log.setup(&mut segments)?;
    }

    Ok(log)
  }

  /// Creates one segment per pair of pre-existing store/index files,
  /// sorted by base offset, or the first segment when the directory is
  /// empty.
  fn setup(&self, segments: &mut Vec<Segment>) -> Result<()> {
    let mut base_offsets: Vec<u64> = fs::read_dir(&self.dir)?
      .filter_map(|entry| entry.ok())
      .filter_map(|entry| {
        let file_name = entry.file_name();
        let file_name = file_name.to_str()?;
        file_name.split('.').next()?.parse::<u64>().ok()
      })
      .collect();

    // Store and index files share a base-offset stem, so every offset
    // shows up twice.
    base_offsets.sort_unstable();
    base_offsets.dedup();

    for base_offset in base_offsets {
      segments.push(Segment::new(&self.dir, base_offset, self.config.segment)?);
    }

    if segments.is_empty() {
      segments.push(Segment::new(
        &self.dir,
        self.config.segment.initial_offset,
        self.config.segment,
      )?);
    }

    Ok(())
  }

  /// Appends a record to the active segment.
  ///
  /// If the active segment is already maxed, a new segment rooted at
  /// the next offset becomes the active one first.
  pub fn append(&self, record: &mut api::v1::Record) -> Result<u64> {
    let mut segments = self.segments.write().unwrap();

    let highest_offset = Self::highest(&segments);

    if segments.last().unwrap().is_maxed() {
      segments.push(Segment::new(
        &self.dir,
        highest_offset + 1,
        self.config.segment,
      )?);
    }

    segments.last_mut().unwrap().append(record)
  }

  /// Reads the record stored at a given offset.
  pub fn read(&self, offset: u64) -> Result<api::v1::Record> {
    let segments = self.segments.read().unwrap();

    let segment = segments
      .iter()
      .find(|segment| segment.base_offset() <= offset && offset < segment.next_offset());

    match segment {
      None => Err(Error::OffsetOutOfRange(offset)),
      Some(segment) => segment.read(offset),
    }
  }

  /// Returns the base offset of the first segment.
  ///
  /// The lowest offset is used for consensus in the replicated cluster.
  pub fn lowest_offset(&self) -> Result<u64> {
    let segments = self.segments.read().unwrap();

    Ok(segments.first().unwrap().base_offset())
  }

  /// Returns the offset of the newest record in the log.
  ///
  /// The highest offset is used for consensus in the replicated cluster.
  pub fn highest_offset(&self) -> Result<u64> {
    let segments = self.segments.read().unwrap();

    Ok(Self::highest(&segments))
  }

  fn highest(segments: &[Segment]) -> u64 {
    let offset = segments.last().unwrap().next_offset();
    if offset == 0 {
      0
    } else {
      offset - 1
    }
  }

  /// Removes every segment whose highest offset is lower than `lowest`.
  pub fn truncate(&self, lowest: u64) -> Result<()> {
    let mut segments = self.segments.write().unwrap();

    let mut kept = Vec::with_capacity(segments.len());
    for segment in segments.drain(..) {
      if segment.next_offset() <= lowest + 1 {
        segment.remove()?;
      } else {
        kept.push(segment);
      }
    }
    *segments = kept;

    Ok(())
  }

  /// Returns a reader that concatenates the raw store bytes of each
  /// segment in order. Raft ships snapshots with it.
  pub fn reader(&self) -> LogReader {
    let segments = self.segments.read().unwrap();

    LogReader {
      stores: segments.iter().map(|segment| segment.store()).collect(),
      current: 0,
      position: 0,
    }
  }

  /// Flushes and seals every segment in the log.
  pub fn close(&self) -> Result<()> {
    let mut segments = self.segments.write().unwrap();

    for segment in segments.drain(..) {
      segment.close()?;
    }

    Ok(())
  }

  /// Closes the log and removes all of its data.
  pub fn remove(&self) -> Result<()> {
    self.close()?;
    fs::remove_dir_all(&self.dir)?;

    Ok(())
  }

  /// Removes the log and replaces it with a newly created one.
  pub fn reset(&self) -> Result<()> {
    self.reset_with_initial_offset(self.config.segment.initial_offset)
  }

  /// Removes the log and replaces it with an empty one whose first
  /// segment is rooted at `initial_offset`. Snapshot restore uses this
  /// to rebuild the log starting at the snapshot's first record.
  ///
  /// The write lock is held for the whole swap so concurrent reads
  /// never observe a half-rebuilt log.
  pub fn reset_with_initial_offset(&self, initial_offset: u64) -> Result<()> {
    let mut segments = self.segments.write().unwrap();

    for segment in segments.drain(..) {
      segment.close()?;
    }
    fs::remove_dir_all(&self.dir)?;
    fs::create_dir_all(&self.dir)?;

    let mut config = self.config.segment;
    config.initial_offset = initial_offset;
    segments.push(Segment::new(&self.dir, initial_offset, config)?);

    Ok(())
  }
}

/// Reads the store bytes of every segment back to back, starting at
/// position zero of each store.
#[derive(Debug)]
pub struct LogReader {
  stores: Vec<Arc<Store>>,
  current: usize,
  position: u64,
}

impl std::io::Read for LogReader {
  fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
    while self.current < self.stores.len() {
      let n = self.stores[self.current].read_at(buffer, self.position)?;
      if n > 0 {
        self.position += n as u64;
        return Ok(n);
      }

      self.current += 1;
      self.position = 0;
    }

    Ok(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::index::ENTRY_WIDTH;
  use crate::store::LEN_WIDTH;
  use std::io::Read;

  fn record(value: &[u8]) -> api::v1::Record {
    api::v1::Record {
      value: value.to_vec(),
      ..Default::default()
    }
  }

  fn small_segment_config() -> Config {
    Config {
      segment: segment::Config {
        max_store_bytes: 1024,
        max_index_bytes: 3 * ENTRY_WIDTH,
        initial_offset: 0,
      },
    }
  }

  #[test_log::test]
  fn append_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::new(dir.path(), Config::default()).unwrap();

    let offset = log.append(&mut record(b"hello world")).unwrap();
    assert_eq!(0, offset);

    let got = log.read(offset).unwrap();
    assert_eq!(b"hello world".to_vec(), got.value);
    assert_eq!(offset, got.offset);
  }

  #[test_log::test]
  fn append_assigns_contiguous_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::new(dir.path(), Config::default()).unwrap();

    for want in 0..10 {
      assert_eq!(want, log.append(&mut record(b"a")).unwrap());
    }

    assert_eq!(0, log.lowest_offset().unwrap());
    assert_eq!(9, log.highest_offset().unwrap());
  }

  #[test_log::test]
  fn read_out_of_range_fails() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::new(dir.path(), Config::default()).unwrap();

    log.append(&mut record(b"a")).unwrap();

    assert!(matches!(log.read(1), Err(Error::OffsetOutOfRange(1))));
  }

  #[test_log::test]
  fn log_rolls_over_to_new_segments() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::new(dir.path(), small_segment_config()).unwrap();

    // Three entries max the index of a segment; the fourth append lands
    // in a fresh segment rooted at the next offset.
    for _ in 0..4 {
      log.append(&mut record(b"a")).unwrap();
    }

    {
      let segments = log.segments.read().unwrap();
      assert_eq!(2, segments.len());
      assert_eq!(3, segments[1].base_offset());
    }

    // Reads work across the segment boundary.
    for offset in 0..4 {
      assert_eq!(offset, log.read(offset).unwrap().offset);
    }
  }

  #[test_log::test]
  fn log_recovers_state_from_existing_directory() {
    let dir = tempfile::tempdir().unwrap();

    let log = Log::new(dir.path(), small_segment_config()).unwrap();
    for _ in 0..5 {
      log.append(&mut record(b"persisted")).unwrap();
    }
    let lowest = log.lowest_offset().unwrap();
    let highest = log.highest_offset().unwrap();
    log.close().unwrap();

    let log = Log::new(dir.path(), small_segment_config()).unwrap();
    assert_eq!(lowest, log.lowest_offset().unwrap());
    assert_eq!(highest, log.highest_offset().unwrap());
    for offset in lowest..=highest {
      assert_eq!(b"persisted".to_vec(), log.read(offset).unwrap().value);
    }
  }

  #[test_log::test]
  fn truncate_drops_old_segments() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::new(dir.path(), small_segment_config()).unwrap();

    // Two full segments plus one entry in a third.
    for _ in 0..7 {
      log.append(&mut record(b"a")).unwrap();
    }

    log.truncate(4).unwrap();

    assert!(matches!(log.read(2), Err(Error::OffsetOutOfRange(2))));
    assert_eq!(3, log.lowest_offset().unwrap());
    assert_eq!(6, log.highest_offset().unwrap());
  }

  #[test_log::test]
  fn reader_returns_whole_log_contents() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::new(dir.path(), small_segment_config()).unwrap();

    let mut r = record(b"hello");
    log.append(&mut r).unwrap();

    let mut contents = Vec::new();
    log.reader().read_to_end(&mut contents).unwrap();

    // Length prefix followed by the encoded record.
    use prost::Message;
    let encoded = r.encode_to_vec();
    assert_eq!(encoded.len() as u64, u64::from_be_bytes(contents[..8].try_into().unwrap()));
    assert_eq!(encoded, contents[LEN_WIDTH as usize..]);
  }

  #[test_log::test]
  fn reset_replaces_log_contents() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::new(dir.path(), Config::default()).unwrap();

    log.append(&mut record(b"old")).unwrap();
    log.reset_with_initial_offset(40).unwrap();

    assert!(matches!(log.read(0), Err(Error::OffsetOutOfRange(0))));
    assert_eq!(40, log.lowest_offset().unwrap());

    let offset = log.append(&mut record(b"new")).unwrap();
    assert_eq!(40, offset);
  }
}
