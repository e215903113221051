/// The distributed log wraps the local commit log with a Raft instance:
/// appends go through consensus, reads are served straight from the
/// local log, and cluster membership changes are driven through the
/// leader.
use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
  fs,
  io::{Cursor, Read},
  ops::RangeBounds,
  path::{Path, PathBuf},
  sync::{Arc, RwLock},
  time::Duration,
};

use openraft::{
  error::{ChangeMembershipError, ClientWriteError, InitializeError, RaftError},
  storage::{Adaptor, RaftLogReader, RaftSnapshotBuilder, RaftStorage},
  ChangeMembers, Entry, EntryPayload, ErrorSubject, ErrorVerb, LogId, LogState, RaftLogId,
  Snapshot, SnapshotMeta, StorageError, StoredMembership, TokioRuntime, Vote,
};
use prost::Message;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
  api,
  commit_log::{Config as LogConfig, Log},
  error::{Error, Result},
  raft_transport::StreamLayerNetworkFactory,
  segment,
  stream_layer::StreamLayer,
};

pub type NodeId = u64;

/// Stable node id derived from the human-readable node name so that
/// gossip events, which carry names, can address Raft members.
pub fn node_id(name: &str) -> NodeId {
  use std::hash::{Hash, Hasher};

  let mut hasher = std::collections::hash_map::DefaultHasher::new();
  name.hash(&mut hasher);
  hasher.finish()
}

/// Cluster member metadata carried in the Raft membership config.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeInfo {
  pub name: String,
  pub rpc_addr: String,
}

impl fmt::Display for NodeInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.name, self.rpc_addr)
  }
}

/// Replicated commands are a tagged variant on the wire: one byte of
/// kind followed by the payload bytes. New kinds get new tags; unknown
/// tags are rejected on apply.
pub const APPEND_COMMAND: u8 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaftCommand {
  pub kind: u8,
  pub payload: Vec<u8>,
}

/// What the state machine returned for an applied command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
  pub offset: Option<u64>,
}

openraft::declare_raft_types!(
  pub TypeConfig:
    D            = RaftCommand,
    R            = CommandResponse,
    NodeId       = NodeId,
    Node         = NodeInfo,
    Entry        = Entry<TypeConfig>,
    SnapshotData = Cursor<Vec<u8>>,
    AsyncRuntime = TokioRuntime,
);

const APPLY_TIMEOUT: Duration = Duration::from_secs(10);
const MEMBERSHIP_RETRIES: usize = 10;
const STABLE_FILE: &str = "stable.json";

fn storage_error(
  subject: ErrorSubject<NodeId>,
  verb: ErrorVerb,
  error: impl fmt::Display,
) -> StorageError<NodeId> {
  StorageError::from_io_error(subject, verb, std::io::Error::other(error.to_string()))
}

/// Vote, commit and membership bookkeeping persisted under the Raft
/// subdirectory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StableState {
  vote: Option<Vote<NodeId>>,
  committed: Option<LogId<NodeId>>,
  last_purged: Option<LogId<NodeId>>,
  last_applied: Option<LogId<NodeId>>,
  last_membership: StoredMembership<NodeId, NodeInfo>,
}

/// Raft storage backed by two segmented logs: the replicated
/// application log that clients read, and a second log holding the
/// serialized Raft entries so they survive restarts. The entries are
/// mirrored in memory for range reads.
pub struct RaftStore {
  log: Arc<Log>,
  raft_log: Arc<Log>,
  entries: Arc<RwLock<BTreeMap<u64, Entry<TypeConfig>>>>,
  stable: StableState,
  stable_path: PathBuf,
}

impl RaftStore {
  pub fn new(raft_dir: &Path, log: Arc<Log>) -> Result<Self> {
    fs::create_dir_all(raft_dir)?;

    // Raft indexes start at one, root the entry log there so record
    // offsets line up with them.
    let raft_log = Arc::new(Log::new(
      raft_dir.join("log"),
      LogConfig {
        segment: segment::Config {
          max_store_bytes: 64 * 1024,
          max_index_bytes: 1024,
          initial_offset: 1,
        },
      },
    )?);

    let stable_path = raft_dir.join(STABLE_FILE);
    let stable = match fs::read(&stable_path) {
      Ok(bytes) => serde_json::from_slice(&bytes)
        .map_err(|e| Error::Internal(format!("corrupt raft stable state: {e}")))?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => StableState::default(),
      Err(e) => return Err(e.into()),
    };

    let mut entries = BTreeMap::new();
    let lowest = raft_log.lowest_offset()?;
    let highest = raft_log.highest_offset()?;
    if highest >= lowest {
      for offset in lowest..=highest {
        let record = raft_log.read(offset)?;
        let entry: Entry<TypeConfig> = serde_json::from_slice(&record.value)
          .map_err(|e| Error::Internal(format!("corrupt raft log entry: {e}")))?;
        entries.insert(entry.log_id.index, entry);
      }
    }

    Ok(Self {
      log,
      raft_log,
      entries: Arc::new(RwLock::new(entries)),
      stable,
      stable_path,
    })
  }

  fn persist_stable(&self) -> Result<(), StorageError<NodeId>> {
    let bytes = serde_json::to_vec(&self.stable)
      .map_err(|e| storage_error(ErrorSubject::Store, ErrorVerb::Write, e))?;
    fs::write(&self.stable_path, bytes)
      .map_err(|e| storage_error(ErrorSubject::Store, ErrorVerb::Write, e))
  }

  fn persist_entry(&self, entry: &Entry<TypeConfig>) -> Result<(), StorageError<NodeId>> {
    let value = serde_json::to_vec(entry)
      .map_err(|e| storage_error(ErrorSubject::Logs, ErrorVerb::Write, e))?;
    self
      .raft_log
      .append(&mut api::v1::Record {
        value,
        ..Default::default()
      })
      .map_err(|e| storage_error(ErrorSubject::Logs, ErrorVerb::Write, e))?;
    Ok(())
  }

  /// Rebuilds the on-disk entry log from the in-memory map. Truncation
  /// of a conflicting tail is rare enough that a full rewrite is fine.
  fn rewrite_raft_log(&self) -> Result<(), StorageError<NodeId>> {
    self
      .raft_log
      .reset()
      .map_err(|e| storage_error(ErrorSubject::Logs, ErrorVerb::Write, e))?;

    let entries = self.entries.read().unwrap();
    for entry in entries.values() {
      self.persist_entry(entry)?;
    }

    Ok(())
  }

  /// Applies a replicated command to the local log, returning the
  /// offset the record landed at.
  fn apply_command(&self, command: &RaftCommand, term: u64) -> Result<u64> {
    match command.kind {
      APPEND_COMMAND => {
        let mut record = api::v1::Record::decode(command.payload.as_slice())?;
        record.term = term;
        self.log.append(&mut record)
      }
      kind => Err(Error::Internal(format!("unknown command kind: {kind}"))),
    }
  }

  fn build_snapshot_from_log(
    &self,
  ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
    snapshot_from_log(
      &self.log,
      self.stable.last_applied,
      self.stable.last_membership.clone(),
    )
  }

  /// Handle for sealing the entry log on shutdown; the store itself is
  /// consumed by the raft instance.
  pub fn raft_log_handle(&self) -> Arc<Log> {
    Arc::clone(&self.raft_log)
  }
}

fn snapshot_from_log(
  log: &Log,
  last_applied: Option<LogId<NodeId>>,
  last_membership: StoredMembership<NodeId, NodeInfo>,
) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
  let Some(last_log_id) = last_applied else {
    return Ok(None);
  };

  let mut data = Vec::new();
  log
    .reader()
    .read_to_end(&mut data)
    .map_err(|e| storage_error(ErrorSubject::Snapshot(None), ErrorVerb::Read, e))?;

  Ok(Some(Snapshot {
    meta: SnapshotMeta {
      last_log_id: Some(last_log_id),
      last_membership,
      snapshot_id: format!("{last_log_id}"),
    },
    snapshot: Box::new(Cursor::new(data)),
  }))
}

/// Point-in-time view over the shared entry map handed to Raft's
/// replication tasks.
pub struct RaftLogView {
  entries: Arc<RwLock<BTreeMap<u64, Entry<TypeConfig>>>>,
}

impl RaftLogReader<TypeConfig> for RaftLogView {
  async fn try_get_log_entries<RB>(
    &mut self,
    range: RB,
  ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>>
  where
    RB: RangeBounds<u64> + Clone + fmt::Debug + Send,
  {
    let entries = self.entries.read().unwrap();
    Ok(entries.range(range).map(|(_, entry)| entry.clone()).collect())
  }
}

impl RaftLogReader<TypeConfig> for RaftStore {
  async fn try_get_log_entries<RB>(
    &mut self,
    range: RB,
  ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>>
  where
    RB: RangeBounds<u64> + Clone + fmt::Debug + Send,
  {
    let entries = self.entries.read().unwrap();
    Ok(entries.range(range).map(|(_, entry)| entry.clone()).collect())
  }
}

/// Builds snapshots by reading the whole local log, so a snapshot is a
/// stream of the same length-prefixed records the stores hold.
pub struct LogSnapshotBuilder {
  log: Arc<Log>,
  last_applied: Option<LogId<NodeId>>,
  last_membership: StoredMembership<NodeId, NodeInfo>,
}

impl RaftSnapshotBuilder<TypeConfig> for LogSnapshotBuilder {
  async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
    snapshot_from_log(&self.log, self.last_applied, self.last_membership.clone())?.ok_or_else(
      || {
        storage_error(
          ErrorSubject::Snapshot(None),
          ErrorVerb::Read,
          "nothing applied yet, no snapshot to build",
        )
      },
    )
  }
}

// openraft's traits use return-position impl-trait, so implementations
// are plain async fns rather than #[async_trait] methods. The v1
// RaftStorage is bridged to the v2 split interface with Adaptor.
impl RaftStorage<TypeConfig> for RaftStore {
  type LogReader = RaftLogView;
  type SnapshotBuilder = LogSnapshotBuilder;

  async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
    self.stable.vote = Some(*vote);
    self.persist_stable()
  }

  async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
    Ok(self.stable.vote)
  }

  async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
    let entries = self.entries.read().unwrap();
    let last_log_id = entries
      .values()
      .next_back()
      .map(|entry| *entry.get_log_id())
      .or(self.stable.last_purged);

    Ok(LogState {
      last_purged_log_id: self.stable.last_purged,
      last_log_id,
    })
  }

  async fn save_committed(
    &mut self,
    committed: Option<LogId<NodeId>>,
  ) -> Result<(), StorageError<NodeId>> {
    self.stable.committed = committed;
    self.persist_stable()
  }

  async fn read_committed(&mut self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
    Ok(self.stable.committed)
  }

  async fn get_log_reader(&mut self) -> Self::LogReader {
    RaftLogView {
      entries: Arc::clone(&self.entries),
    }
  }

  async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<NodeId>>
  where
    I: IntoIterator<Item = Entry<TypeConfig>> + Send,
  {
    for entry in entries {
      self.persist_entry(&entry)?;
      self
        .entries
        .write()
        .unwrap()
        .insert(entry.get_log_id().index, entry);
    }
    Ok(())
  }

  async fn delete_conflict_logs_since(
    &mut self,
    log_id: LogId<NodeId>,
  ) -> Result<(), StorageError<NodeId>> {
    debug!(index = log_id.index, "truncating conflicting raft log tail");

    self
      .entries
      .write()
      .unwrap()
      .retain(|&index, _| index < log_id.index);

    self.rewrite_raft_log()
  }

  async fn purge_logs_upto(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
    self.stable.last_purged = Some(log_id);
    self.persist_stable()?;

    self
      .entries
      .write()
      .unwrap()
      .retain(|&index, _| index > log_id.index);

    self.rewrite_raft_log()
  }

  async fn last_applied_state(
    &mut self,
  ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, NodeInfo>), StorageError<NodeId>>
  {
    Ok((self.stable.last_applied, self.stable.last_membership.clone()))
  }

  async fn apply_to_state_machine(
    &mut self,
    entries: &[Entry<TypeConfig>],
  ) -> Result<Vec<CommandResponse>, StorageError<NodeId>> {
    let mut responses = Vec::with_capacity(entries.len());

    for entry in entries {
      self.stable.last_applied = Some(*entry.get_log_id());

      match &entry.payload {
        EntryPayload::Blank => responses.push(CommandResponse { offset: None }),
        EntryPayload::Normal(command) => {
          match self.apply_command(command, entry.log_id.leader_id.term) {
            Ok(offset) => responses.push(CommandResponse {
              offset: Some(offset),
            }),
            Err(e) => {
              error!(error = %e, "failed to apply replicated command");
              responses.push(CommandResponse { offset: None });
            }
          }
        }
        EntryPayload::Membership(membership) => {
          self.stable.last_membership =
            StoredMembership::new(Some(*entry.get_log_id()), membership.clone());
          responses.push(CommandResponse { offset: None });
        }
      }
    }

    self.persist_stable()?;

    Ok(responses)
  }

  async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
    LogSnapshotBuilder {
      log: Arc::clone(&self.log),
      last_applied: self.stable.last_applied,
      last_membership: self.stable.last_membership.clone(),
    }
  }

  async fn begin_receiving_snapshot(
    &mut self,
  ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<NodeId>> {
    Ok(Box::new(Cursor::new(Vec::new())))
  }

  /// Restores the local log from a snapshot: the log is reset so its
  /// first segment is rooted at the snapshot's first record offset and
  /// the records are appended back in order.
  async fn install_snapshot(
    &mut self,
    meta: &SnapshotMeta<NodeId, NodeInfo>,
    snapshot: Box<Cursor<Vec<u8>>>,
  ) -> Result<(), StorageError<NodeId>> {
    info!(snapshot_id = %meta.snapshot_id, "installing snapshot");

    restore_log(&self.log, snapshot.get_ref())
      .map_err(|e| storage_error(ErrorSubject::Snapshot(None), ErrorVerb::Write, e))?;

    self.stable.last_applied = meta.last_log_id;
    self.stable.last_membership = meta.last_membership.clone();
    self.persist_stable()
  }

  async fn get_current_snapshot(
    &mut self,
  ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
    // The durable applied log doubles as the snapshot store: a snapshot
    // at the last applied entry can always be synthesized from it.
    self.build_snapshot_from_log()
  }
}

fn restore_log(log: &Log, data: &[u8]) -> Result<()> {
  use crate::store::LEN_WIDTH;

  let mut position = 0usize;
  let mut first = true;

  while position + LEN_WIDTH as usize <= data.len() {
    let len =
      u64::from_be_bytes(data[position..position + LEN_WIDTH as usize].try_into().unwrap())
        as usize;
    position += LEN_WIDTH as usize;

    if position + len > data.len() {
      return Err(Error::Internal(String::from("snapshot data is truncated")));
    }

    let mut record = api::v1::Record::decode(&data[position..position + len])?;
    position += len;

    if first {
      log.reset_with_initial_offset(record.offset)?;
      first = false;
    }

    log.append(&mut record)?;
  }

  if first {
    log.reset()?;
  }

  Ok(())
}

#[derive(Debug)]
pub struct Config {
  pub node_name: String,
  /// RPC address advertised to peers; Raft dials it through the stream
  /// layer.
  pub rpc_addr: String,
  /// Initialize a single-node cluster. Exactly one node of a new
  /// cluster bootstraps; the rest join through membership events.
  pub bootstrap: bool,
  pub stream_layer: Arc<StreamLayer>,
}

pub struct DistributedLog {
  id: NodeId,
  log: Arc<Log>,
  raft_log: Arc<Log>,
  raft: openraft::Raft<TypeConfig>,
}

impl DistributedLog {
  pub async fn new(
    data_dir: impl AsRef<Path>,
    log_config: LogConfig,
    config: Config,
  ) -> Result<Self> {
    let data_dir = data_dir.as_ref();
    let log = Arc::new(Log::new(data_dir.join("log"), log_config)?);

    let store = RaftStore::new(&data_dir.join("raft"), Arc::clone(&log))?;
    let raft_log = store.raft_log_handle();
    let (log_store, state_machine) = Adaptor::new(store);

    let raft_config = Arc::new(
      openraft::Config {
        cluster_name: String::from("proglog"),
        heartbeat_interval: 50,
        election_timeout_min: 150,
        election_timeout_max: 300,
        ..Default::default()
      }
      .validate()
      .map_err(|e| Error::Raft(e.to_string()))?,
    );

    let id = node_id(&config.node_name);
    let network = StreamLayerNetworkFactory::new(Arc::clone(&config.stream_layer));

    let raft = openraft::Raft::new(id, raft_config, network, log_store, state_machine)
      .await
      .map_err(|e| Error::Raft(e.to_string()))?;

    if config.bootstrap {
      let mut members = BTreeMap::new();
      members.insert(
        id,
        NodeInfo {
          name: config.node_name.clone(),
          rpc_addr: config.rpc_addr.clone(),
        },
      );

      match raft.initialize(members).await {
        Ok(()) => info!(node = %config.node_name, "bootstrapped a new cluster"),
        // Restarting a previously bootstrapped node finds existing
        // raft state, which is fine.
        Err(RaftError::APIError(InitializeError::NotAllowed(_))) => {}
        Err(e) => return Err(Error::Raft(e.to_string())),
      }
    }

    Ok(Self {
      id,
      log,
      raft_log,
      raft,
    })
  }

  /// Submits an append command through Raft and waits for it to commit,
  /// returning the offset the state machine assigned.
  pub async fn append(&self, record: api::v1::Record) -> Result<u64> {
    let command = RaftCommand {
      kind: APPEND_COMMAND,
      payload: record.encode_to_vec(),
    };

    let response = tokio::time::timeout(APPLY_TIMEOUT, self.raft.client_write(command))
      .await
      .map_err(|_| Error::Timeout(String::from("waiting for the append to commit")))?
      .map_err(write_error)?;

    response
      .data
      .offset
      .ok_or_else(|| Error::Internal(String::from("append command was rejected on apply")))
  }

  /// Reads straight from the local log; followers may serve stale but
  /// never inconsistent data.
  pub fn read(&self, offset: u64) -> Result<api::v1::Record> {
    self.log.read(offset)
  }

  /// Adds the node to the cluster as a voter. Only the leader may join
  /// nodes; a node that is already a voter at the same address is a
  /// no-op.
  pub async fn join(&self, name: &str, rpc_addr: &str) -> Result<()> {
    let id = node_id(name);
    let node = NodeInfo {
      name: name.to_string(),
      rpc_addr: rpc_addr.to_string(),
    };

    let membership = self.raft.metrics().borrow().membership_config.clone();
    if let Some(existing) = membership.membership().get_node(&id) {
      let is_voter = membership.membership().voter_ids().any(|voter| voter == id);
      if is_voter && existing.rpc_addr == rpc_addr {
        return Ok(());
      }

      // Rejoining under a new address: drop the stale member first.
      self.remove_member(id).await?;
    }

    debug!(node = %node, "adding voter");

    self
      .raft
      .add_learner(id, node, true)
      .await
      .map_err(write_error)?;

    self
      .change_membership(ChangeMembers::AddVoterIds(BTreeSet::from([id])))
      .await
  }

  /// Removes the node from the voter set. When a node removes itself,
  /// subsequent mutations on it fail with `NotLeader`.
  pub async fn leave(&self, name: &str) -> Result<()> {
    self.remove_member(node_id(name)).await
  }

  async fn remove_member(&self, id: NodeId) -> Result<()> {
    debug!(id, "removing voter");

    self
      .change_membership(ChangeMembers::RemoveVoters(BTreeSet::from([id])))
      .await?;

    // A node that never got promoted is only a learner; drop that
    // entry too. Removing an already-gone node is not an error here.
    let _ = self
      .raft
      .change_membership(ChangeMembers::RemoveNodes(BTreeSet::from([id])), false)
      .await;

    Ok(())
  }

  /// Membership changes collide when several nodes join at once; retry
  /// while a prior change is still in flight.
  async fn change_membership(&self, change: ChangeMembers<NodeId, NodeInfo>) -> Result<()> {
    let mut attempts = 0;

    loop {
      match self.raft.change_membership(change.clone(), false).await {
        Ok(_) => return Ok(()),
        Err(RaftError::APIError(ClientWriteError::ForwardToLeader(_))) => {
          return Err(Error::NotLeader)
        }
        Err(RaftError::APIError(ClientWriteError::ChangeMembershipError(
          ChangeMembershipError::InProgress(_),
        ))) if attempts < MEMBERSHIP_RETRIES => {
          attempts += 1;
          tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Err(e) => return Err(Error::Raft(e.to_string())),
      }
    }
  }

  /// Lists the cluster's voters, marking the current leader.
  pub fn get_servers(&self) -> Vec<api::v1::Server> {
    let metrics = self.raft.metrics().borrow().clone();
    let leader = metrics.current_leader;

    let mut servers: Vec<api::v1::Server> = metrics
      .membership_config
      .membership()
      .nodes()
      .map(|(id, node)| api::v1::Server {
        id: node.name.clone(),
        rpc_addr: node.rpc_addr.clone(),
        is_leader: leader == Some(*id),
      })
      .collect();

    servers.sort_by(|a, b| a.id.cmp(&b.id));
    servers
  }

  /// Blocks until some node becomes leader or the timeout fires.
  pub async fn wait_for_leader(&self, timeout: Duration) -> Result<NodeId> {
    let mut metrics = self.raft.metrics();

    tokio::time::timeout(timeout, async {
      loop {
        if let Some(leader) = metrics.borrow_and_update().current_leader {
          return Ok(leader);
        }

        metrics
          .changed()
          .await
          .map_err(|_| Error::Raft(String::from("raft metrics channel closed")))?;
      }
    })
    .await
    .map_err(|_| Error::Timeout(String::from("waiting for a cluster leader")))?
  }

  pub fn is_leader(&self) -> bool {
    self.raft.metrics().borrow().current_leader == Some(self.id)
  }

  /// Handle for the inbound transport to dispatch replication RPCs.
  pub fn raft(&self) -> openraft::Raft<TypeConfig> {
    self.raft.clone()
  }

  /// Shuts Raft down and seals the segments of both logs so their
  /// indexes are recoverable on restart.
  pub async fn shutdown(&self) -> Result<()> {
    let _ = self.raft.shutdown().await;
    self.raft_log.close()?;
    self.log.close()
  }
}

fn write_error(error: RaftError<NodeId, ClientWriteError<NodeId, NodeInfo>>) -> Error {
  match error {
    RaftError::APIError(ClientWriteError::ForwardToLeader(_)) => Error::NotLeader,
    other => Error::Raft(other.to_string()),
  }
}

#[async_trait::async_trait]
impl crate::server::CommitLog for DistributedLog {
  async fn append(&self, record: api::v1::Record) -> Result<u64> {
    DistributedLog::append(self, record).await
  }

  fn read(&self, offset: u64) -> Result<api::v1::Record> {
    DistributedLog::read(self, offset)
  }
}

impl crate::server::ClusterInfo for DistributedLog {
  fn servers(&self) -> Result<Vec<api::v1::Server>> {
    Ok(self.get_servers())
  }
}

#[async_trait::async_trait]
impl crate::membership::Handler for DistributedLog {
  async fn join(&self, name: &str, rpc_addr: &str) -> Result<()> {
    DistributedLog::join(self, name, rpc_addr).await
  }

  async fn leave(&self, name: &str) -> Result<()> {
    DistributedLog::leave(self, name).await
  }
}
