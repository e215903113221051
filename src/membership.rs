/// Gossip-based cluster membership. Each node gossips its RPC address
/// under a well-known key; a watcher turns changes of the live-node set
/// into join and leave calls against the distributed log, which only
/// the current leader acts on.
use std::{
  collections::BTreeMap,
  net::SocketAddr,
  sync::Arc,
  time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use chitchat::{
  spawn_chitchat, transport::UdpTransport, ChitchatConfig, ChitchatHandle, ChitchatId,
  FailureDetectorConfig,
};
use futures::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error};

use crate::error::{Error, Result};

const RPC_ADDR_KEY: &str = "rpc_addr";
const CLUSTER_ID: &str = "proglog";

/// What membership events drive. The distributed log implements this;
/// `NotLeader` results are expected on followers and swallowed.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
  async fn join(&self, name: &str, rpc_addr: &str) -> Result<()>;
  async fn leave(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Config {
  pub node_name: String,
  /// UDP address gossip binds to.
  pub bind_addr: String,
  /// RPC address advertised to peers through the gossip state.
  pub rpc_addr: String,
  /// Seed gossip addresses; empty on the bootstrap node.
  pub start_join_addrs: Vec<String>,
}

pub struct Membership {
  handle: ChitchatHandle,
  watcher: tokio::task::JoinHandle<()>,
}

impl Membership {
  pub async fn new(config: Config, handler: Arc<dyn Handler>) -> Result<Self> {
    let listen_addr: SocketAddr = config
      .bind_addr
      .parse()
      .map_err(|_| Error::InvalidTarget(config.bind_addr.clone()))?;

    // The generation bumps on restart so peers pick up the rejoined
    // incarnation of a node.
    let generation = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();
    let chitchat_id = ChitchatId::new(config.node_name.clone(), generation, listen_addr);

    let chitchat_config = ChitchatConfig {
      chitchat_id,
      cluster_id: String::from(CLUSTER_ID),
      gossip_interval: Duration::from_millis(100),
      listen_addr,
      seed_nodes: config.start_join_addrs.clone(),
      failure_detector_config: FailureDetectorConfig::default(),
      marked_for_deletion_grace_period: Duration::from_secs(60),
      catchup_callback: None,
      extra_liveness_predicate: None,
    };

    let handle = spawn_chitchat(
      chitchat_config,
      vec![(String::from(RPC_ADDR_KEY), config.rpc_addr.clone())],
      &UdpTransport,
    )
    .await
    .map_err(|e| Error::Internal(format!("failed to start gossip: {e}")))?;

    let chitchat = handle.chitchat();
    let node_name = config.node_name.clone();
    let watcher = tokio::spawn(async move {
      let mut live_nodes = WatchStream::new(chitchat.lock().await.live_nodes_watcher());
      let mut known: BTreeMap<String, String> = BTreeMap::new();

      while let Some(snapshot) = live_nodes.next().await {
        let mut current: BTreeMap<String, String> = BTreeMap::new();
        for (id, state) in snapshot.iter() {
          // Events about ourselves are ignored.
          if id.node_id == node_name {
            continue;
          }
          let Some(rpc_addr) = state.get(RPC_ADDR_KEY) else {
            continue;
          };
          current.insert(id.node_id.clone(), rpc_addr.to_string());
        }

        let (joined, left) = diff(&known, &current);

        for (name, rpc_addr) in joined {
          debug!(node = %name, rpc_addr = %rpc_addr, "node joined the gossip cluster");
          match handler.join(&name, &rpc_addr).await {
            // Only the leader acts on membership events; every other
            // node observes NotLeader here.
            Ok(()) | Err(Error::NotLeader) => {}
            Err(e) => error!(node = %name, error = %e, "failed to add node to the cluster"),
          }
        }

        for name in left {
          debug!(node = %name, "node left the gossip cluster");
          match handler.leave(&name).await {
            Ok(()) | Err(Error::NotLeader) => {}
            Err(e) => error!(node = %name, error = %e, "failed to remove node from the cluster"),
          }
        }

        known = current;
      }
    });

    Ok(Self { handle, watcher })
  }

  /// Leaves the gossip cluster. Peers observe the departure and the
  /// leader removes this node from the voter set.
  pub async fn leave(self) -> Result<()> {
    self.watcher.abort();
    self
      .handle
      .shutdown()
      .await
      .map_err(|e| Error::Internal(format!("failed to leave gossip: {e}")))?;

    Ok(())
  }
}

/// Joined nodes are those new to or re-addressed in `current`; left
/// nodes are those that dropped out of it.
fn diff(
  known: &BTreeMap<String, String>,
  current: &BTreeMap<String, String>,
) -> (Vec<(String, String)>, Vec<String>) {
  let joined = current
    .iter()
    .filter(|(name, rpc_addr)| known.get(*name) != Some(*rpc_addr))
    .map(|(name, rpc_addr)| (name.clone(), rpc_addr.clone()))
    .collect();

  let left = known
    .keys()
    .filter(|name| !current.contains_key(*name))
    .cloned()
    .collect();

  (joined, left)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn members(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
      .iter()
      .map(|(name, addr)| (name.to_string(), addr.to_string()))
      .collect()
  }

  #[test]
  fn diff_reports_new_nodes_as_joined() {
    let known = members(&[("0", "127.0.0.1:9000")]);
    let current = members(&[("0", "127.0.0.1:9000"), ("1", "127.0.0.1:9001")]);

    let (joined, left) = diff(&known, &current);

    assert_eq!(
      vec![(String::from("1"), String::from("127.0.0.1:9001"))],
      joined
    );
    assert!(left.is_empty());
  }

  #[test]
  fn diff_reports_missing_nodes_as_left() {
    let known = members(&[("0", "127.0.0.1:9000"), ("1", "127.0.0.1:9001")]);
    let current = members(&[("0", "127.0.0.1:9000")]);

    let (joined, left) = diff(&known, &current);

    assert!(joined.is_empty());
    assert_eq!(vec![String::from("1")], left);
  }

  #[test]
  fn diff_reports_readdressed_nodes_as_joined_again() {
    let known = members(&[("1", "127.0.0.1:9001")]);
    let current = members(&[("1", "127.0.0.1:9002")]);

    let (joined, left) = diff(&known, &current);

    assert_eq!(
      vec![(String::from("1"), String::from("127.0.0.1:9002"))],
      joined
    );
    assert!(left.is_empty());
  }
}
