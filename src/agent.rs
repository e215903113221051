/// The agent runs a complete node: the shared listener with its stream
/// layer, the distributed log, gossip membership, the authorizer and
/// the gRPC server.
use std::{
  io,
  path::PathBuf,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

use crate::{
  commit_log,
  distributed::{self, DistributedLog},
  error::{Error, Result},
  membership::{self, Membership},
  raft_transport,
  server::{ClusterInfo, CommitLog, LogService},
  stream_layer::{Accepted, RpcConnection, StreamLayer},
};

pub struct Config {
  /// Storage root; the log lives in `log/`, Raft state in `raft/`.
  pub data_dir: PathBuf,
  /// Unique server id.
  pub node_name: String,
  /// Gossip bind address.
  pub bind_addr: String,
  /// TCP port for the combined Raft/RPC stream, bound on the bind
  /// address host.
  pub rpc_port: u16,
  /// Seed gossip addresses; empty on the bootstrap node.
  pub start_join_addrs: Vec<String>,
  /// Initialize a one-node Raft cluster.
  pub bootstrap: bool,
  pub acl_model_file: Option<PathBuf>,
  pub acl_policy_file: Option<PathBuf>,
  /// TLS served to RPC clients and Raft peers on the shared listener.
  pub server_tls: Option<Arc<rustls::ServerConfig>>,
  /// TLS used when dialing peers for Raft replication.
  pub peer_tls: Option<Arc<rustls::ClientConfig>>,
  pub log: commit_log::Config,
}

impl Config {
  /// The RPC address advertised to clients and peers: the gossip bind
  /// host with the RPC port.
  pub fn rpc_addr(&self) -> Result<String> {
    let host = self
      .bind_addr
      .rsplit_once(':')
      .map(|(host, _)| host)
      .ok_or_else(|| Error::InvalidTarget(self.bind_addr.clone()))?;

    Ok(format!("{host}:{}", self.rpc_port))
  }
}

pub struct Agent {
  pub config: Config,
  log: Arc<DistributedLog>,
  membership: Mutex<Option<Membership>>,
  server_shutdown: Mutex<Option<oneshot::Sender<()>>>,
  accept_task: tokio::task::JoinHandle<()>,
  shutdown: AtomicBool,
}

impl Agent {
  pub async fn new(config: Config) -> Result<Self> {
    let rpc_addr = config.rpc_addr()?;

    let authorizer = match (config.acl_model_file.clone(), config.acl_policy_file.clone()) {
      (Some(model), Some(policy)) => {
        Some(Arc::new(crate::auth::Authorizer::new(model, policy).await?))
      }
      _ => None,
    };

    let listener = TcpListener::bind(&rpc_addr).await?;
    let stream_layer = Arc::new(StreamLayer::new(
      config.server_tls.clone(),
      config.peer_tls.clone(),
    ));

    let log = Arc::new(
      DistributedLog::new(
        &config.data_dir,
        config.log,
        distributed::Config {
          node_name: config.node_name.clone(),
          rpc_addr: rpc_addr.clone(),
          bootstrap: config.bootstrap,
          stream_layer: Arc::clone(&stream_layer),
        },
      )
      .await?,
    );

    // Demultiplex inbound connections between Raft's transport and the
    // RPC server.
    let (rpc_tx, rpc_rx) = mpsc::channel::<io::Result<RpcConnection>>(64);
    let accept_task = tokio::spawn(accept_loop(
      listener,
      Arc::clone(&stream_layer),
      log.raft(),
      rpc_tx,
    ));

    let service = LogService::new(
      Arc::clone(&log) as Arc<dyn CommitLog>,
      Some(Arc::clone(&log) as Arc<dyn ClusterInfo>),
      authorizer,
    );
    let (server_shutdown_tx, server_shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
      let served = tonic::transport::Server::builder()
        .add_service(service.into_service())
        .serve_with_incoming_shutdown(ReceiverStream::new(rpc_rx), async {
          let _ = server_shutdown_rx.await;
        })
        .await;

      if let Err(e) = served {
        error!(error = %e, "rpc server terminated");
      }
    });

    let membership = Membership::new(
      membership::Config {
        node_name: config.node_name.clone(),
        bind_addr: config.bind_addr.clone(),
        rpc_addr: rpc_addr.clone(),
        start_join_addrs: config.start_join_addrs.clone(),
      },
      Arc::clone(&log) as Arc<dyn membership::Handler>,
    )
    .await?;

    info!(node = %config.node_name, rpc_addr = %rpc_addr, "agent started");

    Ok(Self {
      config,
      log,
      membership: Mutex::new(Some(membership)),
      server_shutdown: Mutex::new(Some(server_shutdown_tx)),
      accept_task,
      shutdown: AtomicBool::new(false),
    })
  }

  pub fn distributed_log(&self) -> Arc<DistributedLog> {
    Arc::clone(&self.log)
  }

  /// Shuts the node down in order: leave gossip, stop the RPC server,
  /// shut down Raft (which flushes and seals segments), then stop
  /// accepting connections. Safe to call more than once.
  pub async fn shutdown(&self) -> Result<()> {
    if self.shutdown.swap(true, Ordering::SeqCst) {
      return Ok(());
    }

    info!(node = %self.config.node_name, "shutting down");

    let membership = self.membership.lock().unwrap().take();
    if let Some(membership) = membership {
      if let Err(e) = membership.leave().await {
        error!(error = %e, "failed to leave gossip cluster");
      }
    }

    let server_shutdown = self.server_shutdown.lock().unwrap().take();
    if let Some(tx) = server_shutdown {
      let _ = tx.send(());
    }

    self.log.shutdown().await?;

    self.accept_task.abort();

    Ok(())
  }
}

async fn accept_loop(
  listener: TcpListener,
  stream_layer: Arc<StreamLayer>,
  raft: openraft::Raft<distributed::TypeConfig>,
  rpc_tx: mpsc::Sender<io::Result<RpcConnection>>,
) {
  loop {
    let socket = match listener.accept().await {
      Ok((socket, _)) => socket,
      Err(e) => {
        error!(error = %e, "failed to accept connection");
        continue;
      }
    };

    let stream_layer = Arc::clone(&stream_layer);
    let raft = raft.clone();
    let rpc_tx = rpc_tx.clone();

    tokio::spawn(async move {
      handle_connection(socket, stream_layer, raft, rpc_tx).await;
    });
  }
}

async fn handle_connection(
  socket: TcpStream,
  stream_layer: Arc<StreamLayer>,
  raft: openraft::Raft<distributed::TypeConfig>,
  rpc_tx: mpsc::Sender<io::Result<RpcConnection>>,
) {
  match stream_layer.accept(socket).await {
    Ok(Accepted::Raft(socket)) => raft_transport::serve_connection(socket, raft).await,
    Ok(Accepted::Rpc(connection)) => {
      let _ = rpc_tx.send(Ok(connection)).await;
    }
    Err(e) => debug!(error = %e, "dropping connection"),
  }
}
