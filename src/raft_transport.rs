/// Raft replication RPCs framed over connections the stream layer
/// demultiplexes: a 4-byte big-endian length followed by the JSON
/// serialized request or reply.
use std::{fmt, io, sync::Arc};

use openraft::{
  error::{InstallSnapshotError, RPCError, RaftError, RemoteError, Unreachable},
  network::{RPCOption, RaftNetwork, RaftNetworkFactory},
  raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest,
    InstallSnapshotResponse, VoteRequest, VoteResponse,
  },
  AnyError,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{
  distributed::{NodeId, NodeInfo, TypeConfig},
  stream_layer::{StreamLayer, StreamSocket},
};

/// Upper bound on a single frame; install-snapshot chunks dominate and
/// stay well below this.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub enum RaftRequest {
  AppendEntries(AppendEntriesRequest<TypeConfig>),
  Vote(VoteRequest<NodeId>),
  InstallSnapshot(InstallSnapshotRequest<TypeConfig>),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RaftReply {
  AppendEntries(Result<AppendEntriesResponse<NodeId>, RaftError<NodeId>>),
  Vote(Result<VoteResponse<NodeId>, RaftError<NodeId>>),
  InstallSnapshot(
    Result<InstallSnapshotResponse<NodeId>, RaftError<NodeId, InstallSnapshotError>>,
  ),
}

async fn write_frame<S, T>(socket: &mut S, frame: &T) -> io::Result<()>
where
  S: AsyncWrite + Unpin,
  T: Serialize,
{
  let payload = serde_json::to_vec(frame).map_err(io::Error::other)?;

  socket.write_all(&(payload.len() as u32).to_be_bytes()).await?;
  socket.write_all(&payload).await?;
  socket.flush().await?;

  Ok(())
}

async fn read_frame<S, T>(socket: &mut S) -> io::Result<T>
where
  S: AsyncRead + Unpin,
  T: DeserializeOwned,
{
  let mut len_buffer = [0u8; 4];
  socket.read_exact(&mut len_buffer).await?;

  let len = u32::from_be_bytes(len_buffer);
  if len > MAX_FRAME_LEN {
    return Err(io::Error::other("oversized raft frame"));
  }

  let mut payload = vec![0u8; len as usize];
  socket.read_exact(&mut payload).await?;

  serde_json::from_slice(&payload).map_err(io::Error::other)
}

/// Serves Raft RPCs arriving on one multiplexed connection until the
/// peer hangs up.
pub async fn serve_connection(mut socket: StreamSocket, raft: openraft::Raft<TypeConfig>) {
  loop {
    let request = match read_frame::<_, RaftRequest>(&mut socket).await {
      Ok(request) => request,
      Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return,
      Err(e) => {
        debug!(error = %e, "raft connection failed");
        return;
      }
    };

    let reply = match request {
      RaftRequest::AppendEntries(rpc) => RaftReply::AppendEntries(raft.append_entries(rpc).await),
      RaftRequest::Vote(rpc) => RaftReply::Vote(raft.vote(rpc).await),
      RaftRequest::InstallSnapshot(rpc) => {
        RaftReply::InstallSnapshot(raft.install_snapshot(rpc).await)
      }
    };

    if let Err(e) = write_frame(&mut socket, &reply).await {
      debug!(error = %e, "failed to reply on raft connection");
      return;
    }
  }
}

/// Creates one outbound connection per peer, dialed through the stream
/// layer so replication traffic shares the RPC port.
pub struct StreamLayerNetworkFactory {
  stream_layer: Arc<StreamLayer>,
}

impl StreamLayerNetworkFactory {
  pub fn new(stream_layer: Arc<StreamLayer>) -> Self {
    Self { stream_layer }
  }
}

impl RaftNetworkFactory<TypeConfig> for StreamLayerNetworkFactory {
  type Network = StreamLayerConnection;

  async fn new_client(&mut self, target: NodeId, node: &NodeInfo) -> Self::Network {
    StreamLayerConnection {
      stream_layer: Arc::clone(&self.stream_layer),
      target,
      target_addr: node.rpc_addr.clone(),
      socket: None,
    }
  }
}

pub struct StreamLayerConnection {
  stream_layer: Arc<StreamLayer>,
  target: NodeId,
  target_addr: String,
  socket: Option<StreamSocket>,
}

impl StreamLayerConnection {
  /// Sends one request and awaits its reply, dropping the connection on
  /// any transport error so the next call redials.
  async fn call(&mut self, request: &RaftRequest) -> io::Result<RaftReply> {
    if self.socket.is_none() {
      self.socket = Some(self.stream_layer.dial(&self.target_addr).await?);
    }

    let socket = self.socket.as_mut().unwrap();
    let result = async {
      write_frame(socket, request).await?;
      read_frame(socket).await
    }
    .await;

    if result.is_err() {
      self.socket = None;
    }

    result
  }
}

fn unreachable(error: impl fmt::Display) -> Unreachable {
  Unreachable::new(&AnyError::error(error.to_string()))
}

impl RaftNetwork<TypeConfig> for StreamLayerConnection {
  async fn append_entries(
    &mut self,
    rpc: AppendEntriesRequest<TypeConfig>,
    _option: RPCOption,
  ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, NodeInfo, RaftError<NodeId>>> {
    match self.call(&RaftRequest::AppendEntries(rpc)).await {
      Ok(RaftReply::AppendEntries(Ok(response))) => Ok(response),
      Ok(RaftReply::AppendEntries(Err(e))) => {
        Err(RPCError::RemoteError(RemoteError::new(self.target, e)))
      }
      Ok(_) => Err(RPCError::Unreachable(unreachable("mismatched raft reply"))),
      Err(e) => Err(RPCError::Unreachable(unreachable(e))),
    }
  }

  async fn vote(
    &mut self,
    rpc: VoteRequest<NodeId>,
    _option: RPCOption,
  ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, NodeInfo, RaftError<NodeId>>> {
    match self.call(&RaftRequest::Vote(rpc)).await {
      Ok(RaftReply::Vote(Ok(response))) => Ok(response),
      Ok(RaftReply::Vote(Err(e))) => Err(RPCError::RemoteError(RemoteError::new(self.target, e))),
      Ok(_) => Err(RPCError::Unreachable(unreachable("mismatched raft reply"))),
      Err(e) => Err(RPCError::Unreachable(unreachable(e))),
    }
  }

  async fn install_snapshot(
    &mut self,
    rpc: InstallSnapshotRequest<TypeConfig>,
    _option: RPCOption,
  ) -> Result<
    InstallSnapshotResponse<NodeId>,
    RPCError<NodeId, NodeInfo, RaftError<NodeId, InstallSnapshotError>>,
  > {
    match self.call(&RaftRequest::InstallSnapshot(rpc)).await {
      Ok(RaftReply::InstallSnapshot(Ok(response))) => Ok(response),
      Ok(RaftReply::InstallSnapshot(Err(e))) => {
        Err(RPCError::RemoteError(RemoteError::new(self.target, e)))
      }
      Ok(_) => Err(RPCError::Unreachable(unreachable("mismatched raft reply"))),
      Err(e) => Err(RPCError::Unreachable(unreachable(e))),
    }
  }
}
