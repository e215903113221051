/// Crate-wide error taxonomy. The RPC server translates these into
/// status codes at the boundary; lower layers never retry.
use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  /// The requested offset is not covered by any segment.
  #[error("offset out of range: {0}")]
  OffsetOutOfRange(u64),

  /// Reading an empty index, reading past the logical end of the index
  /// or writing to a full index.
  #[error("end of index")]
  Eof,

  /// A mutating operation was attempted on a follower.
  #[error("node is not the cluster leader")]
  NotLeader,

  /// The client does not currently know a leader to route writes to.
  #[error("no cluster leader is known")]
  NoLeader,

  #[error("{subject} is not permitted to {action} {object}")]
  PermissionDenied {
    subject: String,
    object: String,
    action: String,
  },

  #[error("timed out {0}")]
  Timeout(String),

  #[error("operation canceled")]
  Canceled,

  #[error("invalid target: {0}")]
  InvalidTarget(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error("record decode failed: {0}")]
  Decode(#[from] prost::DecodeError),

  #[error("raft: {0}")]
  Raft(String),

  #[error("tls: {0}")]
  Tls(String),

  #[error(transparent)]
  Rpc(#[from] Status),

  #[error("internal: {0}")]
  Internal(String),
}

impl From<Error> for Status {
  fn from(error: Error) -> Self {
    match error {
      Error::OffsetOutOfRange(offset) => {
        Status::not_found(format!("offset out of range: {offset}"))
      }
      Error::PermissionDenied { .. } => Status::permission_denied(error.to_string()),
      Error::NotLeader | Error::NoLeader => Status::failed_precondition(error.to_string()),
      Error::Timeout(_) => Status::deadline_exceeded(error.to_string()),
      Error::Canceled => Status::cancelled(error.to_string()),
      Error::Raft(_) => Status::unavailable(error.to_string()),
      Error::Rpc(status) => status,
      other => Status::internal(other.to_string()),
    }
  }
}

impl Error {
  /// True for errors the client resolver reacts to by refreshing its
  /// server list before retrying.
  pub fn is_routing_error(&self) -> bool {
    match self {
      Error::NotLeader | Error::NoLeader => true,
      Error::Rpc(status) => {
        status.code() == Code::FailedPrecondition || status.code() == Code::Unavailable
      }
      _ => false,
    }
  }
}
