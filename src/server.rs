use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::error;

use crate::{
  api,
  auth::Authorizer,
  error::{Error, Result},
  stream_layer::PeerIdentity,
};

pub const OBJECT_WILDCARD: &str = "*";
pub const PRODUCE_ACTION: &str = "produce";
pub const CONSUME_ACTION: &str = "consume";

/// How often a waiting consume stream re-checks the log for the offset
/// it is parked on.
const CONSUME_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the server appends to and reads from: the plain log on a
/// standalone node, the distributed log in a cluster.
#[async_trait]
pub trait CommitLog: Send + Sync + 'static {
  async fn append(&self, record: api::v1::Record) -> Result<u64>;
  fn read(&self, offset: u64) -> Result<api::v1::Record>;
}

#[async_trait]
impl CommitLog for crate::commit_log::Log {
  async fn append(&self, mut record: api::v1::Record) -> Result<u64> {
    crate::commit_log::Log::append(self, &mut record)
  }

  fn read(&self, offset: u64) -> Result<api::v1::Record> {
    crate::commit_log::Log::read(self, offset)
  }
}

/// Source of the cluster's server list for `GetServers`.
pub trait ClusterInfo: Send + Sync + 'static {
  fn servers(&self) -> Result<Vec<api::v1::Server>>;
}

#[derive(Clone)]
pub struct LogService {
  commit_log: Arc<dyn CommitLog>,
  cluster: Option<Arc<dyn ClusterInfo>>,
  authorizer: Option<Arc<Authorizer>>,
}

impl LogService {
  pub fn new(
    commit_log: Arc<dyn CommitLog>,
    cluster: Option<Arc<dyn ClusterInfo>>,
    authorizer: Option<Arc<Authorizer>>,
  ) -> Self {
    Self {
      commit_log,
      cluster,
      authorizer,
    }
  }

  pub fn into_service(self) -> api::v1::log_server::LogServer<Self> {
    api::v1::log_server::LogServer::new(self)
  }

  /// Authorization runs before any business logic. The subject is the
  /// Common Name the stream layer extracted from the peer certificate;
  /// without TLS there is no authorizer configured and everything is
  /// allowed.
  fn authorize<T>(&self, request: &Request<T>, action: &str) -> std::result::Result<(), Status> {
    let Some(authorizer) = &self.authorizer else {
      return Ok(());
    };

    let subject = request
      .extensions()
      .get::<PeerIdentity>()
      .and_then(|identity| identity.common_name.clone())
      .unwrap_or_default();

    authorizer
      .authorize(&subject, OBJECT_WILDCARD, action)
      .map_err(Status::from)
  }
}

#[tonic::async_trait]
impl api::v1::log_server::Log for LogService {
  async fn produce(
    &self,
    request: Request<api::v1::ProduceRequest>,
  ) -> std::result::Result<Response<api::v1::ProduceResponse>, Status> {
    self.authorize(&request, PRODUCE_ACTION)?;

    let record = request
      .into_inner()
      .record
      .ok_or_else(|| Status::invalid_argument("produce request has no record"))?;

    let offset = self.commit_log.append(record).await.map_err(Status::from)?;

    Ok(Response::new(api::v1::ProduceResponse { offset }))
  }

  async fn consume(
    &self,
    request: Request<api::v1::ConsumeRequest>,
  ) -> std::result::Result<Response<api::v1::ConsumeResponse>, Status> {
    self.authorize(&request, CONSUME_ACTION)?;

    let record = self
      .commit_log
      .read(request.into_inner().offset)
      .map_err(Status::from)?;

    Ok(Response::new(api::v1::ConsumeResponse {
      record: Some(record),
    }))
  }

  type ProduceStreamStream = ReceiverStream<std::result::Result<api::v1::ProduceResponse, Status>>;

  async fn produce_stream(
    &self,
    request: Request<Streaming<api::v1::ProduceRequest>>,
  ) -> std::result::Result<Response<Self::ProduceStreamStream>, Status> {
    self.authorize(&request, PRODUCE_ACTION)?;

    let mut requests = request.into_inner();
    let (tx, rx) = mpsc::channel(4);
    let commit_log = Arc::clone(&self.commit_log);

    tokio::spawn(async move {
      loop {
        let request = match requests.message().await {
          Ok(Some(request)) => request,
          // Client closed its half of the stream.
          Ok(None) => return,
          Err(status) => {
            let _ = tx.send(Err(status)).await;
            return;
          }
        };

        let response = match request.record {
          Some(record) => commit_log
            .append(record)
            .await
            .map(|offset| api::v1::ProduceResponse { offset })
            .map_err(Status::from),
          None => Err(Status::invalid_argument("produce request has no record")),
        };

        let failed = response.is_err();
        if tx.send(response).await.is_err() || failed {
          return;
        }
      }
    });

    Ok(Response::new(ReceiverStream::new(rx)))
  }

  type ConsumeStreamStream = ReceiverStream<std::result::Result<api::v1::ConsumeResponse, Status>>;

  async fn consume_stream(
    &self,
    request: Request<api::v1::ConsumeRequest>,
  ) -> std::result::Result<Response<Self::ConsumeStreamStream>, Status> {
    self.authorize(&request, CONSUME_ACTION)?;

    let mut offset = request.into_inner().offset;
    let (tx, rx) = mpsc::channel(4);
    let commit_log = Arc::clone(&self.commit_log);

    tokio::spawn(async move {
      loop {
        match commit_log.read(offset) {
          Ok(record) => {
            let response = api::v1::ConsumeResponse {
              record: Some(record),
            };
            if tx.send(Ok(response)).await.is_err() {
              // Client went away.
              return;
            }
            offset += 1;
          }
          // The offset is past the head of the log: wait for it to be
          // written instead of ending the stream.
          Err(Error::OffsetOutOfRange(_)) => {
            if tx.is_closed() {
              return;
            }
            tokio::time::sleep(CONSUME_POLL_INTERVAL).await;
          }
          Err(e) => {
            error!(error = %e, "consume stream failed");
            let _ = tx.send(Err(Status::from(e))).await;
            return;
          }
        }
      }
    });

    Ok(Response::new(ReceiverStream::new(rx)))
  }

  async fn get_servers(
    &self,
    _request: Request<api::v1::GetServersRequest>,
  ) -> std::result::Result<Response<api::v1::GetServersResponse>, Status> {
    let servers = match &self.cluster {
      Some(cluster) => cluster.servers().map_err(Status::from)?,
      None => Vec::new(),
    };

    Ok(Response::new(api::v1::GetServersResponse { servers }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::commit_log::{Config, Log};
  use tokio::net::TcpListener;
  use tokio_stream::wrappers::TcpListenerStream;
  use tonic::transport::{Channel, Server};

  async fn setup() -> (api::v1::log_client::LogClient<Channel>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(Log::new(dir.path(), Config::default()).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let service = LogService::new(log, None, None);
    tokio::spawn(async move {
      Server::builder()
        .add_service(service.into_service())
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
        .unwrap();
    });

    let client = api::v1::log_client::LogClient::connect(format!("http://{addr}"))
      .await
      .unwrap();

    (client, dir)
  }

  fn produce_request(value: &[u8]) -> api::v1::ProduceRequest {
    api::v1::ProduceRequest {
      record: Some(api::v1::Record {
        value: value.to_vec(),
        ..Default::default()
      }),
    }
  }

  #[test_log::test(tokio::test)]
  async fn produce_then_consume_round_trips() {
    let (mut client, _dir) = setup().await;

    let produce = client
      .produce(produce_request(b"hello world"))
      .await
      .unwrap()
      .into_inner();
    assert_eq!(0, produce.offset);

    let consume = client
      .consume(api::v1::ConsumeRequest {
        offset: produce.offset,
      })
      .await
      .unwrap()
      .into_inner();

    let record = consume.record.unwrap();
    assert_eq!(b"hello world".to_vec(), record.value);
    assert_eq!(produce.offset, record.offset);
  }

  #[test_log::test(tokio::test)]
  async fn consume_past_log_boundary_is_not_found() {
    let (mut client, _dir) = setup().await;

    let produce = client
      .produce(produce_request(b"hello world"))
      .await
      .unwrap()
      .into_inner();

    let status = client
      .consume(api::v1::ConsumeRequest {
        offset: produce.offset + 1,
      })
      .await
      .unwrap_err();

    assert_eq!(tonic::Code::NotFound, status.code());
  }

  #[test_log::test(tokio::test)]
  async fn produce_and_consume_streams() {
    let (mut client, _dir) = setup().await;

    let records: Vec<&[u8]> = vec![b"first message", b"second message"];

    {
      let requests = tokio_stream::iter(
        records
          .iter()
          .map(|value| produce_request(value))
          .collect::<Vec<_>>(),
      );

      let mut responses = client.produce_stream(requests).await.unwrap().into_inner();

      for want in 0..records.len() as u64 {
        let response = responses.message().await.unwrap().unwrap();
        assert_eq!(want, response.offset);
      }
    }

    {
      let mut stream = client
        .consume_stream(api::v1::ConsumeRequest { offset: 0 })
        .await
        .unwrap()
        .into_inner();

      for (want_offset, want_value) in records.iter().enumerate() {
        let response = stream.message().await.unwrap().unwrap();
        let record = response.record.unwrap();
        assert_eq!(want_offset as u64, record.offset);
        assert_eq!(want_value.to_vec(), record.value);
      }
    }
  }

  #[test_log::test(tokio::test)]
  async fn consume_stream_waits_for_records_past_the_head() {
    let (mut client, _dir) = setup().await;

    let produce = client
      .produce(produce_request(b"present"))
      .await
      .unwrap()
      .into_inner();

    // Park a stream one past the head of the log.
    let mut stream = client
      .consume_stream(api::v1::ConsumeRequest {
        offset: produce.offset + 1,
      })
      .await
      .unwrap()
      .into_inner();

    // Nothing must arrive while the offset is unwritten.
    let parked =
      tokio::time::timeout(Duration::from_millis(300), stream.message()).await;
    assert!(parked.is_err());

    client.produce(produce_request(b"future")).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(3), stream.message())
      .await
      .unwrap()
      .unwrap()
      .unwrap();
    let record = response.record.unwrap();
    assert_eq!(b"future".to_vec(), record.value);
    assert_eq!(produce.offset + 1, record.offset);
  }

  #[test_log::test(tokio::test)]
  async fn get_servers_is_empty_without_cluster_info() {
    let (mut client, _dir) = setup().await;

    let response = client
      .get_servers(api::v1::GetServersRequest {})
      .await
      .unwrap()
      .into_inner();

    assert!(response.servers.is_empty());
  }
}
