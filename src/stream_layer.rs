/// One TCP listener carries both Raft replication traffic and client
/// RPCs. TLS is applied on both directions first so that peer identity
/// is verified; the first application byte of each connection then
/// selects the path: `0x01` hands the stream to Raft's transport, any
/// other byte is logically unread and the connection goes to the RPC
/// server.
use std::{
  io,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tonic::transport::server::Connected;

use crate::error::Result;

/// Tag byte identifying a Raft replication stream.
pub const RAFT_CONNECTION_TAG: u8 = 0x01;

/// A demultiplexed inbound connection.
pub enum Accepted {
  Raft(StreamSocket),
  Rpc(RpcConnection),
}

/// The identity of the TLS peer on an RPC connection, derived from the
/// client certificate's Common Name. Attached to every request as
/// tonic connect info.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
  pub common_name: Option<String>,
}

pub struct StreamLayer {
  acceptor: Option<TlsAcceptor>,
  connector: Option<TlsConnector>,
}

impl std::fmt::Debug for StreamLayer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StreamLayer")
      .field("acceptor", &self.acceptor.is_some())
      .field("connector", &self.connector.is_some())
      .finish()
  }
}

impl StreamLayer {
  pub fn new(
    server_tls: Option<Arc<rustls::ServerConfig>>,
    peer_tls: Option<Arc<rustls::ClientConfig>>,
  ) -> Self {
    Self {
      acceptor: server_tls.map(TlsAcceptor::from),
      connector: peer_tls.map(TlsConnector::from),
    }
  }

  /// Completes the TLS handshake when configured, then demultiplexes
  /// the connection by its first byte.
  pub async fn accept(&self, socket: TcpStream) -> Result<Accepted> {
    let (mut socket, identity) = match &self.acceptor {
      Some(acceptor) => {
        let tls = acceptor.accept(socket).await?;
        let identity = peer_identity(&tls);
        (
          StreamSocket::Tls(Box::new(tokio_rustls::TlsStream::Server(tls))),
          identity,
        )
      }
      None => (
        StreamSocket::Plain(socket),
        PeerIdentity { common_name: None },
      ),
    };

    let mut tag = [0u8; 1];
    socket.read_exact(&mut tag).await?;

    if tag[0] == RAFT_CONNECTION_TAG {
      Ok(Accepted::Raft(socket))
    } else {
      Ok(Accepted::Rpc(RpcConnection {
        socket,
        prefix: Some(tag[0]),
        identity,
      }))
    }
  }

  /// Dials a peer for Raft replication: TLS handshake first, then the
  /// tag byte identifying the stream.
  pub async fn dial(&self, addr: &str) -> io::Result<StreamSocket> {
    let tcp = TcpStream::connect(addr).await?;

    let mut socket = match &self.connector {
      Some(connector) => {
        let host = addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(addr);
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
          .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let tls = connector.connect(server_name, tcp).await?;
        StreamSocket::Tls(Box::new(tokio_rustls::TlsStream::Client(tls)))
      }
      None => StreamSocket::Plain(tcp),
    };

    socket.write_all(&[RAFT_CONNECTION_TAG]).await?;
    socket.flush().await?;

    Ok(socket)
  }
}

fn peer_identity(tls: &tokio_rustls::server::TlsStream<TcpStream>) -> PeerIdentity {
  let (_, connection) = tls.get_ref();

  let common_name = connection
    .peer_certificates()
    .and_then(|certs| certs.first())
    .and_then(|cert| {
      let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref()).ok()?;
      let common_name = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);
      common_name
    });

  PeerIdentity { common_name }
}

/// A connection accepted by the stream layer, either plain TCP (tests)
/// or TLS.
#[derive(Debug)]
pub enum StreamSocket {
  Plain(TcpStream),
  Tls(Box<tokio_rustls::TlsStream<TcpStream>>),
}

impl AsyncRead for StreamSocket {
  fn poll_read(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    match self.get_mut() {
      StreamSocket::Plain(socket) => Pin::new(socket).poll_read(cx, buf),
      StreamSocket::Tls(socket) => Pin::new(socket.as_mut()).poll_read(cx, buf),
    }
  }
}

impl AsyncWrite for StreamSocket {
  fn poll_write(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    match self.get_mut() {
      StreamSocket::Plain(socket) => Pin::new(socket).poll_write(cx, buf),
      StreamSocket::Tls(socket) => Pin::new(socket.as_mut()).poll_write(cx, buf),
    }
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      StreamSocket::Plain(socket) => Pin::new(socket).poll_flush(cx),
      StreamSocket::Tls(socket) => Pin::new(socket.as_mut()).poll_flush(cx),
    }
  }

  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      StreamSocket::Plain(socket) => Pin::new(socket).poll_shutdown(cx),
      StreamSocket::Tls(socket) => Pin::new(socket.as_mut()).poll_shutdown(cx),
    }
  }
}

/// An RPC connection handed to the gRPC server. The tag byte that was
/// read for demultiplexing is served back to the first read so the
/// HTTP/2 preface stays intact.
#[derive(Debug)]
pub struct RpcConnection {
  socket: StreamSocket,
  prefix: Option<u8>,
  identity: PeerIdentity,
}

impl AsyncRead for RpcConnection {
  fn poll_read(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    let this = self.get_mut();

    if let Some(byte) = this.prefix.take() {
      buf.put_slice(&[byte]);
      return Poll::Ready(Ok(()));
    }

    Pin::new(&mut this.socket).poll_read(cx, buf)
  }
}

impl AsyncWrite for RpcConnection {
  fn poll_write(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    Pin::new(&mut self.get_mut().socket).poll_write(cx, buf)
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.get_mut().socket).poll_flush(cx)
  }

  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.get_mut().socket).poll_shutdown(cx)
  }
}

impl Connected for RpcConnection {
  type ConnectInfo = PeerIdentity;

  fn connect_info(&self) -> Self::ConnectInfo {
    self.identity.clone()
  }
}
