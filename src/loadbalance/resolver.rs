/// Server discovery for `proglog://` targets: the seed address only
/// bootstraps discovery, the full server set comes from `GetServers`.
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::{
  api,
  error::{Error, Result},
};

/// Scheme clients dial, as in `proglog://127.0.0.1:8400`.
pub const SCHEME: &str = "proglog";

/// Splits a `proglog://host:port` target into the seed address.
pub fn parse_target(target: &str) -> Result<String> {
  match target.split_once("://") {
    Some((scheme, addr)) if scheme == SCHEME && !addr.is_empty() => Ok(addr.to_string()),
    _ => Err(Error::InvalidTarget(target.to_string())),
  }
}

/// Lazily connects a channel to `addr`, with TLS when configured.
pub(crate) fn connect_channel(addr: &str, tls: Option<ClientTlsConfig>) -> Result<Channel> {
  let scheme = if tls.is_some() { "https" } else { "http" };

  let mut endpoint = Endpoint::from_shared(format!("{scheme}://{addr}"))
    .map_err(|_| Error::InvalidTarget(addr.to_string()))?;

  if let Some(tls) = tls {
    endpoint = endpoint
      .tls_config(tls)
      .map_err(|e| Error::Tls(e.to_string()))?;
  }

  Ok(endpoint.connect_lazy())
}

pub struct Resolver {
  seed_addr: String,
  tls: Option<ClientTlsConfig>,
}

impl Resolver {
  pub fn new(target: &str, tls: Option<ClientTlsConfig>) -> Result<Self> {
    Ok(Self {
      seed_addr: parse_target(target)?,
      tls,
    })
  }

  /// Fetches the current server set from the seed node.
  pub async fn resolve(&self) -> Result<Vec<api::v1::Server>> {
    let channel = connect_channel(&self.seed_addr, self.tls.clone())?;
    let mut client = api::v1::log_client::LogClient::new(channel);

    let response = client.get_servers(api::v1::GetServersRequest {}).await?;

    Ok(response.into_inner().servers)
  }
}
