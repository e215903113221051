/// Client-side load balancing: the resolver discovers the cluster
/// through any node and the picker routes produce traffic to the leader
/// while spreading consume traffic over followers.
use std::collections::HashMap;

use tokio::sync::Mutex;
use tonic::transport::{Channel, ClientTlsConfig};

use crate::{
  api,
  error::{Error, Result},
};

pub mod picker;
pub mod resolver;

pub use picker::{Picker, Route};
pub use resolver::{Resolver, SCHEME};

pub struct Client {
  resolver: Resolver,
  picker: Picker,
  channels: Mutex<HashMap<String, api::v1::log_client::LogClient<Channel>>>,
  tls: Option<ClientTlsConfig>,
}

impl Client {
  /// Connects to a `proglog://<seed>` target and resolves the initial
  /// server set through it.
  pub async fn connect(target: &str, tls: Option<ClientTlsConfig>) -> Result<Self> {
    let client = Self {
      resolver: Resolver::new(target, tls.clone())?,
      picker: Picker::default(),
      channels: Mutex::new(HashMap::new()),
      tls,
    };

    client.refresh().await?;

    Ok(client)
  }

  /// Re-fetches the server list and updates the routing state.
  pub async fn refresh(&self) -> Result<()> {
    let servers = self.resolver.resolve().await?;
    self.picker.update(&servers);

    Ok(())
  }

  async fn client_for(&self, addr: &str) -> Result<api::v1::log_client::LogClient<Channel>> {
    let mut channels = self.channels.lock().await;

    if let Some(client) = channels.get(addr) {
      return Ok(client.clone());
    }

    let channel = resolver::connect_channel(addr, self.tls.clone())?;
    let client = api::v1::log_client::LogClient::new(channel);
    channels.insert(addr.to_string(), client.clone());

    Ok(client)
  }

  /// Appends one record through the leader. When the routed node turns
  /// out not to be the leader anymore, the server list is refreshed and
  /// the call retried once.
  pub async fn produce(&self, value: Vec<u8>) -> Result<u64> {
    match self.produce_once(value.clone()).await {
      Err(e) if e.is_routing_error() => {
        self.refresh().await?;
        self.produce_once(value).await
      }
      other => other,
    }
  }

  async fn produce_once(&self, value: Vec<u8>) -> Result<u64> {
    let addr = self.picker.pick(Route::Produce)?;
    let mut client = self.client_for(&addr).await?;

    let response = client
      .produce(api::v1::ProduceRequest {
        record: Some(api::v1::Record {
          value,
          ..Default::default()
        }),
      })
      .await?;

    Ok(response.into_inner().offset)
  }

  /// Reads one record from a follower, falling back to the leader when
  /// the cluster has no followers.
  pub async fn consume(&self, offset: u64) -> Result<api::v1::Record> {
    let addr = self.picker.pick(Route::Consume)?;
    let mut client = self.client_for(&addr).await?;

    let response = client.consume(api::v1::ConsumeRequest { offset }).await?;

    response
      .into_inner()
      .record
      .ok_or_else(|| Error::Internal(String::from("consume response has no record")))
  }

  pub async fn get_servers(&self) -> Result<Vec<api::v1::Server>> {
    let addr = self.picker.pick(Route::Consume)?;
    let mut client = self.client_for(&addr).await?;

    let response = client.get_servers(api::v1::GetServersRequest {}).await?;

    Ok(response.into_inner().servers)
  }

  /// The leader's client, for long-lived produce streams.
  pub async fn leader_client(&self) -> Result<api::v1::log_client::LogClient<Channel>> {
    let addr = self.picker.pick(Route::Produce)?;
    self.client_for(&addr).await
  }
}
