use std::{env, path::PathBuf};

use anyhow::Context;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use proglog::{agent, commit_log, tls};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenv().ok();

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("proglog=info")),
    )
    .init();

  let config = config_from_env()?;

  info!(node = %config.node_name, "starting agent");

  let agent = agent::Agent::new(config).await?;

  tokio::signal::ctrl_c().await?;

  agent.shutdown().await?;

  Ok(())
}

fn config_from_env() -> anyhow::Result<agent::Config> {
  let data_dir = env::var("DATA_DIR")
    .map(PathBuf::from)
    .unwrap_or_else(|_| env::temp_dir().join("proglog"));

  let node_name = env::var("NODE_NAME").context("NODE_NAME is required")?;

  let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| String::from("127.0.0.1:8401"));

  let rpc_port = env::var("RPC_PORT")
    .unwrap_or_else(|_| String::from("8400"))
    .parse::<u16>()
    .context("RPC_PORT must be a port number")?;

  let start_join_addrs = env::var("START_JOIN_ADDRS")
    .map(|addrs| {
      addrs
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(String::from)
        .collect()
    })
    .unwrap_or_default();

  let bootstrap = env::var("BOOTSTRAP")
    .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
    .unwrap_or(false);

  let acl_model_file = env::var("ACL_MODEL_FILE").ok().map(PathBuf::from);
  let acl_policy_file = env::var("ACL_POLICY_FILE").ok().map(PathBuf::from);

  let server_tls = match tls_config_from_env("SERVER")? {
    Some(config) => Some(tls::setup_server_config(&config)?),
    None => None,
  };
  let peer_tls = match tls_config_from_env("PEER")? {
    Some(config) => Some(tls::setup_client_config(&config)?),
    None => None,
  };

  Ok(agent::Config {
    data_dir,
    node_name,
    bind_addr,
    rpc_port,
    start_join_addrs,
    bootstrap,
    acl_model_file,
    acl_policy_file,
    server_tls,
    peer_tls,
    log: commit_log::Config::default(),
  })
}

fn tls_config_from_env(prefix: &str) -> anyhow::Result<Option<tls::TlsConfig>> {
  let cert_file = env::var(format!("{prefix}_TLS_CERT_FILE")).ok();
  let key_file = env::var(format!("{prefix}_TLS_KEY_FILE")).ok();
  let ca_file = env::var(format!("{prefix}_TLS_CA_FILE")).ok();

  match (cert_file, key_file, ca_file) {
    (Some(cert_file), Some(key_file), Some(ca_file)) => Ok(Some(tls::TlsConfig {
      cert_file: PathBuf::from(cert_file),
      key_file: PathBuf::from(key_file),
      ca_file: PathBuf::from(ca_file),
    })),
    (None, None, None) => Ok(None),
    _ => anyhow::bail!("{prefix} TLS requires cert, key and CA files"),
  }
}
