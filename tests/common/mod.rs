#![allow(dead_code)]

use std::{
  fs,
  future::Future,
  net::{TcpListener, UdpSocket},
  path::{Path, PathBuf},
  time::Duration,
};

use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, SanType};

/// PEM files for a throwaway CA plus server and client certificates,
/// written under the test's temp directory.
pub struct TestCerts {
  pub ca_file: PathBuf,
  pub server_cert_file: PathBuf,
  pub server_key_file: PathBuf,
  pub root_client_cert_file: PathBuf,
  pub root_client_key_file: PathBuf,
  pub nobody_client_cert_file: PathBuf,
  pub nobody_client_key_file: PathBuf,
}

pub fn generate_certs(dir: &Path) -> TestCerts {
  let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
  ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
  ca_params.distinguished_name = DistinguishedName::new();
  ca_params
    .distinguished_name
    .push(DnType::CommonName, "proglog test ca");
  let ca_key = KeyPair::generate().unwrap();
  let ca_cert = ca_params.self_signed(&ca_key).unwrap();

  let ca_file = dir.join("ca.pem");
  fs::write(&ca_file, ca_cert.pem()).unwrap();

  // Server certificate valid for loopback.
  let mut server_params = CertificateParams::new(vec![String::from("localhost")]).unwrap();
  server_params
    .subject_alt_names
    .push(SanType::IpAddress("127.0.0.1".parse().unwrap()));
  server_params.distinguished_name = DistinguishedName::new();
  server_params
    .distinguished_name
    .push(DnType::CommonName, "server");
  let server_key = KeyPair::generate().unwrap();
  let server_cert = server_params.signed_by(&server_key, &ca_cert, &ca_key).unwrap();

  let server_cert_file = dir.join("server.pem");
  let server_key_file = dir.join("server-key.pem");
  fs::write(&server_cert_file, server_cert.pem()).unwrap();
  fs::write(&server_key_file, server_key.serialize_pem()).unwrap();

  let (root_client_cert_file, root_client_key_file) =
    client_cert(dir, &ca_cert, &ca_key, "root");
  let (nobody_client_cert_file, nobody_client_key_file) =
    client_cert(dir, &ca_cert, &ca_key, "nobody");

  TestCerts {
    ca_file,
    server_cert_file,
    server_key_file,
    root_client_cert_file,
    root_client_key_file,
    nobody_client_cert_file,
    nobody_client_key_file,
  }
}

fn client_cert(
  dir: &Path,
  ca_cert: &rcgen::Certificate,
  ca_key: &KeyPair,
  common_name: &str,
) -> (PathBuf, PathBuf) {
  let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
  params.distinguished_name = DistinguishedName::new();
  params.distinguished_name.push(DnType::CommonName, common_name);
  let key = KeyPair::generate().unwrap();
  let cert = params.signed_by(&key, ca_cert, ca_key).unwrap();

  let cert_file = dir.join(format!("{common_name}.pem"));
  let key_file = dir.join(format!("{common_name}-key.pem"));
  fs::write(&cert_file, cert.pem()).unwrap();
  fs::write(&key_file, key.serialize_pem()).unwrap();

  (cert_file, key_file)
}

const ACL_MODEL: &str = "\
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
";

const ACL_POLICY: &str = "\
p, root, *, produce
p, root, *, consume
";

/// Writes the ACL model and a policy granting `root` everything;
/// `nobody` has no entries.
pub fn write_acl_files(dir: &Path) -> (PathBuf, PathBuf) {
  let model_file = dir.join("model.conf");
  let policy_file = dir.join("policy.csv");
  fs::write(&model_file, ACL_MODEL).unwrap();
  fs::write(&policy_file, ACL_POLICY).unwrap();

  (model_file, policy_file)
}

/// Free TCP ports, all reserved at once so they do not repeat.
pub fn free_tcp_ports(count: usize) -> Vec<u16> {
  let listeners: Vec<TcpListener> = (0..count)
    .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
    .collect();

  listeners
    .iter()
    .map(|listener| listener.local_addr().unwrap().port())
    .collect()
}

/// Free UDP ports for gossip binds.
pub fn free_udp_ports(count: usize) -> Vec<u16> {
  let sockets: Vec<UdpSocket> = (0..count)
    .map(|_| UdpSocket::bind("127.0.0.1:0").unwrap())
    .collect();

  sockets
    .iter()
    .map(|socket| socket.local_addr().unwrap().port())
    .collect()
}

/// Polls the condition until it holds or the timeout elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: Future<Output = bool>,
{
  let deadline = tokio::time::Instant::now() + timeout;

  loop {
    if condition().await {
      return true;
    }
    if tokio::time::Instant::now() >= deadline {
      return false;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
}
