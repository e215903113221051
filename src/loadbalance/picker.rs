/// Leader-aware routing over the resolved server set.
use std::sync::{
  atomic::{AtomicU64, Ordering},
  RwLock,
};

use crate::{
  api,
  error::{Error, Result},
};

/// Which way a call should be routed: mutations to the leader, reads
/// spread over followers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  Produce,
  Consume,
}

#[derive(Debug, Default)]
pub struct Picker {
  state: RwLock<State>,
  /// Shared round-robin counter; only its fairness over long runs
  /// matters, not its exact value.
  current: AtomicU64,
}

#[derive(Debug, Default)]
struct State {
  leader: Option<String>,
  followers: Vec<String>,
}

impl Picker {
  /// Replaces the routing state with a freshly resolved server set.
  pub fn update(&self, servers: &[api::v1::Server]) {
    let mut state = self.state.write().unwrap();

    state.leader = servers
      .iter()
      .find(|server| server.is_leader)
      .map(|server| server.rpc_addr.clone());
    state.followers = servers
      .iter()
      .filter(|server| !server.is_leader)
      .map(|server| server.rpc_addr.clone())
      .collect();
  }

  /// Picks the address for one call. Produce requires the leader and
  /// signals `NoLeader` when none is known so the caller can refresh
  /// and retry; consume round-robins over the followers and falls back
  /// to the leader when there are none.
  pub fn pick(&self, route: Route) -> Result<String> {
    let state = self.state.read().unwrap();

    match route {
      Route::Produce => state.leader.clone().ok_or(Error::NoLeader),
      Route::Consume => {
        if state.followers.is_empty() {
          state.leader.clone().ok_or(Error::NoLeader)
        } else {
          let n = self.current.fetch_add(1, Ordering::Relaxed);
          Ok(state.followers[(n % state.followers.len() as u64) as usize].clone())
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn servers() -> Vec<api::v1::Server> {
    vec![
      api::v1::Server {
        id: String::from("0"),
        rpc_addr: String::from("127.0.0.1:9000"),
        is_leader: true,
      },
      api::v1::Server {
        id: String::from("1"),
        rpc_addr: String::from("127.0.0.1:9001"),
        is_leader: false,
      },
      api::v1::Server {
        id: String::from("2"),
        rpc_addr: String::from("127.0.0.1:9002"),
        is_leader: false,
      },
    ]
  }

  #[test]
  fn picker_without_servers_has_no_leader() {
    let picker = Picker::default();

    assert!(matches!(picker.pick(Route::Produce), Err(Error::NoLeader)));
    assert!(matches!(picker.pick(Route::Consume), Err(Error::NoLeader)));
  }

  #[test]
  fn produce_routes_to_the_leader() {
    let picker = Picker::default();
    picker.update(&servers());

    for _ in 0..4 {
      assert_eq!("127.0.0.1:9000", picker.pick(Route::Produce).unwrap());
    }
  }

  #[test]
  fn consume_round_robins_over_followers() {
    let picker = Picker::default();
    picker.update(&servers());

    let picks: Vec<String> = (0..4).map(|_| picker.pick(Route::Consume).unwrap()).collect();

    assert_eq!(
      vec![
        String::from("127.0.0.1:9001"),
        String::from("127.0.0.1:9002"),
        String::from("127.0.0.1:9001"),
        String::from("127.0.0.1:9002"),
      ],
      picks
    );
  }

  #[test]
  fn consume_falls_back_to_the_leader_without_followers() {
    let picker = Picker::default();
    picker.update(&servers()[..1]);

    assert_eq!("127.0.0.1:9000", picker.pick(Route::Consume).unwrap());
  }
}
