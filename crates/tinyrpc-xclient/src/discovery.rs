//! Server Discovery
//!
//! A [`Discovery`] knows the current set of server addresses and picks one
//! per call. [`MultiServersDiscovery`] works from a list given by the caller;
//! [`RegistryDiscovery`](crate::RegistryDiscovery) keeps its list in sync
//! with a registry.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tinyrpc_common::{Result, RpcError};
use tokio::sync::Mutex;

/// How [`Discovery::get`] chooses among the known servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    /// Uniformly random pick
    #[default]
    Random,
    /// Cycle through the servers in order
    RoundRobin,
}

/// Source of server addresses in `protocol@addr` form.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Re-reads the server list from its source, if it has one.
    async fn refresh(&self) -> Result<()>;

    /// Replaces the server list.
    async fn update(&self, servers: Vec<String>) -> Result<()>;

    /// Picks one server according to `mode`.
    async fn get(&self, mode: SelectMode) -> Result<String>;

    /// Returns every known server.
    async fn get_all(&self) -> Result<Vec<String>>;
}

struct State {
    servers: Vec<String>,
    /// Next round-robin position
    index: usize,
    rng: StdRng,
}

/// Discovery over a fixed, caller-maintained list of servers.
///
/// # Example
///
/// ```
/// use tinyrpc_xclient::{Discovery, MultiServersDiscovery, SelectMode};
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let discovery = MultiServersDiscovery::new(vec!["tcp@127.0.0.1:9001".to_string()]);
/// assert_eq!(discovery.get(SelectMode::RoundRobin).await?, "tcp@127.0.0.1:9001");
/// # Ok(())
/// # }
/// ```
pub struct MultiServersDiscovery {
    state: Mutex<State>,
}

impl MultiServersDiscovery {
    pub fn new(servers: Vec<String>) -> Self {
        let mut rng = StdRng::from_entropy();
        // Start round robin at a random position so clients spread out
        let index = rng.gen_range(0..i32::MAX as usize);
        Self {
            state: Mutex::new(State { servers, index, rng }),
        }
    }
}

#[async_trait]
impl Discovery for MultiServersDiscovery {
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        self.state.lock().await.servers = servers;
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        let mut state = self.state.lock().await;
        let n = state.servers.len();
        if n == 0 {
            return Err(RpcError::NoAvailableServers);
        }

        match mode {
            SelectMode::Random => {
                let i = state.rng.gen_range(0..n);
                Ok(state.servers[i].clone())
            }
            SelectMode::RoundRobin => {
                // The list may have shrunk since the last pick
                let server = state.servers[state.index % n].clone();
                state.index = (state.index + 1) % n;
                Ok(server)
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().await.servers.clone())
    }
}
