use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Time after its last heartbeat that a server is considered gone.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A registered server and when it was last heard from.
#[derive(Debug, Clone)]
pub struct ServerItem {
    pub addr: String,
    pub start: Instant,
}

/// Live server addresses, expired lazily on read.
pub struct Registry {
    servers: Mutex<HashMap<String, ServerItem>>,
    timeout: Duration,
}

impl Registry {
    /// Creates a registry; a zero `timeout` keeps servers forever.
    pub fn new(timeout: Duration) -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Registers `addr`, or refreshes its heartbeat if already known.
    pub async fn put_server(&self, addr: &str) {
        let now = Instant::now();
        let mut servers = self.servers.lock().await;
        match servers.get_mut(addr) {
            Some(item) => item.start = now,
            None => {
                tracing::info!("registry: new server {}", addr);
                servers.insert(
                    addr.to_string(),
                    ServerItem {
                        addr: addr.to_string(),
                        start: now,
                    },
                );
            }
        }
    }

    /// Addresses whose heartbeat has not expired, sorted.
    ///
    /// Expired entries are removed as a side effect.
    pub async fn alive_servers(&self) -> Vec<String> {
        let now = Instant::now();
        let mut servers = self.servers.lock().await;

        if !self.timeout.is_zero() {
            servers.retain(|addr, item| {
                let alive = item.start + self.timeout > now;
                if !alive {
                    tracing::info!("registry: server {} expired", addr);
                }
                alive
            });
        }

        let mut alive: Vec<String> = servers.keys().cloned().collect();
        alive.sort();
        alive
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}
