use async_trait::async_trait;
use std::time::Duration;
use tinyrpc_common::{Result, RpcError, SERVERS_HEADER};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::discovery::{Discovery, MultiServersDiscovery, SelectMode};

/// How long a fetched server list is trusted before asking the registry again.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Discovery backed by a tinyrpc registry.
///
/// The server list is fetched lazily: [`get`](Discovery::get) and
/// [`get_all`](Discovery::get_all) refresh it first, but at most once per
/// refresh interval.
pub struct RegistryDiscovery {
    servers: MultiServersDiscovery,
    registry_url: String,
    refresh_interval: Duration,
    last_update: Mutex<Option<Instant>>,
    http: reqwest::Client,
}

impl RegistryDiscovery {
    /// Creates a discovery reading from the registry at `registry_url`, for
    /// example `http://127.0.0.1:9999/_tinyrpc_/registry`.
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            servers: MultiServersDiscovery::new(Vec::new()),
            registry_url: registry_url.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            last_update: Mutex::new(None),
            http: reqwest::Client::new(),
        }
    }

    /// Sets the refresh interval; zero keeps the default.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.refresh_interval = interval;
        }
        self
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(&self.registry_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| RpcError::Registry(format!("refresh err: {}", e)))?;

        let servers = response
            .headers()
            .get(SERVERS_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        Ok(parse_servers(servers))
    }
}

/// Splits the registry's comma-separated list, skipping blanks.
fn parse_servers(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(str::trim)
        .filter(|server| !server.is_empty())
        .map(String::from)
        .collect()
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<()> {
        // Held across the fetch so concurrent callers trigger one request
        let mut last_update = self.last_update.lock().await;
        if let Some(at) = *last_update {
            if at + self.refresh_interval > Instant::now() {
                return Ok(());
            }
        }

        tracing::debug!("rpc registry: refresh servers from registry {}", self.registry_url);
        let servers = self.fetch().await?;
        self.servers.update(servers).await?;
        *last_update = Some(Instant::now());
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        let mut last_update = self.last_update.lock().await;
        self.servers.update(servers).await?;
        *last_update = Some(Instant::now());
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.refresh().await?;
        self.servers.get(mode).await
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.refresh().await?;
        self.servers.get_all().await
    }
}
