use futures::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tinyrpc_client::{xdial, Client};
use tinyrpc_common::{Context, Options, Result};
use tokio::sync::Mutex;

use crate::discovery::{Discovery, SelectMode};

/// Client over a set of servers found through a [`Discovery`].
///
/// Keeps one connection per server address, dialed on first use and
/// redialed if it becomes unavailable.
///
/// # Example
///
/// ```no_run
/// use tinyrpc_common::Context;
/// use tinyrpc_xclient::{MultiServersDiscovery, SelectMode, XClient};
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let discovery = MultiServersDiscovery::new(vec![
///     "tcp@127.0.0.1:9001".to_string(),
///     "http@127.0.0.1:9002".to_string(),
/// ]);
/// let xclient = XClient::new(discovery, SelectMode::RoundRobin, None);
///
/// let sum: i64 = xclient.call(&Context::background(), "Foo.Sum", &(3, 4)).await?;
/// xclient.close().await;
/// # Ok(())
/// # }
/// ```
pub struct XClient<D> {
    discovery: D,
    mode: SelectMode,
    options: Options,
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl<D: Discovery> XClient<D> {
    /// `None` options mean [`Options::default`].
    pub fn new(discovery: D, mode: SelectMode, options: Option<Options>) -> Self {
        Self {
            discovery,
            mode,
            options: Options::normalized(options),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Calls `service_method` on one server chosen by the select mode.
    pub async fn call<A, R>(&self, ctx: &Context, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let rpc_addr = self.discovery.get(self.mode).await?;
        self.call_server(&rpc_addr, ctx, service_method, args).await
    }

    /// Calls `service_method` on every known server concurrently.
    ///
    /// The first failure cancels the calls still running and is returned.
    /// `reply`, when given, receives the first successful reply, even if
    /// another server's failure ends up being returned.
    pub async fn broadcast<A, R>(
        &self,
        ctx: &Context,
        service_method: &str,
        args: &A,
        mut reply: Option<&mut R>,
    ) -> Result<()>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let servers = self.discovery.get_all().await?;
        let ctx = ctx.child();

        let mut calls: FuturesUnordered<_> = servers
            .iter()
            .map(|rpc_addr| self.call_server::<A, R>(rpc_addr, &ctx, service_method, args))
            .collect();

        let mut first_err = None;
        while let Some(result) = calls.next().await {
            match result {
                Ok(value) => {
                    if let Some(reply) = reply.take() {
                        *reply = value;
                    }
                }
                Err(e) => {
                    if first_err.is_none() {
                        ctx.cancel();
                        first_err = Some(e);
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        let clients: Vec<_> = self.clients.lock().await.drain().collect();
        for (rpc_addr, client) in clients {
            if let Err(e) = client.close().await {
                tracing::debug!("xclient: closing {}: {}", rpc_addr, e);
            }
        }
    }

    async fn call_server<A, R>(&self, rpc_addr: &str, ctx: &Context, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let client = self.dial(rpc_addr).await?;
        client.call(ctx, service_method, args).await
    }

    /// Returns the pooled client for `rpc_addr`, dialing a new one if needed.
    async fn dial(&self, rpc_addr: &str) -> Result<Arc<Client>> {
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(rpc_addr).cloned() {
            if client.is_available().await {
                return Ok(client);
            }
            tracing::debug!("xclient: evicting unavailable client for {}", rpc_addr);
            let _ = client.close().await;
            clients.remove(rpc_addr);
        }

        let client = Arc::new(xdial(rpc_addr, Some(self.options.clone())).await?);
        clients.insert(rpc_addr.to_string(), client.clone());
        Ok(client)
    }

    #[cfg(test)]
    async fn pooled(&self) -> usize {
        self.clients.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::MultiServersDiscovery;
    use tinyrpc_common::RpcError;
    use tinyrpc_server::{Server, Service};
    use tokio::net::TcpListener;

    async fn start_server(name: &'static str) -> String {
        let mut server = Server::new();
        server
            .register(Service::new("Echo").register_method("Name", move |_: ()| async move {
                Ok::<_, String>(name.to_string())
            }))
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("tcp@{}", listener.local_addr().unwrap());
        tokio::spawn(Arc::new(server).accept(listener));
        addr
    }

    #[tokio::test]
    async fn test_pool_reuses_clients() {
        let addr = start_server("a").await;
        let xclient = XClient::new(MultiServersDiscovery::new(vec![addr]), SelectMode::Random, None);

        for _ in 0..3 {
            let name: String = xclient.call(&Context::background(), "Echo.Name", &()).await.unwrap();
            assert_eq!(name, "a");
        }
        assert_eq!(xclient.pooled().await, 1);

        xclient.close().await;
        assert_eq!(xclient.pooled().await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_client_is_redialed() {
        let addr = start_server("a").await;
        let xclient = XClient::new(MultiServersDiscovery::new(vec![addr.clone()]), SelectMode::Random, None);

        let first = xclient.dial(&addr).await.unwrap();
        first.close().await.unwrap();

        let second = xclient.dial(&addr).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_available().await);
    }

    #[tokio::test]
    async fn test_updated_servers_are_used() {
        let old = start_server("old").await;
        let new = start_server("new").await;
        let xclient = XClient::new(MultiServersDiscovery::new(vec![old]), SelectMode::RoundRobin, None);

        let name: String = xclient.call(&Context::background(), "Echo.Name", &()).await.unwrap();
        assert_eq!(name, "old");

        xclient.discovery().update(vec![new]).await.unwrap();
        for _ in 0..3 {
            let name: String = xclient.call(&Context::background(), "Echo.Name", &()).await.unwrap();
            assert_eq!(name, "new");
        }
    }

    #[tokio::test]
    async fn test_no_servers() {
        let xclient = XClient::new(MultiServersDiscovery::new(vec![]), SelectMode::RoundRobin, None);
        let err = xclient
            .call::<_, String>(&Context::background(), "Echo.Name", &())
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::NoAvailableServers);
    }
}
