//! HTTP Server for the Registry
//!
//! This module exposes a [`Registry`] over HTTP using axum. A single path
//! serves both directions: `GET` lists live servers and `POST` records a
//! heartbeat. Other methods get `405 Method Not Allowed`.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tinyrpc_common::{Result, RpcError, DEFAULT_REGISTRY_PATH, SERVERS_HEADER};
use tokio::net::TcpListener;
use tracing::info;

use crate::registry::Registry;

/// HTTP server for a [`Registry`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tinyrpc_registry::{Registry, RegistryServer};
/// use tokio::net::TcpListener;
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let listener = TcpListener::bind("127.0.0.1:9999").await?;
/// RegistryServer::new(Arc::new(Registry::default())).run(listener).await
/// # }
/// ```
pub struct RegistryServer {
    registry: Arc<Registry>,
}

impl RegistryServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Router serving the registry at [`DEFAULT_REGISTRY_PATH`].
    pub fn router(&self) -> Router {
        Router::new()
            .route(DEFAULT_REGISTRY_PATH, get(list_servers).post(put_server))
            .with_state(self.registry.clone())
    }

    /// Serves the registry on `listener`.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        let app = self.router();

        if let Ok(addr) = listener.local_addr() {
            info!(
                "rpc registry listening on http://{}{} (server timeout {:?})",
                addr,
                DEFAULT_REGISTRY_PATH,
                self.registry.timeout()
            );
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| RpcError::Registry(format!("Server error: {}", e)))
    }
}

/// Answers with every live address in the servers header.
async fn list_servers(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let servers = registry.alive_servers().await.join(",");
    (StatusCode::OK, [(SERVERS_HEADER, servers)])
}

/// Records a heartbeat from the address in the servers header.
async fn put_server(State(registry): State<Arc<Registry>>, headers: HeaderMap) -> StatusCode {
    let addr = headers
        .get(SERVERS_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|addr| !addr.is_empty());

    match addr {
        Some(addr) => {
            registry.put_server(addr).await;
            StatusCode::OK
        }
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_list() {
        let registry = Arc::new(Registry::default());

        let mut headers = HeaderMap::new();
        headers.insert(SERVERS_HEADER, "tcp@127.0.0.1:9001".parse().unwrap());
        assert_eq!(put_server(State(registry.clone()), headers).await, StatusCode::OK);

        let response = list_servers(State(registry)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SERVERS_HEADER], "tcp@127.0.0.1:9001");
    }

    #[tokio::test]
    async fn test_put_without_header_is_rejected() {
        let registry = Arc::new(Registry::default());
        let status = put_server(State(registry.clone()), HeaderMap::new()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(registry.alive_servers().await.is_empty());
    }
}
