//! Heartbeats
//!
//! A server stays in the registry only while it keeps announcing itself.
//! [`heartbeat`] sends one announcement right away and then one per
//! interval from a background task.

use std::time::Duration;
use tinyrpc_common::{Result, RpcError, SERVERS_HEADER};
use tokio::task::JoinHandle;

use crate::registry::DEFAULT_TIMEOUT;

/// Announces `addr` to the registry at `registry_url` every `interval`.
///
/// A zero `interval` defaults to one second less than the registry's default
/// timeout, so a healthy server never expires. The first announcement is
/// sent before returning and its failure is returned; the background task
/// stops at the first later failure.
pub async fn heartbeat(registry_url: &str, addr: &str, interval: Duration) -> Result<JoinHandle<()>> {
    let interval = if interval.is_zero() {
        DEFAULT_TIMEOUT - Duration::from_secs(1)
    } else {
        interval
    };

    let client = reqwest::Client::new();
    send(&client, registry_url, addr).await?;

    let registry_url = registry_url.to_string();
    let addr = addr.to_string();
    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = send(&client, &registry_url, &addr).await {
                tracing::warn!("rpc server: heartbeat to {} stopped: {}", registry_url, e);
                return;
            }
        }
    }))
}

/// Sends a single announcement of `addr`.
pub async fn send_heartbeat(registry_url: &str, addr: &str) -> Result<()> {
    send(&reqwest::Client::new(), registry_url, addr).await
}

async fn send(client: &reqwest::Client, registry_url: &str, addr: &str) -> Result<()> {
    tracing::debug!("{} send heart beat to registry {}", addr, registry_url);
    client
        .post(registry_url)
        .header(SERVERS_HEADER, addr)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| RpcError::Registry(format!("send heartbeat error: {}", e)))?;
    Ok(())
}
