//! tinyrpc Registry
//!
//! A minimal service registry: servers announce themselves with periodic
//! heartbeats and clients ask for the addresses that are still alive.
//!
//! # Protocol
//!
//! Both directions use plain HTTP on [`DEFAULT_REGISTRY_PATH`](tinyrpc_common::DEFAULT_REGISTRY_PATH)
//! and the `X-Tinyrpc-Servers` header:
//!
//! - `POST` with the header set to one `protocol@addr` registers or refreshes
//!   that server
//! - `GET` answers with the header set to the comma-separated live addresses
//!
//! # Components
//!
//! - [`Registry`] - address bookkeeping with expiry
//! - [`RegistryServer`] - the HTTP surface, built on axum
//! - [`heartbeat`] - the server-side announcer, built on reqwest

pub mod heartbeat;
pub mod http_server;
pub mod registry;

pub use heartbeat::{heartbeat, send_heartbeat};
pub use http_server::RegistryServer;
pub use registry::{Registry, ServerItem, DEFAULT_TIMEOUT};
