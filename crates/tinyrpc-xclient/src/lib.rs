//! tinyrpc Discovery Client
//!
//! [`XClient`] spreads calls over several tinyrpc servers. Servers are found
//! through a [`Discovery`]: a fixed list ([`MultiServersDiscovery`]) or a
//! registry ([`RegistryDiscovery`]).
//!
//! # Features
//!
//! - **Selection**: random or round robin, per [`SelectMode`]
//! - **Connection pool**: one client per server, redialed when it fails
//! - **Broadcast**: one call to every server, failing fast on the first error

pub mod discovery;
pub mod registry_discovery;
pub mod xclient;

pub use discovery::{Discovery, MultiServersDiscovery, SelectMode};
pub use registry_discovery::{RegistryDiscovery, DEFAULT_REFRESH_INTERVAL};
pub use xclient::XClient;
