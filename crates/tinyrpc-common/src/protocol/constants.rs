//! Wire-level constants shared by every tinyrpc component.

/// Marks a connection as speaking the tinyrpc protocol.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// HTTP path the tunnel endpoint accepts `CONNECT` on.
pub const DEFAULT_RPC_PATH: &str = "/_tinyrpc_";

/// HTTP path of the plain-text service listing.
pub const DEFAULT_DEBUG_PATH: &str = "/debug/tinyrpc";

/// HTTP path the registry is mounted on.
pub const DEFAULT_REGISTRY_PATH: &str = "/_tinyrpc_/registry";

/// Reason phrase the tunnel endpoint answers a `CONNECT` with.
pub const CONNECTED_REASON: &str = "Connected to Tiny RPC";

/// Status code and reason, as they appear on the tunnel's status line.
pub const CONNECTED: &str = "200 Connected to Tiny RPC";

/// Header carrying server addresses to and from the registry.
pub const SERVERS_HEADER: &str = "X-Tinyrpc-Servers";

/// Upper bound for a single frame (handshake, header or body).
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;
