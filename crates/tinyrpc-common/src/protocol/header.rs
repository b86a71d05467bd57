//! tinyrpc Frame Header
//!
//! Every request and every response is a header frame followed by a body
//! frame. The header names the target method, carries the sequence number
//! used to match a response to its call, and reports server-side errors.

use serde::{Deserialize, Serialize};

/// Per-connection sequence number of a call.
pub type Seq = u64;

/// Metadata preceding every body on the wire.
///
/// # Example
///
/// ```
/// use tinyrpc_common::Header;
///
/// let request = Header::request("Foo.Sum", 1);
/// assert!(request.is_ok());
///
/// let failed = Header::error("Foo.Sum", 1, "division by zero");
/// assert!(!failed.is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    /// Target in `Service.Method` form
    pub service_method: String,
    /// Sequence number chosen by the client
    pub seq: Seq,
    /// Error message; empty on success
    pub error: String,
}

impl Header {
    pub fn request(service_method: impl Into<String>, seq: Seq) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    pub fn error(service_method: impl Into<String>, seq: Seq, error: impl Into<String>) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: error.into(),
        }
    }

    /// Whether this header reports success.
    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}
