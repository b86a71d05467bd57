//! tinyrpc Handshake Options
//!
//! This module defines the one-time negotiation payload a client sends when it
//! opens a connection.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::constants::MAGIC_NUMBER;
use super::error::{Result, RpcError};
use crate::transport::CodecType;

/// Default time allowed for dialing plus the handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake options, sent once per connection before any frame.
///
/// # Wire Format
///
/// The options travel as a JSON object behind a 4-byte big-endian length
/// prefix. Durations are integer nanoseconds:
///
/// ```text
/// {"MagicNumber":3927900,"CodecType":"application/json","ConnectTimeout":10000000000,"HandleTimeout":0}
/// ```
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tinyrpc_common::{CodecType, Options};
///
/// let options = Options::default()
///     .with_codec(CodecType::Postcard)
///     .with_handle_timeout(Duration::from_secs(1));
/// assert_eq!(options.codec_type, "application/postcard");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Options {
    /// Marks the connection as a tinyrpc connection
    #[serde(rename = "MagicNumber")]
    pub magic_number: u32,
    /// Codec identifier used for every frame after the handshake
    #[serde(rename = "CodecType", default)]
    pub codec_type: String,
    /// Bound on dialing plus the handshake; zero waits forever
    #[serde(rename = "ConnectTimeout", with = "duration_nanos", default)]
    pub connect_timeout: Duration,
    /// Bound on each request's handling on the server; zero waits forever
    #[serde(rename = "HandleTimeout", with = "duration_nanos", default)]
    pub handle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: CodecType::Json.as_str().to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

impl Options {
    pub fn with_codec(mut self, codec_type: CodecType) -> Self {
        self.codec_type = codec_type.as_str().to_string();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    /// Resolves caller-supplied options into the ones actually sent.
    ///
    /// `None` yields the defaults. The magic number is always forced to
    /// [`MAGIC_NUMBER`] and an empty codec falls back to JSON.
    pub fn normalized(options: Option<Options>) -> Options {
        let Some(mut options) = options else {
            return Options::default();
        };
        options.magic_number = MAGIC_NUMBER;
        if options.codec_type.is_empty() {
            options.codec_type = CodecType::Json.as_str().to_string();
        }
        options
    }

    /// Checks the options a server received against its own protocol.
    pub fn validate(&self) -> Result<CodecType> {
        if self.magic_number != MAGIC_NUMBER {
            return Err(RpcError::InvalidMagicNumber(self.magic_number));
        }
        self.codec_type.parse()
    }
}

mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}
