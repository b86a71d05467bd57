use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::protocol::error::{Result, RpcError};

/// Identifier of a codec, as negotiated in the handshake.
///
/// # Example
///
/// ```
/// use tinyrpc_common::CodecType;
///
/// let codec_type: CodecType = "application/postcard".parse().unwrap();
/// assert_eq!(codec_type, CodecType::Postcard);
/// assert!("application/gob".parse::<CodecType>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// Self-describing JSON
    Json,
    /// Compact, schema-driven postcard
    Postcard,
}

impl CodecType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecType::Json => "application/json",
            CodecType::Postcard => "application/postcard",
        }
    }
}

impl FromStr for CodecType {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "application/json" => Ok(CodecType::Json),
            "application/postcard" => Ok(CodecType::Postcard),
            other => Err(RpcError::UnknownCodec(other.to_string())),
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codec for encoding/decoding frame headers and bodies
///
/// The variant is chosen per connection from the handshake's codec type.
/// Both sides of a connection use the same codec for every frame.
///
/// # Example
///
/// ```
/// use tinyrpc_common::{Codec, CodecType};
///
/// let codec = Codec::new(CodecType::Postcard);
///
/// let encoded = codec.encode(&(3i64, 4i64)).unwrap();
/// let decoded: (i64, i64) = codec.decode(&encoded).unwrap();
/// assert_eq!(decoded, (3, 4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json(JsonCodec),
    Postcard(PostcardCodec),
}

impl Codec {
    /// Builds the codec registered under `codec_type`.
    pub fn new(codec_type: CodecType) -> Self {
        match codec_type {
            CodecType::Json => Codec::Json(JsonCodec),
            CodecType::Postcard => Codec::Postcard(PostcardCodec),
        }
    }

    pub fn codec_type(&self) -> CodecType {
        match self {
            Codec::Json(_) => CodecType::Json,
            Codec::Postcard(_) => CodecType::Postcard,
        }
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json(_) => JsonCodec::encode(value),
            Codec::Postcard(_) => PostcardCodec::encode(value),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Json(_) => JsonCodec::decode(data),
            Codec::Postcard(_) => PostcardCodec::decode(data),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(CodecType::Json)
    }
}

/// JSON codec
///
/// Readable on the wire and tolerant of schema drift between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Postcard codec
///
/// Compact binary encoding. Not self-describing: both peers must agree on
/// the argument and reply types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostcardCodec;

impl PostcardCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}
