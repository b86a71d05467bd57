//! tinyrpc Common Types and Transport
//!
//! This crate provides the wire protocol, the pluggable codecs and the
//! length-prefixed framing shared by the tinyrpc client and server.
//!
//! # Overview
//!
//! A tinyrpc connection starts with a one-time handshake, followed by any
//! number of request/response frame pairs:
//!
//! - **Handshake**: `[4-byte length prefix as u32 big-endian] + [JSON Options]`
//! - **Per call**: one header frame followed by one body frame, each
//!   `[4-byte length prefix as u32 big-endian] + [codec payload]`
//! - **Max Frame Size**: 100 MB (prevents memory exhaustion)
//!
//! # Components
//!
//! - [`protocol`] - Handshake options, frame headers, errors and wire constants
//! - [`transport`] - Codecs and the framed reader/writer halves
//! - [`context`] - Cancellation and deadlines for in-flight calls
//!
//! # Example
//!
//! ```
//! use tinyrpc_common::{Codec, CodecType, Header};
//!
//! let codec = Codec::new(CodecType::Json);
//! let header = Header::request("Foo.Sum", 1);
//!
//! let encoded = codec.encode(&header).unwrap();
//! let decoded: Header = codec.decode(&encoded).unwrap();
//! assert_eq!(header, decoded);
//! ```

pub mod context;
pub mod protocol;
pub mod transport;

pub use context::Context;
pub use protocol::*;
pub use transport::{BoxedReader, BoxedWriter, Codec, CodecType, FrameReader, FrameWriter};
