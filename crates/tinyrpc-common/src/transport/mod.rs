//! tinyrpc Transport Layer
//!
//! This module provides the codecs and the framed connection halves used to
//! exchange calls over any byte stream.
//!
//! # Architecture
//!
//! - **Handshake**: JSON [`Options`](crate::Options) behind a length prefix,
//!   written once by the client
//! - **Codec**: selected by the handshake, encodes headers and bodies
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [payload]`
//!   for the handshake, every header and every body
//!
//! # Components
//!
//! - **[`Codec`]** / **[`CodecType`]**: Encode/decode frames as JSON or postcard
//! - **[`FrameReader`]**: Read half; yields headers and raw bodies
//! - **[`FrameWriter`]**: Write half; writes a header and its body as one unit
//!
//! # Message Size Limits
//!
//! Every frame is limited to 100 MB to prevent memory exhaustion attacks.

pub mod codec;
pub mod framing;

pub use codec::{Codec, CodecType, JsonCodec, PostcardCodec};
pub use framing::{read_frame, read_options, write_options, BoxedReader, BoxedWriter, FrameReader, FrameWriter};
