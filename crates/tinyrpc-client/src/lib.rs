//! tinyrpc Client
//!
//! A [`Client`] owns one connection and multiplexes any number of concurrent
//! calls over it. Responses are matched to calls by sequence number, so a
//! slow call never blocks a fast one.
//!
//! # Dialing
//!
//! - [`dial`] - plain TCP
//! - [`dial_http`] - through an HTTP `CONNECT` tunnel
//! - [`xdial`] - either, chosen by a `protocol@host:port` address
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tinyrpc_client::dial;
//! use tinyrpc_common::{CodecType, Context, Options};
//!
//! # #[tokio::main]
//! # async fn main() -> tinyrpc_common::Result<()> {
//! let options = Options::default().with_codec(CodecType::Postcard);
//! let client = dial("127.0.0.1:9999", Some(options)).await?;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(1));
//! let sum: i64 = client.call(&ctx, "Foo.Sum", &(3i64, 4i64)).await?;
//! assert_eq!(sum, 7);
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod client;
pub mod dial;

pub use call::{Call, CallResult, PendingCall};
pub use client::Client;
pub use dial::{dial, dial_http, xdial};
