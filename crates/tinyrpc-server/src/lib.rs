//! tinyrpc Server
//!
//! This crate provides the dispatch side of tinyrpc: handler tables
//! ([`Service`]), the connection server ([`Server`]) and its HTTP front end
//! ([`HttpServer`]).
//!
//! # Request Handling
//!
//! - The handshake selects the codec and the per-request handle timeout
//! - Every request is handled in its own task, so a slow method never holds
//!   up the others on the same connection
//! - Responses are serialized by a per-connection write lock
//! - A request naming an unknown service or method gets one error response,
//!   after which the connection stops reading

pub mod http_server;
pub mod server;
pub mod service;

pub use http_server::HttpServer;
pub use server::Server;
pub use service::{MethodResult, MethodType, Service};
