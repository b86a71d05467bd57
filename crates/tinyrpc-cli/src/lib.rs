//! # tinyrpc CLI
//!
//! Command-line front end for tinyrpc.
//!
//! ## Key Commands
//!
//! - `tinyrpc registry`: run a registry
//! - `tinyrpc server`: run the demo `Foo` service, optionally heartbeating to
//!   a registry
//! - `tinyrpc call`: call one server chosen from a list or a registry
//! - `tinyrpc broadcast`: call every server at once
//!
//! Arguments and replies travel as JSON, so the client side always uses the
//! JSON codec.

pub mod demo;
