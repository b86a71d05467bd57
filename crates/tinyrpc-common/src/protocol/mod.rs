pub mod constants;
pub mod error;
pub mod header;
pub mod options;


pub use constants::*;
pub use error::{Result, RpcError};
pub use header::{Header, Seq};
pub use options::Options;
