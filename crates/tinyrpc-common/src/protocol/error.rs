use std::time::Duration;

use thiserror::Error;

/// Every failure a tinyrpc component can report.
///
/// The enum is `Clone` so a single terminal connection error can complete
/// every call that was pending on that connection. Foreign errors (I/O,
/// serde) are therefore carried as their rendered message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(String),

    #[error("Postcard serialization error: {0}")]
    PostcardSerialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid magic number: {0:#x}")]
    InvalidMagicNumber(u32),

    #[error("Invalid codec type: {0}")]
    UnknownCodec(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("request handle timeout: expect within {0:?}")]
    HandleTimeout(Duration),

    #[error("connection is shut down")]
    Shutdown,

    #[error("call failed: {0}")]
    Cancelled(String),

    /// Error string carried back in a response header.
    #[error("{0}")]
    Remote(String),

    #[error("service/method request ill-formed: {0}")]
    IllFormedServiceMethod(String),

    #[error("can't find service {0}")]
    ServiceNotFound(String),

    #[error("can't find method {0}")]
    MethodNotFound(String),

    #[error("service already defined: {0}")]
    ServiceAlreadyDefined(String),

    #[error("wrong format '{0}', expect protocol@addr")]
    InvalidAddress(String),

    #[error("unexpected HTTP response: {0}")]
    UnexpectedHttpResponse(String),

    #[error("no available servers")]
    NoAvailableServers,

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Message too large: {0} bytes (max {1} bytes)")]
    MessageTooLarge(usize, usize),
}

impl RpcError {
    /// Whether this error ended the connection rather than a single call.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_) | RpcError::Connection(_) | RpcError::Shutdown | RpcError::MessageTooLarge(..)
        )
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected => RpcError::Connection(err.to_string()),
            _ => RpcError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::JsonSerialization(err.to_string())
    }
}

impl From<postcard::Error> for RpcError {
    fn from(err: postcard::Error) -> Self {
        RpcError::PostcardSerialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
