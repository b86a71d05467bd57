//! Dialing
//!
//! Three ways to get a [`Client`]:
//!
//! - [`dial`] connects over plain TCP
//! - [`dial_http`] first asks an HTTP server to tunnel the connection with
//!   `CONNECT`, then speaks the normal protocol inside the tunnel
//! - [`xdial`] picks one of the above from a `protocol@host:port` address
//!
//! Connecting and the handshake are bounded together by the options'
//! connect timeout; a zero timeout waits forever.

use std::future::Future;
use std::time::Duration;
use tinyrpc_common::{Options, Result, RpcError, CONNECTED, DEFAULT_RPC_PATH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::client::Client;

/// Longest HTTP response head accepted from a tunnel endpoint.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Connects to a tinyrpc server over TCP.
///
/// `None` options mean [`Options::default`].
pub async fn dial(addr: &str, options: Option<Options>) -> Result<Client> {
    let options = Options::normalized(options);
    with_connect_timeout(options.connect_timeout, async {
        let stream = connect(addr).await?;
        Client::new(stream, options.clone()).await
    })
    .await
}

/// Connects to a tinyrpc server served behind HTTP at [`DEFAULT_RPC_PATH`].
pub async fn dial_http(addr: &str, options: Option<Options>) -> Result<Client> {
    let options = Options::normalized(options);
    with_connect_timeout(options.connect_timeout, async {
        let mut stream = connect(addr).await?;
        open_tunnel(&mut stream).await?;
        Client::new(stream, options.clone()).await
    })
    .await
}

/// Connects using an address of the form `protocol@host:port`.
///
/// `http@` addresses go through [`dial_http`], `tcp@` addresses through
/// [`dial`].
///
/// # Example
///
/// ```no_run
/// use tinyrpc_client::xdial;
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let client = xdial("http@127.0.0.1:9999", None).await?;
/// # Ok(())
/// # }
/// ```
pub async fn xdial(rpc_addr: &str, options: Option<Options>) -> Result<Client> {
    let (protocol, addr) = rpc_addr
        .split_once('@')
        .ok_or_else(|| RpcError::InvalidAddress(rpc_addr.to_string()))?;

    match protocol {
        "http" => dial_http(addr, options).await,
        "tcp" => dial(addr, options).await,
        other => Err(RpcError::Connection(format!("unsupported protocol '{}' in {}", other, rpc_addr))),
    }
}

async fn connect(addr: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| RpcError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn with_connect_timeout<F>(timeout: Duration, connecting: F) -> Result<Client>
where
    F: Future<Output = Result<Client>>,
{
    if timeout.is_zero() {
        return connecting.await;
    }
    // Dropping the unfinished future closes the half-open connection
    match tokio::time::timeout(timeout, connecting).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::ConnectTimeout(timeout)),
    }
}

/// Sends the `CONNECT` preamble and checks the server agreed to tunnel.
async fn open_tunnel<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format!("CONNECT {} HTTP/1.0\r\n\r\n", DEFAULT_RPC_PATH);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let head = read_response_head(stream).await?;
    let status_line = head.lines().next().unwrap_or_default();

    // "HTTP/1.x <code> <reason>"
    let status = match status_line.split_once(' ') {
        Some((version, status)) if version.starts_with("HTTP/1.") => status.trim(),
        _ => return Err(RpcError::UnexpectedHttpResponse(status_line.to_string())),
    };

    if status == CONNECTED {
        Ok(())
    } else {
        Err(RpcError::UnexpectedHttpResponse(status.to_string()))
    }
}

/// Reads up to and including the blank line ending an HTTP response head.
///
/// Reads byte by byte so nothing past the head is consumed; the handshake
/// follows immediately on the same stream.
async fn read_response_head<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(RpcError::UnexpectedHttpResponse("response head too large".to_string()));
        }
        head.push(reader.read_u8().await?);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_xdial_rejects_address_without_protocol() {
        let err = xdial("127.0.0.1:9999", None).await.err().unwrap();
        assert_eq!(err, RpcError::InvalidAddress("127.0.0.1:9999".into()));
    }

    #[tokio::test]
    async fn test_xdial_rejects_unknown_protocol() {
        let err = xdial("quic@127.0.0.1:9999", None).await.err().unwrap();
        assert!(matches!(err, RpcError::Connection(_)));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = dial(&addr, None).await.err().unwrap();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_tunnel_accepts_connected_status() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let peer = tokio::spawn(async move {
            let mut buf = [0u8; 32];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"CONNECT /_tinyrpc_ HTTP/1.0\r\n\r\n");
            server
                .write_all(b"HTTP/1.1 200 Connected to Tiny RPC\r\ndate: now\r\n\r\nrest")
                .await
                .unwrap();
            server
        });

        open_tunnel(&mut client).await.unwrap();
        let _server = peer.await.unwrap();

        // Bytes after the head are left for the handshake
        let mut rest = [0u8; 4];
        client.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"rest");
    }

    #[tokio::test]
    async fn test_tunnel_reports_unexpected_status() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 32];
            let _ = server.read(&mut buf).await;
            server.write_all(b"HTTP/1.0 405 Method Not Allowed\r\n\r\n").await.unwrap();
            server
        });

        let err = open_tunnel(&mut client).await.unwrap_err();
        assert_eq!(err, RpcError::UnexpectedHttpResponse("405 Method Not Allowed".into()));
    }

    #[tokio::test]
    async fn test_dial_http_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _accepting = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let options = Options::default().with_connect_timeout(Duration::from_millis(100));
        let err = dial_http(&addr, Some(options)).await.err().unwrap();
        assert_eq!(err, RpcError::ConnectTimeout(Duration::from_millis(100)));
    }
}
