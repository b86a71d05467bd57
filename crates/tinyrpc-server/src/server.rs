use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tinyrpc_common::transport::read_options;
use tinyrpc_common::{Codec, FrameReader, FrameWriter, Header, Result, RpcError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::service::{MethodType, Service};

/// Write half of a connection, shared by every in-flight request on it.
type Sending = Arc<Mutex<FrameWriter>>;

/// tinyrpc server.
///
/// Holds the registered services and serves connections: plain TCP through
/// [`accept`](Self::accept), or any already-open stream through
/// [`serve_conn`](Self::serve_conn).
///
/// Requests on one connection are handled concurrently, each in its own
/// task; responses are written whole, one at a time, in completion order.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tinyrpc_server::{Server, Service};
/// use tokio::net::TcpListener;
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let mut server = Server::new();
/// server.register(
///     Service::new("Foo").register_method("Sum", |(a, b): (i64, i64)| async move { Ok::<_, String>(a + b) }),
/// )?;
///
/// let listener = TcpListener::bind("127.0.0.1:9999").await?;
/// Arc::new(server).accept(listener).await
/// # }
/// ```
#[derive(Default)]
pub struct Server {
    services: BTreeMap<String, Arc<Service>>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a service under its name.
    pub fn register(&mut self, service: Service) -> Result<()> {
        let name = service.name().to_string();
        if self.services.contains_key(&name) {
            return Err(RpcError::ServiceAlreadyDefined(name));
        }
        tracing::info!(service = %name, "registered service");
        self.services.insert(name, Arc::new(service));
        Ok(())
    }

    /// Registered services in name order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values().map(|service| service.as_ref())
    }

    /// Resolves `Service.Method`, splitting on the last `.`.
    pub fn find_service(&self, service_method: &str) -> Result<Arc<MethodType>> {
        let (service_name, method_name) = service_method
            .rsplit_once('.')
            .ok_or_else(|| RpcError::IllFormedServiceMethod(service_method.to_string()))?;

        let service = self
            .services
            .get(service_name)
            .ok_or_else(|| RpcError::ServiceNotFound(service_name.to_string()))?;

        service
            .method(method_name)
            .ok_or_else(|| RpcError::MethodNotFound(method_name.to_string()))
    }

    /// Serves every connection accepted on `listener`, each in its own task.
    ///
    /// Returns only when accepting fails.
    pub async fn accept(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("RPC server listening on {}", addr);
        }

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                    return Err(e.into());
                }
            };

            tracing::debug!("Connection established from {}", peer_addr);
            let _ = stream.set_nodelay(true);

            let server = self.clone();
            tokio::spawn(async move { server.serve_conn(stream).await });
        }
    }

    /// Serves one connection: reads the handshake, then requests until the
    /// peer goes away.
    ///
    /// A bad handshake (wrong magic number, unknown codec, malformed options)
    /// drops the connection without a response.
    pub async fn serve_conn<S>(self: Arc<Self>, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let options = match read_options(&mut stream).await {
            Ok(options) => options,
            Err(e) => {
                tracing::warn!("rpc server: options error: {}", e);
                return;
            }
        };

        let codec = match options.validate() {
            Ok(codec_type) => Codec::new(codec_type),
            Err(e) => {
                tracing::warn!("rpc server: rejected handshake: {}", e);
                return;
            }
        };

        let (reader, writer) = tokio::io::split(stream);
        self.serve_codec(
            FrameReader::new(Box::new(reader), codec),
            FrameWriter::new(Box::new(writer), codec),
            options.handle_timeout,
        )
        .await;
    }

    async fn serve_codec(&self, mut reader: FrameReader, writer: FrameWriter, timeout: Duration) {
        let sending: Sending = Arc::new(Mutex::new(writer));
        let mut in_flight = JoinSet::new();

        loop {
            let header = match reader.read_header().await {
                Ok(header) => header,
                Err(e) => {
                    if !e.is_connection_error() {
                        tracing::warn!("rpc server: read header error: {}", e);
                    }
                    break;
                }
            };

            let args = match reader.read_body().await {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!("rpc server: read body error: {}", e);
                    break;
                }
            };

            let method = match self.find_service(&header.service_method) {
                Ok(method) => method,
                Err(e) => {
                    // One error response, then the connection stops reading
                    tracing::debug!(seq = header.seq, "rpc server: dispatch error: {}", e);
                    let failed = Header::error(header.service_method, header.seq, e.to_string());
                    send_response(&sending, &failed, None).await;
                    break;
                }
            };

            tracing::debug!(seq = header.seq, method = %header.service_method, "dispatching request");
            in_flight.spawn(handle_request(sending.clone(), reader.codec(), header, method, args, timeout));

            // Reap finished requests so the set does not grow with the connection
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
    }
}

/// Runs one request and writes exactly one response for it.
///
/// The invocation runs in its own task. With a non-zero `timeout` the wait is
/// bounded: on expiry a timeout response is written and the invocation is
/// left to finish on its own, its result discarded.
async fn handle_request(
    sending: Sending,
    codec: Codec,
    header: Header,
    method: Arc<MethodType>,
    args: Vec<u8>,
    timeout: Duration,
) {
    let invocation = tokio::spawn(method.invoke(codec, args));

    let outcome = if timeout.is_zero() {
        invocation.await
    } else {
        match tokio::time::timeout(timeout, invocation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!(seq = header.seq, "rpc server: request handle timeout");
                let failed = Header::error(header.service_method, header.seq, RpcError::HandleTimeout(timeout).to_string());
                send_response(&sending, &failed, None).await;
                return;
            }
        }
    };

    match outcome {
        Ok(Ok(reply)) => send_response(&sending, &header, Some(&reply)).await,
        Ok(Err(message)) => {
            let failed = Header::error(header.service_method, header.seq, message);
            send_response(&sending, &failed, None).await;
        }
        Err(e) => {
            tracing::error!(seq = header.seq, "rpc server: handler failed: {}", e);
            let failed = Header::error(header.service_method, header.seq, format!("handler failed: {}", e));
            send_response(&sending, &failed, None).await;
        }
    }
}

/// Writes one response; `None` sends the placeholder body used for errors.
async fn send_response(sending: &Mutex<FrameWriter>, header: &Header, body: Option<&[u8]>) {
    let mut writer = sending.lock().await;
    let placeholder;
    let body = match body {
        Some(body) => body,
        None => {
            placeholder = writer.codec().encode(&()).unwrap_or_default();
            &placeholder
        }
    };

    if let Err(e) = writer.write(header, body).await {
        tracing::warn!(seq = header.seq, "rpc server: send response error: {}", e);
    }
}
