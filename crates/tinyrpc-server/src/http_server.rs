//! HTTP Endpoint for the tinyrpc Server
//!
//! This module serves a [`Server`] behind HTTP/1 using hyper, so the RPC
//! port can share infrastructure with ordinary web traffic.
//!
//! # Routes
//!
//! - `CONNECT /_tinyrpc_` - answered with `200 Connected to Tiny RPC`; the
//!   connection is then taken over from hyper and served as a plain RPC
//!   connection. Any other method gets `405 must CONNECT`.
//! - `GET /debug/tinyrpc` - plain-text table of services, methods and call
//!   counts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tinyrpc_server::{HttpServer, Server};
//! use tokio::net::TcpListener;
//!
//! # #[tokio::main]
//! # async fn main() -> tinyrpc_common::Result<()> {
//! let server = Arc::new(Server::new());
//! let listener = TcpListener::bind("127.0.0.1:9999").await?;
//! HttpServer::new(server).run(listener).await
//! # }
//! ```

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::ext::ReasonPhrase;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::sync::Arc;
use tinyrpc_common::{Result, CONNECTED_REASON, DEFAULT_DEBUG_PATH, DEFAULT_RPC_PATH};
use tokio::net::TcpListener;

use crate::server::Server;

type HyperResponse = Response<Full<Bytes>>;

/// HTTP front end for a [`Server`].
pub struct HttpServer {
    server: Arc<Server>,
}

impl HttpServer {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }

    /// Serves HTTP on `listener` until accepting fails.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("HTTP server listening on {}", addr);
            tracing::info!("rpc server debug path: {}", DEFAULT_DEBUG_PATH);
        }

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                    return Err(e.into());
                }
            };

            let io = TokioIo::new(stream);
            let server = self.server.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(handle_request(server, req)) }
                });

                // The tunnel reply is exactly the status line and a blank line
                if let Err(err) = http1::Builder::new()
                    .auto_date_header(false)
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    tracing::debug!("Error serving connection: {}", err);
                }
            });
        }
    }
}

impl Server {
    /// Serves this server behind HTTP; see [`HttpServer`].
    pub async fn serve_http(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        HttpServer::new(self).run(listener).await
    }
}

fn handle_request(server: Arc<Server>, req: Request<Incoming>) -> HyperResponse {
    match req.uri().path() {
        DEFAULT_RPC_PATH => handle_connect(server, req),
        DEFAULT_DEBUG_PATH => text_response(StatusCode::OK, debug_page(&server)),
        _ => text_response(StatusCode::NOT_FOUND, "404 page not found\n".to_string()),
    }
}

/// Accepts a `CONNECT` and hands the upgraded connection to the RPC server.
fn handle_connect(server: Arc<Server>, mut req: Request<Incoming>) -> HyperResponse {
    if req.method() != Method::CONNECT {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "405 must CONNECT\n".to_string());
    }

    // Resolves once hyper has written the response below
    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => server.serve_conn(TokioIo::new(upgraded)).await,
            Err(e) => tracing::warn!("rpc hijacking failed: {}", e),
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(CONNECTED_REASON.as_bytes()));
    response
}

fn text_response(status: StatusCode, body: String) -> HyperResponse {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Renders the registered services as a plain-text table.
fn debug_page(server: &Server) -> String {
    let mut page = String::new();
    for service in server.services() {
        let _ = writeln!(page, "Service {}", service.name());
        let _ = writeln!(page, "  {:<24} {:>8}", "Method", "Calls");
        for (name, method) in service.methods() {
            let _ = writeln!(page, "  {:<24} {:>8}", name, method.num_calls());
        }
        page.push('\n');
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Service;
    use tinyrpc_common::Codec;

    #[tokio::test]
    async fn test_debug_page_lists_methods_and_calls() {
        let mut server = Server::new();
        server
            .register(
                Service::new("Foo")
                    .register_method("Sum", |(a, b): (i64, i64)| async move { Ok::<_, String>(a + b) })
                    .register_method("Sleep", |_: u64| async move { Ok::<_, String>(()) }),
            )
            .unwrap();

        let codec = Codec::default();
        let sum = server.find_service("Foo.Sum").unwrap();
        sum.invoke(codec, codec.encode(&(1i64, 2i64)).unwrap()).await.unwrap();

        let page = debug_page(&server);
        let lines: Vec<&str> = page.lines().collect();
        assert_eq!(lines[0], "Service Foo");
        assert!(lines[2].trim_start().starts_with("Sleep"));
        assert!(lines[2].trim_end().ends_with('0'));
        assert!(lines[3].trim_start().starts_with("Sum"));
        assert!(lines[3].trim_end().ends_with('1'));
    }

    #[test]
    fn test_text_response() {
        let response = text_response(StatusCode::METHOD_NOT_ALLOWED, "405 must CONNECT\n".to_string());
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
