//! Service Handler Tables
//!
//! A [`Service`] is a named set of methods. Each method is an async function
//! from a deserializable argument to a serializable reply; registration
//! erases those types so the server can dispatch raw bodies under whatever
//! codec the connection negotiated.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tinyrpc_common::Codec;

/// Outcome of one invocation: the encoded reply or an error message for the
/// response header.
pub type MethodResult = std::result::Result<Vec<u8>, String>;

type Handler = Arc<dyn Fn(Codec, Vec<u8>) -> BoxFuture<'static, MethodResult> + Send + Sync>;

/// One registered method and its call counter.
pub struct MethodType {
    handler: Handler,
    num_calls: AtomicU64,
}

impl MethodType {
    fn new<A, R, F, Fut>(f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, String>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: Handler = Arc::new(move |codec: Codec, args: Vec<u8>| {
            let f = f.clone();
            Box::pin(async move {
                let args: A = codec
                    .decode(&args)
                    .map_err(|e| format!("read argv err: {}", e))?;
                let reply = f(args).await?;
                codec.encode(&reply).map_err(|e| e.to_string())
            }) as BoxFuture<'static, MethodResult>
        });

        Self {
            handler,
            num_calls: AtomicU64::new(0),
        }
    }

    /// Number of times the method has been invoked.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    /// Decodes `args`, runs the method and encodes its reply.
    pub fn invoke(&self, codec: Codec, args: Vec<u8>) -> BoxFuture<'static, MethodResult> {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        (self.handler)(codec, args)
    }
}

/// A named group of methods, addressed on the wire as `Service.Method`.
///
/// # Example
///
/// ```
/// use tinyrpc_server::Service;
///
/// let foo = Service::new("Foo")
///     .register_method("Sum", |(a, b): (i64, i64)| async move { Ok::<_, String>(a + b) });
/// assert!(foo.method("Sum").is_some());
/// ```
pub struct Service {
    name: String,
    methods: BTreeMap<String, Arc<MethodType>>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    /// Adds a method; registering the same name again replaces it.
    pub fn register_method<A, R, F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, String>> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!(service = %self.name, method = %name, "registered method");
        self.methods.insert(name, Arc::new(MethodType::new(f)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<Arc<MethodType>> {
        self.methods.get(name).cloned()
    }

    /// Methods in name order.
    pub fn methods(&self) -> impl Iterator<Item = (&str, &MethodType)> {
        self.methods.iter().map(|(name, method)| (name.as_str(), method.as_ref()))
    }
}
