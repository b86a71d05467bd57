use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tinyrpc_common::transport::write_options;
use tinyrpc_common::{
    Codec, CodecType, Context, FrameReader, FrameWriter, Header, Options, Result, RpcError, Seq,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::call::{Call, PendingCall};

/// Bookkeeping shared between callers and the receive task.
struct ClientState {
    /// Next sequence number to hand out
    seq: Seq,
    /// Calls waiting for a response, by sequence number
    pending: HashMap<Seq, Call>,
    /// Set by `close`
    closing: bool,
    /// Set when the receive loop hit a connection error
    shutdown: bool,
}

impl ClientState {
    fn new() -> Self {
        Self {
            seq: 1,
            pending: HashMap::new(),
            closing: false,
            shutdown: false,
        }
    }
}

/// tinyrpc client for one connection.
///
/// Any number of calls may be outstanding at once; responses are matched to
/// their calls by sequence number, so they can complete in any order. Once
/// the client is closed or its connection fails it stays unavailable; a new
/// client must be dialed.
///
/// # Example
///
/// ```no_run
/// use tinyrpc_client::dial;
/// use tinyrpc_common::Context;
///
/// # #[tokio::main]
/// # async fn main() -> tinyrpc_common::Result<()> {
/// let client = dial("127.0.0.1:9999", None).await?;
/// let sum: i64 = client.call(&Context::background(), "Foo.Sum", &(3, 4)).await?;
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    codec: Codec,
    state: Arc<Mutex<ClientState>>,
    /// Serializes writers so header/body pairs never interleave
    sending: Mutex<FrameWriter>,
    /// Cancelled by `close`; releases writers stuck on a peer that stopped reading
    closed: CancellationToken,
    receiver: JoinHandle<()>,
}

impl Client {
    /// Sends the handshake over `stream` and starts receiving responses.
    ///
    /// `options` are sent as given; dialers normalize them first.
    pub async fn new<S>(mut stream: S, options: Options) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let codec_type: CodecType = options.codec_type.parse()?;
        write_options(&mut stream, &options).await?;

        let codec = Codec::new(codec_type);
        let (reader, writer) = tokio::io::split(stream);
        let state = Arc::new(Mutex::new(ClientState::new()));
        let receiver = tokio::spawn(receive(state.clone(), FrameReader::new(Box::new(reader), codec)));

        Ok(Self {
            codec,
            state,
            sending: Mutex::new(FrameWriter::new(Box::new(writer), codec)),
            closed: CancellationToken::new(),
            receiver,
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Whether the client can still issue calls.
    pub async fn is_available(&self) -> bool {
        let state = self.state.lock().await;
        !state.closing && !state.shutdown
    }

    /// Closes the connection.
    ///
    /// Every call still pending fails with [`RpcError::Shutdown`]. Closing an
    /// already closed client returns that same error. A write blocked on an
    /// unresponsive peer is abandoned, so closing never waits on the peer.
    pub async fn close(&self) -> Result<()> {
        let pending = {
            let mut state = self.state.lock().await;
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
            std::mem::take(&mut state.pending)
        };

        self.closed.cancel();
        for call in pending.into_values() {
            call.complete(Err(RpcError::Shutdown));
        }
        self.receiver.abort();
        self.sending.lock().await.close().await
    }

    /// Submits a call without waiting for its response.
    ///
    /// Fails immediately only if `args` cannot be encoded; every other failure
    /// is reported by [`PendingCall::wait`].
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> Result<PendingCall<R>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.submit(&Context::background(), service_method, args).await
    }

    /// Invokes `service_method` and waits for its reply or for `ctx` to end.
    ///
    /// When `ctx` ends first the call is forgotten locally and a
    /// [`RpcError::Cancelled`] is returned; the server is not told, and a
    /// late response is discarded.
    pub async fn call<A, R>(&self, ctx: &Context, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let mut pending: PendingCall<R> = self.submit(ctx, service_method, args).await?;
        let seq = pending.seq();
        let codec = pending.codec();

        tokio::select! {
            result = pending.done_mut() => {
                let body = result.map_err(|_| RpcError::Shutdown)??;
                codec.decode(&body)
            }
            err = ctx.done() => {
                self.remove_call(seq).await;
                Err(err)
            }
        }
    }

    async fn submit<A, R>(&self, ctx: &Context, service_method: &str, args: &A) -> Result<PendingCall<R>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let args = self.codec.encode(args)?;
        let (call, done) = Call::new(service_method, args);
        let seq = self.send(call, ctx).await;
        Ok(PendingCall::new(seq, self.codec, done))
    }

    /// Registers `call` and writes it; returns its sequence number.
    ///
    /// Waiting for the write half ends early if `ctx` ends or the client is
    /// closed; the call is then completed with that error and never sent.
    async fn send(&self, mut call: Call, ctx: &Context) -> Seq {
        let mut writer = tokio::select! {
            writer = self.sending.lock() => writer,
            err = ctx.done() => {
                call.complete(Err(err));
                return 0;
            }
            _ = self.closed.cancelled() => {
                call.complete(Err(RpcError::Shutdown));
                return 0;
            }
        };

        // The pending table only needs the completion slot
        let args = std::mem::take(&mut call.args);
        let mut header = Header::request(call.service_method.clone(), 0);

        header.seq = match self.register_call(call).await {
            Ok(seq) => seq,
            Err(call) => {
                call.complete(Err(RpcError::Shutdown));
                return 0;
            }
        };

        // Once started, a frame is only abandoned when the connection goes away
        let written = tokio::select! {
            result = writer.write(&header, &args) => result,
            _ = self.closed.cancelled() => Err(RpcError::Shutdown),
        };
        if let Err(err) = written {
            tracing::debug!(seq = header.seq, error = %err, "failed to send call");
            if let Some(call) = self.remove_call(header.seq).await {
                call.complete(Err(err));
            }
        }
        header.seq
    }

    async fn register_call(&self, mut call: Call) -> std::result::Result<Seq, Call> {
        let mut state = self.state.lock().await;
        if state.closing || state.shutdown {
            return Err(call);
        }
        call.seq = state.seq;
        state.seq += 1;
        let seq = call.seq;
        state.pending.insert(seq, call);
        Ok(seq)
    }

    async fn remove_call(&self, seq: Seq) -> Option<Call> {
        self.state.lock().await.pending.remove(&seq)
    }

    #[cfg(test)]
    async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Reads responses until the connection fails, completing matching calls.
async fn receive(state: Arc<Mutex<ClientState>>, mut reader: FrameReader) {
    let err = loop {
        let header = match reader.read_header().await {
            Ok(header) => header,
            Err(err) => break err,
        };

        let call = state.lock().await.pending.remove(&header.seq);
        let result = match call {
            // Cancelled or unknown; the body still has to be consumed
            None => reader.discard_body().await,
            Some(call) if !header.is_ok() => {
                call.complete(Err(RpcError::Remote(header.error)));
                reader.discard_body().await
            }
            Some(call) => match reader.read_body().await {
                Ok(body) => {
                    call.complete(Ok(body));
                    Ok(())
                }
                Err(err) => {
                    call.complete(Err(RpcError::Connection(format!("read body error: {}", err))));
                    Err(err)
                }
            },
        };

        if let Err(err) = result {
            break err;
        }
    };

    terminate_calls(&state, err).await;
}

/// Marks the client shut down and fails every pending call with `err`.
async fn terminate_calls(state: &Mutex<ClientState>, err: RpcError) {
    let pending = {
        let mut state = state.lock().await;
        state.shutdown = true;
        std::mem::take(&mut state.pending)
    };

    if !pending.is_empty() {
        tracing::debug!(count = pending.len(), error = %err, "connection lost with calls pending");
    }
    for call in pending.into_values() {
        call.complete(Err(err.clone()));
    }
}
