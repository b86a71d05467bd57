use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tinyrpc_common::{Codec, Result, RpcError, Seq};
use tokio::sync::oneshot;

/// Encoded reply of a call, or the error that completed it.
pub type CallResult = Result<Vec<u8>>;

/// One outstanding invocation, as tracked by the client's pending table.
///
/// A call is completed exactly once: [`complete`](Self::complete) consumes
/// it, so a response, a connection failure and a cancellation can never
/// all deliver to the same caller.
#[derive(Debug)]
pub struct Call {
    /// Sequence number, assigned when the call is registered
    pub seq: Seq,
    /// Target in `Service.Method` form
    pub service_method: String,
    /// Encoded arguments; moved onto the wire when the call is sent
    pub args: Vec<u8>,
    done: oneshot::Sender<CallResult>,
}

impl Call {
    pub fn new(service_method: impl Into<String>, args: Vec<u8>) -> (Self, oneshot::Receiver<CallResult>) {
        let (done, rx) = oneshot::channel();
        let call = Self {
            seq: 0,
            service_method: service_method.into(),
            args,
            done,
        };
        (call, rx)
    }

    pub(crate) fn complete(self, result: CallResult) {
        // The caller may have stopped waiting (cancelled context)
        if self.done.send(result).is_err() {
            tracing::trace!(seq = self.seq, "call completed after its caller went away");
        }
    }
}

/// Handle to a call submitted with [`Client::go`](crate::Client::go).
///
/// Awaiting [`wait`](Self::wait) yields the decoded reply.
pub struct PendingCall<R> {
    seq: Seq,
    codec: Codec,
    done: oneshot::Receiver<CallResult>,
    _reply: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> PendingCall<R> {
    pub(crate) fn new(seq: Seq, codec: Codec, done: oneshot::Receiver<CallResult>) -> Self {
        Self {
            seq,
            codec,
            done,
            _reply: PhantomData,
        }
    }

    /// Sequence number the call was registered under (0 if it never was).
    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub async fn wait(self) -> Result<R> {
        let body = self.done.await.map_err(|_| RpcError::Shutdown)??;
        self.codec.decode(&body)
    }

    pub(crate) fn done_mut(&mut self) -> &mut oneshot::Receiver<CallResult> {
        &mut self.done
    }

    pub(crate) fn codec(&self) -> Codec {
        self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyrpc_common::CodecType;

    #[tokio::test]
    async fn test_complete_delivers_once() {
        let (call, rx) = Call::new("Foo.Sum", vec![]);
        let codec = Codec::new(CodecType::Json);
        let pending: PendingCall<i64> = PendingCall::new(1, codec, rx);

        call.complete(Ok(codec.encode(&7i64).unwrap()));
        assert_eq!(pending.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_error_completion() {
        let (call, rx) = Call::new("Foo.Sum", vec![]);
        let pending: PendingCall<i64> = PendingCall::new(1, Codec::default(), rx);

        call.complete(Err(RpcError::Remote("boom".into())));
        assert_eq!(pending.wait().await.unwrap_err(), RpcError::Remote("boom".into()));
    }

    #[tokio::test]
    async fn test_dropped_call_reads_as_shutdown() {
        let (call, rx) = Call::new("Foo.Sum", vec![]);
        let pending: PendingCall<i64> = PendingCall::new(1, Codec::default(), rx);

        drop(call);
        assert_eq!(pending.wait().await.unwrap_err(), RpcError::Shutdown);
    }

    #[test]
    fn test_complete_after_receiver_dropped_is_silent() {
        let (call, rx) = Call::new("Foo.Sum", vec![]);
        drop(rx);
        call.complete(Ok(vec![]));
    }
}
