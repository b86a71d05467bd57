//! The demo `Foo` service served by `tinyrpc server`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tinyrpc_server::Service;

/// Arguments of every `Foo` method.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Args {
    pub num1: i64,
    pub num2: i64,
}

/// `Foo.Sum` adds the two numbers; `Foo.Sleep` waits `num1` seconds first.
pub fn foo_service() -> Service {
    Service::new("Foo")
        .register_method("Sum", |args: Args| async move { Ok::<_, String>(args.num1 + args.num2) })
        .register_method("Sleep", |args: Args| async move {
            if args.num1 < 0 {
                return Err(format!("cannot sleep {} seconds", args.num1));
            }
            tokio::time::sleep(Duration::from_secs(args.num1 as u64)).await;
            Ok(args.num1 + args.num2)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyrpc_common::Codec;

    #[tokio::test]
    async fn test_sum() {
        let codec = Codec::default();
        let sum = foo_service().method("Sum").unwrap();
        let reply = sum.invoke(codec, codec.encode(&Args { num1: 3, num2: 4 }).unwrap()).await.unwrap();
        assert_eq!(codec.decode::<i64>(&reply).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_sleep_rejects_negative_duration() {
        let codec = Codec::default();
        let sleep = foo_service().method("Sleep").unwrap();
        let err = sleep.invoke(codec, codec.encode(&Args { num1: -1, num2: 0 }).unwrap()).await.unwrap_err();
        assert_eq!(err, "cannot sleep -1 seconds");
    }
}
