//! Component B: a one-shot async value with linked resolve/reject callables.
//! Grounded on the teacher's `CodexCallHandle { response: oneshot::Receiver<..> }`
//! single-fulfillment pattern.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::error::BridgeError;
use crate::value::{native_value_to_display, Callable, NativeValue};

/// Resolve/reject callables plus the future that completes once either one
/// is invoked. Only the first call through either callable has any effect;
/// later calls are silently no-ops, matching the single-fulfillment
/// invariant.
pub struct PromisePair {
    pub resolve: Callable,
    pub reject: Callable,
    pub future: PromiseFuture,
}

pub struct PromiseFuture(oneshot::Receiver<Result<NativeValue, NativeValue>>);

pub fn promise_pair() -> PromisePair {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(AsyncMutex::new(Some(tx)));

    let tx_resolve = tx.clone();
    let resolve = Callable::new(move |mut args: Vec<NativeValue>| {
        let tx = tx_resolve.clone();
        async move {
            let value = if args.is_empty() {
                NativeValue::Null
            } else {
                args.remove(0)
            };
            if let Some(sender) = tx.lock().await.take() {
                let _ = sender.send(Ok(value));
            }
            Ok(NativeValue::Null)
        }
    });

    let tx_reject = tx;
    let reject = Callable::new(move |mut args: Vec<NativeValue>| {
        let tx = tx_reject.clone();
        async move {
            let value = if args.is_empty() {
                NativeValue::Null
            } else {
                args.remove(0)
            };
            if let Some(sender) = tx.lock().await.take() {
                let _ = sender.send(Err(value));
            }
            Ok(NativeValue::Null)
        }
    });

    PromisePair {
        resolve,
        reject,
        future: PromiseFuture(rx),
    }
}

impl PromiseFuture {
    pub async fn wait(self) -> Result<NativeValue, BridgeError> {
        match self.0.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(rejection)) => Err(BridgeError::RemoteCallFailure(native_value_to_display(&rejection))),
            Err(_) => Err(BridgeError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_fulfills_the_future() {
        let pair = promise_pair();
        pair.resolve.call(vec![NativeValue::String("ok".into())]).await.unwrap();
        let value = pair.future.wait().await.unwrap();
        assert!(matches!(value, NativeValue::String(s) if s == "ok"));
    }

    #[tokio::test]
    async fn reject_surfaces_as_remote_call_failure() {
        let pair = promise_pair();
        pair.reject.call(vec![NativeValue::String("boom".into())]).await.unwrap();
        let err = pair.future.wait().await.unwrap_err();
        assert!(matches!(err, BridgeError::RemoteCallFailure(msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn second_fulfillment_is_a_no_op() {
        let pair = promise_pair();
        pair.resolve.call(vec![NativeValue::String("first".into())]).await.unwrap();
        pair.reject.call(vec![NativeValue::String("second".into())]).await.unwrap();
        let value = pair.future.wait().await.unwrap();
        assert!(matches!(value, NativeValue::String(s) if s == "first"));
    }
}
