//! Component G: connection lifecycle. Grounded on the teacher's
//! `mcp/jsonrpc.rs` `JsonRpcTransport` (spawn/initialize sequencing,
//! `tasks: Vec<JoinHandle<()>>`, teardown on drop) and, for the protocol's
//! own init/exit semantics, on `worker_template.py`'s `wait_forever`/
//! `default_exit`/`exit`.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;
use crate::dispatcher::{Dispatcher, DispatcherState, WorkItem};
use crate::envelope::Envelope;
use crate::error::BridgeError;
use crate::transport::{OutboundSink, TransportHandle};
use crate::value::{decode_wrapped, encode_args, CodecContext, NativeValue};

/// Default worker-runner pool size, matching the original's hard-coded
/// `range(10)` in `wait_forever`. [`WorkerConfig::workers`] overrides it.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Owns the connection's shared state (codec context, interface registry,
/// dispatcher state) and drives its lifecycle: handshake, the dispatch
/// loop, and graceful or forced exit.
pub struct LifecycleController {
    ctx: CodecContext,
    config: WorkerConfig,
    state: Arc<DispatcherState>,
}

impl LifecycleController {
    /// Connects to the host over `transport`, emitting the `initialized`
    /// handshake envelope before returning.
    pub async fn connect(config: WorkerConfig, transport: &TransportHandle) -> Result<Self, BridgeError> {
        std::fs::create_dir_all(&config.work_dir)?;
        let outbound = OutboundSink(transport.outbound.clone());
        let ctx = CodecContext::new(outbound.clone(), false);
        outbound.send(Envelope::Initialized { dedicated_thread: true })?;
        tracing::info!(channel = %config.channel_name(), "worker initialized");
        Ok(LifecycleController {
            ctx,
            config,
            state: Arc::new(DispatcherState::new()),
        })
    }

    pub fn context(&self) -> &CodecContext {
        &self.ctx
    }

    /// Installs the exported API and announces it to the host via a
    /// `setInterface` envelope, following `send_interface`.
    pub async fn set_interface(&self, api: NativeValue) -> Result<(), BridgeError> {
        let default_exit = default_exit_callable(self.state.clone());
        self.ctx.interface.lock().await.set_interface(api, default_exit)?;
        let descriptor = self.ctx.interface.lock().await.descriptor();
        self.ctx.outbound.send(Envelope::SetInterface { api: descriptor })
    }

    /// Runs the dispatch loop until aborted: this task reads envelopes off
    /// `inbound` and routes them through the dispatcher while `worker_count`
    /// spawned tasks drain the resulting work queue, handling `method`/
    /// `callback` items internally and forwarding `execute`/`message`
    /// payloads to `on_task`. If `inbound` closes without a prior
    /// `disconnect` envelope and the connection isn't a daemon, this forces
    /// an exit via [`LifecycleController::force_exit`].
    pub async fn wait_forever<F, Fut>(
        self,
        mut inbound: mpsc::UnboundedReceiver<Envelope>,
        on_task: F,
    ) -> Result<(), BridgeError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BridgeError>> + Send + 'static,
    {
        let worker_count = self.config.workers.max(1);
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let work_rx = Arc::new(AsyncMutex::new(work_rx));
        let dispatcher = Dispatcher::new(
            work_tx,
            self.ctx.outbound.clone(),
            self.ctx.interface.clone(),
            self.state.clone(),
        );

        let on_task = Arc::new(on_task);
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(worker_count + 1);

        for _ in 0..worker_count {
            let work_rx = work_rx.clone();
            let ctx = self.ctx.clone();
            let state = self.state.clone();
            let on_task = on_task.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if state.is_aborted() {
                        break;
                    }
                    let item = work_rx.lock().await.recv().await;
                    let Some(item) = item else { break };
                    state.note_dequeued();
                    if let Err(err) = handle_work_item(&ctx, item, on_task.as_ref()).await {
                        tracing::warn!(error = %err, "worker runner task failed");
                    }
                }
            }));
        }

        // Run on this task rather than a spawned one so it can borrow `self`
        // directly to reach `force_exit` on transport loss.
        while let Some(envelope) = inbound.recv().await {
            if let Err(err) = dispatcher.route(envelope).await {
                tracing::warn!(error = %err, "failed to route envelope");
            }
            if self.state.is_aborted() {
                break;
            }
        }
        if !self.state.is_aborted() {
            tracing::warn!("transport closed without a disconnect envelope");
            if !self.config.daemon {
                self.force_exit(1).await;
            }
        }

        // Drop the dispatcher (and its `work_tx` sender) before joining the
        // worker runners: they block on `work_rx.recv()`, which only returns
        // `None` once every sender is gone.
        drop(dispatcher);
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Forced exit for a transport loss when the connection is not a
    /// daemon: invokes the user's `exit` slot (if any) best-effort, then
    /// terminates the process with `code`. Unlike the composed `exit` slot
    /// (which always terminates with status 0, matching the original's
    /// `default_exit`), this path honors the requested status.
    pub async fn force_exit(&self, code: i32) -> ! {
        if let Some(exit) = self.ctx.interface.lock().await.get("exit") {
            let _ = exit.call(Vec::new()).await;
        }
        tracing::info!(code, "forcing worker exit");
        self.state.abort();
        std::process::exit(code);
    }
}

fn default_exit_callable(state: Arc<DispatcherState>) -> crate::value::Callable {
    crate::value::Callable::new(move |_args| {
        let state = state.clone();
        async move {
            tracing::info!("default exit handler terminating worker");
            state.abort();
            std::process::exit(0);
        }
    })
}

async fn handle_work_item<F, Fut>(ctx: &CodecContext, item: WorkItem, on_task: &F) -> Result<(), BridgeError>
where
    F: Fn(Value) -> Fut,
    Fut: Future<Output = Result<(), BridgeError>>,
{
    match item {
        WorkItem::Execute(code) => on_task(code).await,
        WorkItem::Message(data) => on_task(data).await,
        WorkItem::Method { name, pid, args, promise } => {
            let target = if let Some(pid) = &pid {
                ctx.plugin_interfaces.lock().await.get(pid, &name)
            } else {
                ctx.interface.lock().await.get(&name)
            };
            let Some(target) = target else {
                return reply_to_promise(ctx, promise, Err(format!("no method named {name}"))).await;
            };
            let decoded_args = decode_wrapped(ctx, &args, None, false).await?;
            let result = target.call(decoded_args).await;
            reply_to_promise(ctx, promise, result.map_err(|e| e.to_string())).await
        }
        WorkItem::Callback { id, num, args, promise } => {
            let target = ctx.reference_store.fetch(num).await?;
            let decoded_args = decode_wrapped(ctx, &args, id, false).await?;
            let result = target.call(decoded_args).await;
            reply_to_promise(ctx, promise, result.map_err(|e| e.to_string())).await
        }
    }
}

/// Resolves or rejects the `[resolve, reject]` promise pair embedded in an
/// incoming call, if one was sent; fire-and-forget calls (no `promise`
/// field) are simply dropped once their side effect has run.
async fn reply_to_promise(
    ctx: &CodecContext,
    promise: Option<crate::value::Wrapped>,
    result: Result<NativeValue, String>,
) -> Result<(), BridgeError> {
    let Some(promise) = promise else { return Ok(()) };
    let decoded = decode_wrapped(ctx, &promise, None, false).await?;
    let [resolve, reject] = <[NativeValue; 2]>::try_from(decoded).map_err(|_| {
        BridgeError::ApiShape("promise field must decode to exactly [resolve, reject]".to_string())
    })?;
    match result {
        Ok(value) => {
            if let NativeValue::Callable(resolve) = resolve {
                resolve.call(vec![value]).await?;
            }
        }
        Err(message) => {
            if let NativeValue::Callable(reject) = reject {
                reject.call(vec![NativeValue::Error(message)]).await?;
            }
        }
    }
    Ok(())
}

/// Builds the host-facing `plugin_api` wrapper value for a mapping of
/// callables scoped to a plugin id; a thin convenience over
/// `NativeValue::PluginApi` for callers assembling a multi-plugin export.
pub fn plugin_api(id: impl Into<String>, members: Vec<(String, NativeValue)>) -> NativeValue {
    NativeValue::PluginApi { id: id.into(), members }
}

/// Convenience used by callers assembling arguments to send as a method call
/// payload; re-exported here so embedders don't need to reach into
/// `crate::value` directly for this one helper.
pub async fn encode_call_args(ctx: &CodecContext, values: &[NativeValue]) -> crate::value::Wrapped {
    encode_args(ctx, values).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::in_memory_transport;

    #[tokio::test]
    async fn connect_emits_initialized_handshake() {
        let (handle, mut peer) = in_memory_transport();
        let config = WorkerConfig {
            id: "plugin-1".to_string(),
            secret: crate::config::ChannelSecret::parse("s").unwrap(),
            namespace: None,
            work_dir: std::env::temp_dir(),
            server: "http://localhost:9527".to_string(),
            daemon: false,
            debug: false,
            workers: 2,
        };
        let _controller = LifecycleController::connect(config, &handle).await.unwrap();
        let envelope = peer.from_worker.recv().await.unwrap();
        assert!(matches!(
            envelope,
            Envelope::Initialized { dedicated_thread: true }
        ));
    }

    #[tokio::test]
    async fn set_interface_announces_descriptor() {
        let (handle, mut peer) = in_memory_transport();
        let config = WorkerConfig {
            id: "plugin-1".to_string(),
            secret: crate::config::ChannelSecret::parse("s").unwrap(),
            namespace: None,
            work_dir: std::env::temp_dir(),
            server: "http://localhost:9527".to_string(),
            daemon: false,
            debug: false,
            workers: 2,
        };
        let controller = LifecycleController::connect(config, &handle).await.unwrap();
        let _ = peer.from_worker.recv().await.unwrap(); // initialized

        let greet = crate::value::Callable::new(|_args| async { Ok(NativeValue::Null) });
        let api = NativeValue::Object(vec![("greet".to_string(), NativeValue::Callable(greet))]);
        controller.set_interface(api).await.unwrap();

        let envelope = peer.from_worker.recv().await.unwrap();
        match envelope {
            Envelope::SetInterface { api } => {
                assert!(api.iter().any(|slot| slot.name == "greet"));
                assert!(api.iter().any(|slot| slot.name == "exit"));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }
}
