//! Component F: the single-consumer queue that fans incoming envelopes out
//! to worker runners. Grounded on `wrapper_events/src/ingest.rs`'s bounded,
//! single-consumer ingestion loop, generalized from raw lines to decoded
//! envelopes; the idempotent-execute and disconnect handling follow
//! `worker_template.py`'s `sio_plugin_message`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::envelope::Envelope;
use crate::error::BridgeError;
use crate::interface::InterfaceRegistry;
use crate::transport::OutboundSink;
use crate::value::Wrapped;

/// Work handed to a worker runner. `Execute`/`Message` carry the host's
/// payload for application code to act on; `Method`/`Callback` are routed
/// back into the codec and interface registry by the runner itself.
pub enum WorkItem {
    Execute(Value),
    Message(Value),
    Method {
        name: String,
        pid: Option<String>,
        args: Wrapped,
        promise: Option<Wrapped>,
    },
    Callback {
        id: Option<u64>,
        num: u64,
        args: Wrapped,
        promise: Option<Wrapped>,
    },
}

/// Shared flags worker runners and the dispatcher both observe: whether
/// `execute` has already run once, and whether the connection has been
/// asked to shut down.
pub struct DispatcherState {
    executed: AtomicBool,
    aborted: AtomicBool,
    queue_depth: AtomicUsize,
}

impl DispatcherState {
    pub fn new() -> Self {
        DispatcherState {
            executed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Records one more item on the work queue and traces the resulting
    /// depth; there's no bound to enforce, only visibility into how deep the
    /// queue gets between worker-runner passes.
    fn note_enqueued(&self) {
        let depth = self.queue_depth.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(depth, "work item queued");
    }

    /// Records that a worker runner picked an item off the queue.
    pub fn note_dequeued(&self) {
        let depth = self.queue_depth.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::trace!(depth, "work item dequeued");
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }
}

impl Default for DispatcherState {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes a decoded envelope to the right place: administrative types
/// (`import`, `disconnect`) are handled inline; `execute`/`message`/
/// `method`/`callback` are pushed onto the shared work queue for a worker
/// runner to pick up.
pub struct Dispatcher {
    work_tx: mpsc::UnboundedSender<WorkItem>,
    outbound: OutboundSink,
    interface: Arc<AsyncMutex<InterfaceRegistry>>,
    state: Arc<DispatcherState>,
}

impl Dispatcher {
    pub fn new(
        work_tx: mpsc::UnboundedSender<WorkItem>,
        outbound: OutboundSink,
        interface: Arc<AsyncMutex<InterfaceRegistry>>,
        state: Arc<DispatcherState>,
    ) -> Self {
        Dispatcher {
            work_tx,
            outbound,
            interface,
            state,
        }
    }

    pub async fn route(&self, envelope: Envelope) -> Result<(), BridgeError> {
        match envelope {
            Envelope::Import { url } => self.outbound.send(Envelope::ImportSuccess { url }),
            Envelope::Disconnect => {
                let exit = self.interface.lock().await.get("exit");
                if let Some(exit) = exit {
                    // `exit` already composes the user handler with the
                    // default one and terminates the process; errors from
                    // the user half are logged inside the wrapper, not here.
                    let _ = exit.call(Vec::new()).await;
                }
                self.state.abort();
                Ok(())
            }
            Envelope::Execute { code } => {
                if !self.state.executed.swap(true, Ordering::SeqCst) {
                    let sent = self
                        .work_tx
                        .send(WorkItem::Execute(code))
                        .map_err(|_| BridgeError::ChannelClosed);
                    if sent.is_ok() {
                        self.state.note_enqueued();
                    }
                    sent
                } else {
                    tracing::debug!("duplicate execute envelope ignored");
                    self.outbound.send(Envelope::ExecuteSuccess)
                }
            }
            Envelope::Message { data } => {
                let sent = self
                    .work_tx
                    .send(WorkItem::Message(data))
                    .map_err(|_| BridgeError::ChannelClosed);
                if sent.is_ok() {
                    self.state.note_enqueued();
                }
                sent
            }
            Envelope::Method { name, pid, args, promise } => {
                let sent = self
                    .work_tx
                    .send(WorkItem::Method { name, pid, args, promise })
                    .map_err(|_| BridgeError::ChannelClosed);
                if sent.is_ok() {
                    self.state.note_enqueued();
                }
                sent
            }
            Envelope::Callback { id, num, args, promise } => {
                let sent = self
                    .work_tx
                    .send(WorkItem::Callback { id, num, args, promise })
                    .map_err(|_| BridgeError::ChannelClosed);
                if sent.is_ok() {
                    self.state.note_enqueued();
                }
                sent
            }
            other => {
                tracing::debug!(envelope = ?other, "envelope not handled by the dispatcher");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::in_memory_transport;

    fn test_dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<WorkItem>, Arc<DispatcherState>) {
        let (handle, _peer) = in_memory_transport();
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let interface = Arc::new(AsyncMutex::new(InterfaceRegistry::new()));
        let state = Arc::new(DispatcherState::new());
        let dispatcher = Dispatcher::new(work_tx, OutboundSink(handle.outbound), interface, state.clone());
        (dispatcher, work_rx, state)
    }

    #[tokio::test]
    async fn second_execute_is_idempotent() {
        let (dispatcher, mut work_rx, _state) = test_dispatcher();
        dispatcher.route(Envelope::Execute { code: Value::Null }).await.unwrap();
        dispatcher.route(Envelope::Execute { code: Value::Null }).await.unwrap();
        assert!(matches!(work_rx.recv().await, Some(WorkItem::Execute(_))));
        // The second execute never reaches the queue.
        work_rx.close();
        assert!(work_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn routing_work_items_tracks_queue_depth() {
        let (dispatcher, mut work_rx, state) = test_dispatcher();
        dispatcher
            .route(Envelope::Message { data: Value::Null })
            .await
            .unwrap();
        dispatcher
            .route(Envelope::Message { data: Value::Null })
            .await
            .unwrap();
        assert_eq!(state.queue_depth(), 2);
        work_rx.recv().await.unwrap();
        state.note_dequeued();
        assert_eq!(state.queue_depth(), 1);
    }

    #[tokio::test]
    async fn disconnect_sets_aborted() {
        let (dispatcher, _work_rx, state) = test_dispatcher();
        dispatcher.route(Envelope::Disconnect).await.unwrap();
        assert!(state.is_aborted());
    }

    #[tokio::test]
    async fn import_replies_with_import_success() {
        let (handle, mut peer) = in_memory_transport();
        let (work_tx, _work_rx) = mpsc::unbounded_channel();
        let interface = Arc::new(AsyncMutex::new(InterfaceRegistry::new()));
        let dispatcher = Dispatcher::new(
            work_tx,
            OutboundSink(handle.outbound),
            interface,
            Arc::new(DispatcherState::new()),
        );
        dispatcher
            .route(Envelope::Import {
                url: "pkg://demo".to_string(),
            })
            .await
            .unwrap();
        let reply = peer.from_worker.recv().await.unwrap();
        assert!(matches!(reply, Envelope::ImportSuccess { url } if url == "pkg://demo"));
    }
}
