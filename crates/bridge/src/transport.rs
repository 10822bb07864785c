//! The transport boundary: the core assumes only reliable in-order delivery
//! of envelopes per connection and a disconnect signal, never a concrete
//! wire protocol. Grounded on the teacher's `mcp/jsonrpc.rs` writer/reader
//! task split (`mpsc::UnboundedSender<String>` out, line-by-line in),
//! abstracted here to channel endpoints instead of a trait so the lifecycle
//! controller stays generic without needing a dyn-safe async trait.

use tokio::sync::mpsc;

use crate::envelope::Envelope;
use crate::error::BridgeError;

/// The worker side's view of a connection: an outbound sender for envelopes
/// this side emits, and an inbound receiver for envelopes the host sends.
/// Whoever wires up the concrete pub/sub client constructs this; it is out
/// of scope for the bridge itself.
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub inbound: mpsc::UnboundedReceiver<Envelope>,
}

/// A clonable handle for sending envelopes, threaded through the codec
/// context so synthesized stubs can emit without holding a lock on the
/// whole transport.
#[derive(Clone)]
pub struct OutboundSink(pub mpsc::UnboundedSender<Envelope>);

impl OutboundSink {
    pub fn send(&self, envelope: Envelope) -> Result<(), BridgeError> {
        self.0.send(envelope).map_err(|_| BridgeError::ChannelClosed)
    }
}

/// The opposite end of an in-memory transport, used by tests to play the
/// role of the host.
pub struct TestPeer {
    pub to_worker: mpsc::UnboundedSender<Envelope>,
    pub from_worker: mpsc::UnboundedReceiver<Envelope>,
}

/// Builds a connected pair of in-memory transports: one for the worker side,
/// one for a test harness standing in for the host.
pub fn in_memory_transport() -> (TransportHandle, TestPeer) {
    let (host_to_worker_tx, host_to_worker_rx) = mpsc::unbounded_channel();
    let (worker_to_host_tx, worker_to_host_rx) = mpsc::unbounded_channel();
    let handle = TransportHandle {
        outbound: worker_to_host_tx,
        inbound: host_to_worker_rx,
    };
    let peer = TestPeer {
        to_worker: host_to_worker_tx,
        from_worker: worker_to_host_rx,
    };
    (handle, peer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_transport_delivers_both_ways() {
        let (mut handle, mut peer) = in_memory_transport();
        peer.to_worker.send(Envelope::Disconnect).unwrap();
        assert!(matches!(handle.inbound.recv().await, Some(Envelope::Disconnect)));

        OutboundSink(handle.outbound.clone())
            .send(Envelope::ExecuteSuccess)
            .unwrap();
        assert!(matches!(
            peer.from_worker.recv().await,
            Some(Envelope::ExecuteSuccess)
        ));
    }
}
