use thiserror::Error;

/// Errors surfaced by the codec, registries, dispatcher, and lifecycle controller.
///
/// Variants map onto the error kinds named in the protocol's error-handling
/// design, plus the structural causes (`Json`, `Io`, `ChannelClosed`) needed
/// to carry a `#[source]` through to callers.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no callable registered for reference id {0}")]
    UnregisteredClient(u64),

    #[error("unsupported api export shape: {0}")]
    ApiShape(String),

    #[error("codec does not support this wire value: {0}")]
    CodecUnsupportedType(String),

    #[error("no ndarray provider registered for this connection")]
    NdarrayMissingProvider,

    #[error("remote call failed: {0}")]
    RemoteCallFailure(String),

    #[error("transport connection lost")]
    TransportLost,

    #[error("exit handler failed: {0}")]
    ExitHandlerFailure(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("channel closed unexpectedly")]
    ChannelClosed,
}
