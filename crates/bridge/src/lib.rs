//! Bidirectional RPC bridge between a host and a sandboxed plugin worker.
//!
//! A host and a worker process exchange tagged envelopes over an
//! externally-supplied transport. This crate owns everything on the
//! worker's side of that exchange:
//!
//! - [`value`] — the value codec (tag values so the far side can rebuild
//!   callables, ndarrays, and errors) and the `NativeValue` model application
//!   code sees.
//! - [`reference_store`] — the process-local id→callable map callbacks are
//!   registered in.
//! - [`promise`] — one-shot resolve/reject pairs backing every remote call.
//! - [`stub`] — synthesizes local callables (method stubs, callback stubs)
//!   that emit envelopes and await replies.
//! - [`interface`] — the exported API surface and per-plugin callable
//!   tables.
//! - [`dispatcher`] — routes incoming envelopes to worker runners or handles
//!   them inline.
//! - [`lifecycle`] — connection handshake, the dispatch loop, and exit.
//! - [`transport`] — the channel-based transport boundary and an in-memory
//!   test harness.
//! - [`ndarray`] — the duck-typed numeric-array capability.
//! - [`supervisor`] — administrative events reported to a host supervisor.
//! - [`config`] — worker configuration and the validated handshake secret.
//! - [`envelope`] — the wire-level message types.
//! - [`error`] — [`BridgeError`], the crate's single error type.

pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod interface;
pub mod lifecycle;
pub mod ndarray;
pub mod promise;
pub mod reference_store;
pub mod stub;
pub mod supervisor;
pub mod transport;
pub mod value;

pub use config::{ChannelSecret, WorkerConfig};
pub use error::BridgeError;
pub use lifecycle::LifecycleController;
pub use value::{Callable, CodecContext, NativeValue};
