//! The host supervisor boundary: administrative events the bridge reports
//! but never interprets. Grounded on `examples/original_source/imjoy/
//! connection/handler.py`'s `register_services`/`on_reset_engine`/
//! `on_get_engine_status` handlers.

use crate::error::BridgeError;

/// Outcome of an administrative action, reported back to the supervisor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusRecord {
    pub success: bool,
    pub detail: Option<String>,
}

impl StatusRecord {
    pub fn ok() -> Self {
        StatusRecord {
            success: true,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        StatusRecord {
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// Administrative events a host supervisor may send or ask for, independent
/// of the plugin RPC channel itself.
pub trait SupervisorEvents: Send + Sync {
    fn on_connect(&self, plugin_id: &str) -> Result<StatusRecord, BridgeError>;
    fn on_reset_engine(&self) -> Result<StatusRecord, BridgeError>;
    fn on_get_engine_status(&self) -> Result<StatusRecord, BridgeError>;
    fn on_disconnect(&self, plugin_id: &str) -> Result<StatusRecord, BridgeError>;
}

/// A minimal in-memory supervisor used by tests and simple embedders: it
/// always reports success and does no bookkeeping of its own.
#[derive(Default)]
pub struct NullSupervisor;

impl SupervisorEvents for NullSupervisor {
    fn on_connect(&self, _plugin_id: &str) -> Result<StatusRecord, BridgeError> {
        Ok(StatusRecord::ok())
    }

    fn on_reset_engine(&self) -> Result<StatusRecord, BridgeError> {
        Ok(StatusRecord::ok())
    }

    fn on_get_engine_status(&self) -> Result<StatusRecord, BridgeError> {
        Ok(StatusRecord::ok())
    }

    fn on_disconnect(&self, _plugin_id: &str) -> Result<StatusRecord, BridgeError> {
        Ok(StatusRecord::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_supervisor_always_reports_success() {
        let supervisor = NullSupervisor;
        assert!(supervisor.on_connect("plugin-1").unwrap().success);
        assert!(supervisor.on_reset_engine().unwrap().success);
        assert!(supervisor.on_get_engine_status().unwrap().success);
        assert!(supervisor.on_disconnect("plugin-1").unwrap().success);
    }
}
