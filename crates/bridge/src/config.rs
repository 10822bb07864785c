//! Worker configuration, mirroring the original's CLI surface (`--id`,
//! `--secret`, `--namespace`, `--work_dir`, `--server`, `--daemon`,
//! `--debug`) plus a worker-pool size knob the original hard-coded to 10.
//! `ChannelSecret`'s bounded-ASCII validation follows `wrapper_events/src/
//! channel.rs`'s `ValidatedChannelString`.

use std::path::PathBuf;

use crate::error::BridgeError;

const MAX_SECRET_BYTES: usize = 64;

/// A handshake secret validated to be short, ASCII, and free of control
/// characters — the same shape constraint `ValidatedChannelString` applies
/// to channel names, applied here to the value exchanged at connect time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSecret(String);

impl ChannelSecret {
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        if raw.is_empty() {
            return Err(BridgeError::ApiShape("secret must not be empty".to_string()));
        }
        if raw.len() > MAX_SECRET_BYTES {
            return Err(BridgeError::ApiShape(format!(
                "secret exceeds {MAX_SECRET_BYTES} bytes"
            )));
        }
        if !raw.is_ascii() || raw.chars().any(|c| c.is_ascii_control()) {
            return Err(BridgeError::ApiShape(
                "secret must be printable ASCII with no control characters".to_string(),
            ));
        }
        Ok(ChannelSecret(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Configuration for one worker connection, assembled from CLI arguments by
/// `plugin-bridge-worker` or constructed directly by an embedder.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub id: String,
    pub secret: ChannelSecret,
    pub namespace: Option<String>,
    pub work_dir: PathBuf,
    pub server: String,
    pub daemon: bool,
    pub debug: bool,
    /// Number of worker runners draining the shared work queue; the
    /// original hard-coded this to 10.
    pub workers: usize,
}

impl WorkerConfig {
    pub fn channel_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}/{}", self.id),
            None => self.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_secret() {
        assert!(ChannelSecret::parse("").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(ChannelSecret::parse("abc\ndef").is_err());
    }

    #[test]
    fn rejects_oversized_secret() {
        let raw = "a".repeat(MAX_SECRET_BYTES + 1);
        assert!(ChannelSecret::parse(&raw).is_err());
    }

    #[test]
    fn accepts_plain_ascii_secret() {
        let secret = ChannelSecret::parse("abc-123").unwrap();
        assert_eq!(secret.as_str(), "abc-123");
    }

    #[test]
    fn channel_name_includes_namespace_when_present() {
        let config = WorkerConfig {
            id: "plugin-1".to_string(),
            secret: ChannelSecret::parse("s").unwrap(),
            namespace: Some("demo".to_string()),
            work_dir: PathBuf::from("."),
            server: "http://localhost:9527".to_string(),
            daemon: false,
            debug: false,
            workers: 10,
        };
        assert_eq!(config.channel_name(), "demo/plugin-1");
    }
}
