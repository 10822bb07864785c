//! Wire-level envelope types exchanged between host and worker.
//!
//! One `Envelope` per message, tagged on `type` the way the teacher's MCP
//! protocol types are tagged. `Wrapped` and `Encoded` (see [`crate::value`])
//! carry the codec's tagged-value tree inside `args`/`promise`/`code`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::Wrapped;

/// A single interface slot as advertised to the peer: `data` is `None` for a
/// callable slot, `Some(literal)` for a primitive, or `Some(object)` for a
/// shallow mapping whose callable members have been replaced by a
/// `**@@FUNCTION@@**:<key>` sentinel string.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterfaceSlot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "initialized")]
    Initialized {
        #[serde(rename = "dedicatedThread")]
        dedicated_thread: bool,
    },

    #[serde(rename = "setInterface")]
    SetInterface { api: Vec<InterfaceSlot> },

    #[serde(rename = "method")]
    Method {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<String>,
        args: Wrapped,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promise: Option<Wrapped>,
    },

    #[serde(rename = "callback")]
    Callback {
        #[serde(default)]
        id: Option<u64>,
        num: u64,
        args: Wrapped,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promise: Option<Wrapped>,
    },

    #[serde(rename = "execute")]
    Execute {
        #[serde(default)]
        code: Value,
    },

    #[serde(rename = "executeSuccess")]
    ExecuteSuccess,

    #[serde(rename = "message")]
    Message { data: Value },

    #[serde(rename = "import")]
    Import { url: String },

    #[serde(rename = "importSuccess")]
    ImportSuccess { url: String },

    #[serde(rename = "disconnect")]
    Disconnect,
}
