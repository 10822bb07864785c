//! Component E: the exported API surface. Grounded directly on
//! `worker_template.py`'s `setInterface`/`send_interface` methods.

use std::collections::HashMap;

use serde_json::Value;

use crate::envelope::InterfaceSlot;
use crate::error::BridgeError;
use crate::value::{Callable, NativeValue};

#[derive(Clone)]
enum InterfaceMember {
    Callable(Callable),
    Primitive(Value),
    Mapping(Vec<(String, MappingValue)>),
}

#[derive(Clone)]
enum MappingValue {
    Callable(Callable),
    Primitive(Value),
}

/// The exported API map: an ordered set of named slots, each a callable, a
/// literal, or a shallow mapping of the two. Keys starting with `_` are
/// never exposed; an `exit` slot is always present once `set_interface` has
/// run, wrapping any user-provided one with the default exit behavior.
pub struct InterfaceRegistry {
    slots: Vec<(String, InterfaceMember)>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        InterfaceRegistry { slots: Vec::new() }
    }

    /// Installs a new exported API, replacing any previous one. `api` must be
    /// a `NativeValue::Object`; anything else is an `ApiShape` error. Hidden
    /// (`_`-prefixed) keys are dropped. `default_exit` is installed as the
    /// `exit` slot's fallback: it always runs, whether or not the caller
    /// exported its own `exit`.
    pub fn set_interface(&mut self, api: NativeValue, default_exit: Callable) -> Result<(), BridgeError> {
        let pairs = match api {
            NativeValue::Object(pairs) => pairs,
            other => {
                return Err(BridgeError::ApiShape(format!(
                    "setInterface expects a mapping, got {other:?}"
                )))
            }
        };

        let mut slots = Vec::with_capacity(pairs.len() + 1);
        let mut has_exit = false;
        for (key, value) in pairs {
            if key.starts_with('_') {
                continue;
            }
            if key == "exit" {
                has_exit = true;
                let user_exit = match value {
                    NativeValue::Callable(callable) => Some(callable),
                    _ => return Err(BridgeError::ApiShape("exit slot must be callable".to_string())),
                };
                slots.push(("exit".to_string(), InterfaceMember::Callable(wrap_exit(user_exit, default_exit.clone()))));
                continue;
            }
            slots.push((key.clone(), to_member(value)?));
        }
        if !has_exit {
            slots.push(("exit".to_string(), InterfaceMember::Callable(default_exit)));
        }
        self.slots = slots;
        Ok(())
    }

    /// Looks up a top-level callable slot by name.
    pub fn get(&self, name: &str) -> Option<Callable> {
        self.slots.iter().find_map(|(key, member)| match member {
            InterfaceMember::Callable(callable) if key == name => Some(callable.clone()),
            _ => None,
        })
    }

    /// Finds the name a callable was exported under, by identity. Used by
    /// the codec to encode an already-exported callable as `interface`
    /// rather than allocating a fresh reference-store id for it.
    pub fn find_name(&self, callable: &Callable) -> Option<String> {
        self.slots.iter().find_map(|(key, member)| match member {
            InterfaceMember::Callable(candidate) if candidate.ptr_eq(callable) => Some(key.clone()),
            _ => None,
        })
    }

    /// Builds the `setInterface` envelope's slot descriptors: `None` for a
    /// callable, the literal value for a primitive, and for a mapping, its
    /// callable members replaced by a `**@@FUNCTION@@**:<key>` sentinel so
    /// the host knows which keys to wrap as callbacks of its own.
    pub fn descriptor(&self) -> Vec<InterfaceSlot> {
        self.slots
            .iter()
            .map(|(name, member)| {
                let data = match member {
                    InterfaceMember::Callable(_) => None,
                    InterfaceMember::Primitive(value) => Some(value.clone()),
                    InterfaceMember::Mapping(entries) => {
                        let mut object = serde_json::Map::new();
                        for (key, value) in entries {
                            let rendered = match value {
                                MappingValue::Callable(_) => Value::String(format!("**@@FUNCTION@@**:{key}")),
                                MappingValue::Primitive(value) => value.clone(),
                            };
                            object.insert(key.clone(), rendered);
                        }
                        Some(Value::Object(object))
                    }
                };
                InterfaceSlot {
                    name: name.clone(),
                    data,
                }
            })
            .collect()
    }
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn wrap_exit(user_exit: Option<Callable>, default_exit: Callable) -> Callable {
    Callable::new(move |args: Vec<NativeValue>| {
        let user_exit = user_exit.clone();
        let default_exit = default_exit.clone();
        async move {
            if let Some(user_exit) = user_exit {
                if let Err(err) = user_exit.call(args).await {
                    tracing::warn!(error = %err, "exit handler failed, terminating anyway");
                }
            }
            default_exit.call(Vec::new()).await
        }
    })
}

fn to_member(value: NativeValue) -> Result<InterfaceMember, BridgeError> {
    match value {
        NativeValue::Callable(callable) => Ok(InterfaceMember::Callable(callable)),
        NativeValue::Null | NativeValue::Bool(_) | NativeValue::Number(_) | NativeValue::String(_) => {
            Ok(InterfaceMember::Primitive(to_json_scalar(&value)))
        }
        NativeValue::Object(pairs) => {
            let mut entries = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                let mapped = match value {
                    NativeValue::Callable(callable) => MappingValue::Callable(callable),
                    other => MappingValue::Primitive(to_json_scalar(&other)),
                };
                entries.push((key, mapped));
            }
            Ok(InterfaceMember::Mapping(entries))
        }
        other => Err(BridgeError::ApiShape(format!(
            "interface slot must be callable, a literal, or a shallow mapping, got {other:?}"
        ))),
    }
}

fn to_json_scalar(value: &NativeValue) -> Value {
    match value {
        NativeValue::Null => Value::Null,
        NativeValue::Bool(b) => Value::Bool(*b),
        NativeValue::Number(n) => Value::Number(n.clone()),
        NativeValue::String(s) => Value::String(s.clone()),
        _ => Value::Null,
    }
}

/// Per-plugin callable tables stashed by the codec when it encodes a
/// `PluginApi` value, so an incoming `plugin_interface` call can be routed
/// back to the right callable.
pub struct PluginInterfaceTable {
    table: HashMap<String, HashMap<String, Callable>>,
}

impl PluginInterfaceTable {
    pub fn new() -> Self {
        PluginInterfaceTable { table: HashMap::new() }
    }

    pub fn stash(&mut self, plugin_id: String, members: Vec<(String, Callable)>) {
        self.table.entry(plugin_id).or_default().extend(members);
    }

    pub fn get(&self, plugin_id: &str, name: &str) -> Option<Callable> {
        self.table.get(plugin_id).and_then(|members| members.get(name)).cloned()
    }
}

impl Default for PluginInterfaceTable {
    fn default() -> Self {
        Self::new()
    }
}
