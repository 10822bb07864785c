//! Value codec (Component C) and the in-memory value model it encodes/decodes.
//!
//! `NativeValue` is what application code on this side of the bridge passes
//! around. `Encoded`/`EncodedValue` are its wire representation: every
//! non-null, non-collection value is tagged with `__jailed_type__` so the far
//! side knows how to rebuild it, following `worker_template.py`'s
//! `_encode`/`_decode`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::BridgeError;
use crate::interface::{InterfaceRegistry, PluginInterfaceTable};
use crate::ndarray::{concat_chunks, DecodedNdarray};
use crate::reference_store::ReferenceStore;
use crate::stub;
use crate::transport::OutboundSink;

/// Byte count above which an ndarray payload is sent as a list of chunks
/// rather than a single flat buffer, matching the original's `ARRAY_CHUNK`.
pub const ARRAY_CHUNK: usize = 1_000_000;

/// An outbound call's packed positional arguments, or the `[resolve, reject]`
/// pair carried in a `promise` field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wrapped {
    pub args: Vec<Encoded>,
}

/// A decoded or not-yet-decoded node in the value tree. `Null` bypasses
/// tagging entirely (passthrough rule); every other primitive is tagged via
/// `EncodedValue::Argument`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Encoded {
    Null,
    Tagged(EncodedValue),
    Array(Vec<Encoded>),
    Object(OrderedObject),
}

/// Raw ndarray payload: either one flat buffer or chunks no larger than
/// [`ARRAY_CHUNK`] bytes each.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NdarrayPayload {
    Chunks(Vec<Vec<u8>>),
    Whole(Vec<u8>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "__jailed_type__", rename_all = "snake_case")]
pub enum EncodedValue {
    Argument {
        #[serde(rename = "__value__")]
        value: Value,
    },
    Callback {
        #[serde(rename = "__value__")]
        value: String,
        num: u64,
    },
    Interface {
        #[serde(rename = "__value__")]
        value: String,
    },
    PluginInterface {
        #[serde(rename = "__plugin_id__")]
        plugin_id: String,
        #[serde(rename = "__value__")]
        value: String,
    },
    Ndarray {
        #[serde(rename = "__value__")]
        value: NdarrayPayload,
        #[serde(rename = "__shape__")]
        shape: Vec<u64>,
        #[serde(rename = "__dtype__")]
        dtype: String,
    },
    Error {
        #[serde(rename = "__value__")]
        value: String,
    },
}

/// A JSON object that preserves the key order it was built or parsed with.
/// Plain `BTreeMap`/`HashMap` would reorder keys, which the wire format does
/// not tolerate for slot descriptors.
#[derive(Clone, Debug, Default)]
pub struct OrderedObject(pub Vec<(String, Encoded)>);

impl Serialize for OrderedObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedObjectVisitor;

        impl<'de> Visitor<'de> for OrderedObjectVisitor {
            type Value = OrderedObject;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, Encoded>()? {
                    entries.push((key, value));
                }
                Ok(OrderedObject(entries))
            }
        }

        deserializer.deserialize_map(OrderedObjectVisitor)
    }
}

/// A future-returning closure reachable from the other side via a reference
/// id or an interface name. Cloning is cheap (it's an `Arc`); identity
/// (`ptr_eq`) is what the interface registry uses to recognize "this is the
/// same callable I exported."
#[derive(Clone)]
pub struct Callable(Arc<CallableFn>);

type CallableFn = dyn Fn(Vec<NativeValue>) -> BoxedCall + Send + Sync;
type BoxedCall = Pin<Box<dyn Future<Output = Result<NativeValue, BridgeError>> + Send>>;

impl Callable {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<NativeValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NativeValue, BridgeError>> + Send + 'static,
    {
        Callable(Arc::new(move |args| Box::pin(f(args))))
    }

    pub async fn call(&self, args: Vec<NativeValue>) -> Result<NativeValue, BridgeError> {
        (self.0)(args).await
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable(@{:p})", Arc::as_ptr(&self.0))
    }
}

/// The in-memory value model application code on this side of the bridge
/// works with. A `NativeValue` never carries wire tags; [`encode`]/[`decode`]
/// translate to and from [`Encoded`].
#[derive(Clone, Debug)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// Raw bytes that are not part of an ndarray. Encoded as a lossy UTF-8
    /// string argument, matching the original's behavior for non-ndarray
    /// binary payloads — a known lossy conversion, not a bug to route around.
    Bytes(Vec<u8>),
    Array(Vec<NativeValue>),
    Object(Vec<(String, NativeValue)>),
    Callable(Callable),
    Ndarray(DecodedNdarray),
    Error(String),
    /// A mapping tagged with a plugin id: its callable members become
    /// plugin-interface stubs reachable by name from the far side, stashed in
    /// the plugin-interface table under `id`.
    PluginApi {
        id: String,
        members: Vec<(String, NativeValue)>,
    },
}

/// Everything the codec needs to turn a `NativeValue` into wire bytes and
/// back: where to stash newly-exposed callables, where to look up interface
/// identity, and how to emit outbound envelopes for synthesized stubs.
#[derive(Clone)]
pub struct CodecContext {
    pub reference_store: Arc<ReferenceStore>,
    pub interface: Arc<AsyncMutex<InterfaceRegistry>>,
    pub plugin_interfaces: Arc<AsyncMutex<PluginInterfaceTable>>,
    pub remote_namespace: Arc<AsyncMutex<HashMap<String, Callable>>>,
    pub outbound: OutboundSink,
    pub ndarray_available: bool,
}

impl CodecContext {
    pub fn new(outbound: OutboundSink, ndarray_available: bool) -> Self {
        CodecContext {
            reference_store: Arc::new(ReferenceStore::new()),
            interface: Arc::new(AsyncMutex::new(InterfaceRegistry::new())),
            plugin_interfaces: Arc::new(AsyncMutex::new(PluginInterfaceTable::new())),
            remote_namespace: Arc::new(AsyncMutex::new(HashMap::new())),
            outbound,
            ndarray_available,
        }
    }
}

/// Encode a `NativeValue` into its wire form. Encoding a callable allocates a
/// reference-store id (or resolves to an `interface`/`plugin_interface` tag
/// if the callable is one this side already exported under a name).
pub async fn encode(ctx: &CodecContext, value: &NativeValue) -> Encoded {
    match value {
        NativeValue::Null => Encoded::Null,
        NativeValue::Bool(b) => Encoded::Tagged(EncodedValue::Argument {
            value: Value::Bool(*b),
        }),
        NativeValue::Number(n) => Encoded::Tagged(EncodedValue::Argument {
            value: Value::Number(n.clone()),
        }),
        NativeValue::String(s) => Encoded::Tagged(EncodedValue::Argument {
            value: Value::String(s.clone()),
        }),
        NativeValue::Bytes(bytes) => Encoded::Tagged(EncodedValue::Argument {
            value: Value::String(String::from_utf8_lossy(bytes).into_owned()),
        }),
        NativeValue::Error(message) => Encoded::Tagged(EncodedValue::Error {
            value: message.clone(),
        }),
        NativeValue::Ndarray(array) => {
            let payload = if array.bytes.len() > ARRAY_CHUNK {
                NdarrayPayload::Chunks(
                    array
                        .bytes
                        .chunks(ARRAY_CHUNK)
                        .map(|chunk| chunk.to_vec())
                        .collect(),
                )
            } else {
                NdarrayPayload::Whole(array.bytes.clone())
            };
            Encoded::Tagged(EncodedValue::Ndarray {
                value: payload,
                shape: array.shape.clone(),
                dtype: array.dtype.clone(),
            })
        }
        NativeValue::Callable(callable) => {
            if let Some(name) = ctx.interface.lock().await.find_name(callable) {
                Encoded::Tagged(EncodedValue::Interface { value: name })
            } else {
                let id = ctx.reference_store.put(callable.clone()).await;
                Encoded::Tagged(EncodedValue::Callback {
                    value: "f".to_string(),
                    num: id,
                })
            }
        }
        NativeValue::Array(items) => {
            let mut encoded = Vec::with_capacity(items.len());
            for item in items {
                encoded.push(Box::pin(encode(ctx, item)).await);
            }
            Encoded::Array(encoded)
        }
        NativeValue::Object(pairs) => {
            let mut encoded = Vec::with_capacity(pairs.len());
            for (key, item) in pairs {
                encoded.push((key.clone(), Box::pin(encode(ctx, item)).await));
            }
            Encoded::Object(OrderedObject(encoded))
        }
        NativeValue::PluginApi { id, members } => {
            let mut encoded = Vec::with_capacity(members.len());
            let mut stashed = Vec::new();
            for (key, member) in members {
                match member {
                    NativeValue::Callable(callable) => {
                        stashed.push((key.clone(), callable.clone()));
                        encoded.push((
                            key.clone(),
                            Encoded::Tagged(EncodedValue::PluginInterface {
                                plugin_id: id.clone(),
                                value: key.clone(),
                            }),
                        ));
                    }
                    // Non-callable members never entered the original's
                    // `bObject`/`encoded_interface`; drop them here too.
                    _ => {}
                }
            }
            ctx.plugin_interfaces.lock().await.stash(id.clone(), stashed);
            Encoded::Object(OrderedObject(encoded))
        }
    }
}

/// Encode a batch of arguments (a call's positional args, or a `[resolve,
/// reject]` promise pair) into a `Wrapped`.
pub async fn encode_args(ctx: &CodecContext, values: &[NativeValue]) -> Wrapped {
    let mut args = Vec::with_capacity(values.len());
    for value in values {
        args.push(encode(ctx, value).await);
    }
    Wrapped { args }
}

/// Decode a single wire value back into a `NativeValue`. `callback_id` is the
/// envelope-level correlation id (from an incoming `callback` envelope's
/// `id` field, or `None` for a `method` envelope) that a synthesized callback
/// stub will echo back when invoked. `with_promise` controls whether that
/// stub behaves like a method stub (awaitable) or fires its reply and
/// forgets.
pub fn decode<'a>(
    ctx: &'a CodecContext,
    encoded: &'a Encoded,
    callback_id: Option<u64>,
    with_promise: bool,
) -> Pin<Box<dyn Future<Output = Result<NativeValue, BridgeError>> + Send + 'a>> {
    Box::pin(async move {
        match encoded {
            Encoded::Null => Ok(NativeValue::Null),
            Encoded::Array(items) => {
                let mut decoded = Vec::with_capacity(items.len());
                for item in items {
                    decoded.push(decode(ctx, item, callback_id, with_promise).await?);
                }
                Ok(NativeValue::Array(decoded))
            }
            Encoded::Object(OrderedObject(pairs)) => {
                let mut decoded = Vec::with_capacity(pairs.len());
                for (key, item) in pairs {
                    decoded.push((key.clone(), decode(ctx, item, callback_id, with_promise).await?));
                }
                Ok(NativeValue::Object(decoded))
            }
            Encoded::Tagged(tagged) => decode_tagged(ctx, tagged, callback_id, with_promise).await,
        }
    })
}

async fn decode_tagged(
    ctx: &CodecContext,
    tagged: &EncodedValue,
    callback_id: Option<u64>,
    with_promise: bool,
) -> Result<NativeValue, BridgeError> {
    match tagged {
        EncodedValue::Argument { value } => Ok(native_value_from_json(value)),
        EncodedValue::Error { value } => Ok(NativeValue::Error(value.clone())),
        EncodedValue::Callback { num, .. } => {
            let stub = stub::callback_stub(ctx.clone(), callback_id, *num, with_promise);
            Ok(NativeValue::Callable(stub))
        }
        EncodedValue::Interface { value: name } => {
            let mut remote = ctx.remote_namespace.lock().await;
            if let Some(existing) = remote.get(name) {
                return Ok(NativeValue::Callable(existing.clone()));
            }
            let stub = stub::method_stub(ctx.clone(), name.clone(), None);
            remote.insert(name.clone(), stub.clone());
            Ok(NativeValue::Callable(stub))
        }
        EncodedValue::PluginInterface { plugin_id, value: name } => {
            let stub = stub::method_stub(ctx.clone(), name.clone(), Some(plugin_id.clone()));
            Ok(NativeValue::Callable(stub))
        }
        EncodedValue::Ndarray { value, shape, dtype } => {
            if !ctx.ndarray_available {
                return Err(BridgeError::NdarrayMissingProvider);
            }
            let bytes = match value {
                NdarrayPayload::Whole(bytes) => bytes.clone(),
                NdarrayPayload::Chunks(chunks) => concat_chunks(chunks),
            };
            Ok(NativeValue::Ndarray(DecodedNdarray {
                bytes,
                shape: shape.clone(),
                dtype: dtype.clone(),
            }))
        }
    }
}

/// Decode every element of a `Wrapped` with the same correlation context.
pub async fn decode_wrapped(
    ctx: &CodecContext,
    wrapped: &Wrapped,
    callback_id: Option<u64>,
    with_promise: bool,
) -> Result<Vec<NativeValue>, BridgeError> {
    let mut values = Vec::with_capacity(wrapped.args.len());
    for item in &wrapped.args {
        values.push(decode(ctx, item, callback_id, with_promise).await?);
    }
    Ok(values)
}

fn native_value_from_json(value: &Value) -> NativeValue {
    match value {
        Value::Null => NativeValue::Null,
        Value::Bool(b) => NativeValue::Bool(*b),
        Value::Number(n) => NativeValue::Number(n.clone()),
        Value::String(s) => NativeValue::String(s.clone()),
        Value::Array(items) => NativeValue::Array(items.iter().map(native_value_from_json).collect()),
        Value::Object(map) => NativeValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), native_value_from_json(v)))
                .collect(),
        ),
    }
}

/// Render a `NativeValue` as a short human string for error messages; used
/// when a remote call rejects with a non-string value.
pub fn native_value_to_display(value: &NativeValue) -> String {
    match value {
        NativeValue::Null => "null".to_string(),
        NativeValue::Bool(b) => b.to_string(),
        NativeValue::Number(n) => n.to_string(),
        NativeValue::String(s) => s.clone(),
        NativeValue::Error(s) => s.clone(),
        NativeValue::Bytes(_) => "<bytes>".to_string(),
        NativeValue::Array(_) => "<array>".to_string(),
        NativeValue::Object(_) => "<object>".to_string(),
        NativeValue::Callable(_) => "<callable>".to_string(),
        NativeValue::Ndarray(_) => "<ndarray>".to_string(),
        NativeValue::PluginApi { id, .. } => format!("<plugin-api {id}>"),
    }
}

/// Builds a `BridgeError::CodecUnsupportedType` for a wire shape the codec
/// does not know how to handle.
pub fn unsupported(shape: &str) -> BridgeError {
    BridgeError::CodecUnsupportedType(shape.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::in_memory_transport;

    fn test_ctx() -> CodecContext {
        let (handle, _peer) = in_memory_transport();
        CodecContext::new(OutboundSink(handle.outbound), true)
    }

    #[tokio::test]
    async fn null_bypasses_tagging() {
        let ctx = test_ctx();
        let encoded = encode(&ctx, &NativeValue::Null).await;
        assert!(matches!(encoded, Encoded::Null));
        let json = serde_json::to_value(&encoded).unwrap();
        assert_eq!(json, Value::Null);
    }

    #[tokio::test]
    async fn primitive_gets_argument_tag() {
        let ctx = test_ctx();
        let encoded = encode(&ctx, &NativeValue::String("hi".into())).await;
        let json = serde_json::to_value(&encoded).unwrap();
        assert_eq!(json["__jailed_type__"], "argument");
        assert_eq!(json["__value__"], "hi");
    }

    #[tokio::test]
    async fn callable_round_trips_through_reference_store() {
        let ctx = test_ctx();
        let callable = Callable::new(|_args| async { Ok(NativeValue::Null) });
        let encoded = encode(&ctx, &NativeValue::Callable(callable)).await;
        let json = serde_json::to_value(&encoded).unwrap();
        assert_eq!(json["__jailed_type__"], "callback");
        assert_eq!(json["num"], 1);
    }

    #[tokio::test]
    async fn plugin_api_descriptor_drops_non_callable_members() {
        let ctx = test_ctx();
        let api = NativeValue::PluginApi {
            id: "plugin-1".to_string(),
            members: vec![
                ("run".to_string(), NativeValue::Callable(Callable::new(|_args| async { Ok(NativeValue::Null) }))),
                ("version".to_string(), NativeValue::Number(1.into())),
            ],
        };
        let encoded = encode(&ctx, &api).await;
        match encoded {
            Encoded::Object(OrderedObject(pairs)) => {
                assert_eq!(pairs.len(), 1);
                assert_eq!(pairs[0].0, "run");
            }
            other => panic!("expected an object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn object_preserves_key_order() {
        let ctx = test_ctx();
        let value = NativeValue::Object(vec![
            ("z".to_string(), NativeValue::Number(1.into())),
            ("a".to_string(), NativeValue::Number(2.into())),
        ]);
        let encoded = encode(&ctx, &value).await;
        let json = serde_json::to_string(&encoded).unwrap();
        assert!(json.find("\"z\"").unwrap() < json.find("\"a\"").unwrap());
    }

    #[tokio::test]
    async fn ndarray_chunks_above_threshold() {
        let array = DecodedNdarray {
            bytes: vec![0u8; ARRAY_CHUNK + 10],
            shape: vec![ARRAY_CHUNK as u64 + 10],
            dtype: "uint8".to_string(),
        };
        let ctx = test_ctx();
        let encoded = encode(&ctx, &NativeValue::Ndarray(array)).await;
        match encoded {
            Encoded::Tagged(EncodedValue::Ndarray {
                value: NdarrayPayload::Chunks(chunks),
                ..
            }) => {
                assert_eq!(chunks.len(), 2);
                assert_eq!(chunks[0].len(), ARRAY_CHUNK);
            }
            other => panic!("expected chunked ndarray, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn decode_ndarray_without_provider_errors() {
        let (handle, _peer) = in_memory_transport();
        let ctx = CodecContext::new(OutboundSink(handle.outbound), false);
        let encoded = Encoded::Tagged(EncodedValue::Ndarray {
            value: NdarrayPayload::Whole(vec![1, 2, 3]),
            shape: vec![3],
            dtype: "uint8".to_string(),
        });
        let err = decode(&ctx, &encoded, None, false).await.unwrap_err();
        assert!(matches!(err, BridgeError::NdarrayMissingProvider));
    }
}
