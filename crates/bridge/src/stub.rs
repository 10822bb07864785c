//! Component D: synthesizes local callables that emit RPC envelopes and
//! return the far side's eventual reply. Grounded on the teacher's
//! `invoke_tool_call`/`invoke_app_call` helpers (build request, register
//! listener, issue call, return handle) and, for protocol shape, on
//! `worker_template.py`'s `_genRemoteMethod`/`_genRemoteCallback`.
//!
//! Rust has no keyword-argument calling convention, so the original's
//! positional/keyword packing rule collapses to "arguments are always
//! positional"; a caller that wants the original's kwargs-as-mapping
//! behavior simply passes a single `NativeValue::Object` argument, which
//! already round-trips through the codec unchanged.

use crate::envelope::Envelope;
use crate::promise;
use crate::value::{encode_args, Callable, CodecContext, NativeValue};

/// A stub for a named method exported by the far side's interface (or, when
/// `plugin_id` is set, a method scoped to one of its plugin-interface
/// tables). Invoking it emits a `method` envelope and awaits the reply.
pub fn method_stub(ctx: CodecContext, name: String, plugin_id: Option<String>) -> Callable {
    Callable::new(move |args: Vec<NativeValue>| {
        let ctx = ctx.clone();
        let name = name.clone();
        let plugin_id = plugin_id.clone();
        async move {
            let pair = promise::promise_pair();
            let wrapped_args = encode_args(&ctx, &args).await;
            let wrapped_promise = encode_args(
                &ctx,
                &[
                    NativeValue::Callable(pair.resolve.clone()),
                    NativeValue::Callable(pair.reject.clone()),
                ],
            )
            .await;
            ctx.outbound.send(Envelope::Method {
                name,
                pid: plugin_id,
                args: wrapped_args,
                promise: Some(wrapped_promise),
            })?;
            pair.future.wait().await
        }
    })
}

/// A stub for a reference-store callback. `callback_id` is the envelope-level
/// correlation id this stub echoes back in its reply; `num` addresses the
/// specific callable in the far side's reference store. When `with_promise`
/// is false the call is fire-and-forget: it emits the envelope and resolves
/// immediately without waiting on a reply.
pub fn callback_stub(ctx: CodecContext, callback_id: Option<u64>, num: u64, with_promise: bool) -> Callable {
    Callable::new(move |args: Vec<NativeValue>| {
        let ctx = ctx.clone();
        async move {
            let wrapped_args = encode_args(&ctx, &args).await;
            if with_promise {
                let pair = promise::promise_pair();
                let wrapped_promise = encode_args(
                    &ctx,
                    &[
                        NativeValue::Callable(pair.resolve.clone()),
                        NativeValue::Callable(pair.reject.clone()),
                    ],
                )
                .await;
                ctx.outbound.send(Envelope::Callback {
                    id: callback_id,
                    num,
                    args: wrapped_args,
                    promise: Some(wrapped_promise),
                })?;
                pair.future.wait().await
            } else {
                ctx.outbound.send(Envelope::Callback {
                    id: callback_id,
                    num,
                    args: wrapped_args,
                    promise: None,
                })?;
                Ok(NativeValue::Null)
            }
        }
    })
}
