//! Control-message wire envelopes and hook payload types.
//!
//! This module owns the bit-exact JSON shapes exchanged with the peer:
//!
//! - `envelope`: control request/response/cancellation envelopes and the
//!   classification of inbound messages by their `type` discriminator.
//! - `hooks`: the closed set of typed hook inputs reconstructed from untyped
//!   callback payloads, and the translation of callback outcomes back into
//!   wire fields.
//!
//! Envelope-level keys are `snake_case` (`request_id`, `already_completed`);
//! payload-level fields are `camelCase` (`callbackId`, `serverName`),
//! matching the peer's control protocol.

pub mod envelope;
pub mod hooks;

pub use envelope::{classify, CancelNotice, ControlRequest, InboundMessage, ResponseBody};
pub use hooks::{
    reconstruct_hook_input, HookCallbackResult, HookEvent, HookInput, HookOutput,
};
