//! # pylon-rpc
//!
//! This crate is the client-side core of a pluggable RPC framework: one
//! [client::Client::invoke] call resolves a logical service name to a
//! backend node, marshals and frames the request, round-trips it over a
//! transport and walks the response back out, with an interceptor chain
//! wrapped around the whole call.
//!
//! ## Components
//!
//! `pylon-rpc` is built from a collection of crates that provide different
//! functionalities:
//!
//! - [`pylon-rpc-core`](https://docs.rs/pylon-rpc-core): per-call message
//!   and context, error taxonomy, and the codec/selector/transport seams
//! - [`pylon-rpc-codec`](https://docs.rs/pylon-rpc-codec): stock
//!   serializers (JSON, MessagePack, bytes) and compressors (gzip)
//!
//! Everything protocol- or infrastructure-specific plugs in through the
//! core registries: frame codecs and transports by name, serializers and
//! compressors by type code, selectors by target scheme, filters by
//! filter name.
//!
//! ## Usage
//!
//! 1. Register serializers/compressors (e.g.
//!    `pylon_rpc_codec::register_defaults()`) and your protocol's frame
//!    codec and transport.
//! 2. Optionally register per-callee baseline options with
//!    [client::register_baseline].
//! 3. Build a per-call [Context](pylon_rpc_core::Context), attach a
//!    message with the callee info, and call [client::invoke] with
//!    call-site options such as
//!    [with_target](client::with_target)`("ip://10.0.0.1:8000")`.
//!
//! The call returns a framework [Error](pylon_rpc_core::Error) with a
//! numeric code distinguishing route/encode/decode/timeout/network
//! failures; business errors decoded from the response surface through
//! the same channel.

pub mod client;
pub mod filter;
mod report;

// re-export the core model so most users need a single crate
pub use pylon_rpc_core::{
    Attachment, CallType, Code, Context, ContextError, Error, ErrorType, Message, MetaData, Node,
    PeerAddr,
};
