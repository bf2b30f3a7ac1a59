//! # pylon-rpc-codec
//!
//! Stock serializers and compressors for `pylon-rpc`: JSON, MessagePack,
//! a byte pass-through, and gzip. Call [register_defaults] once at startup
//! to make them available to the invocation pipeline under the standard
//! type codes.

mod bytes;
mod gzip;
mod json;
mod msgpack;

pub use bytes::BytesSerializer;
pub use gzip::GzipCompressor;
pub use json::JsonSerializer;
pub use msgpack::MsgpackSerializer;

use pylon_rpc_core::codec::{
    register_compressor, register_serializer, COMPRESS_TYPE_GZIP, SERIALIZATION_TYPE_JSON,
    SERIALIZATION_TYPE_MSGPACK, SERIALIZATION_TYPE_NOOP,
};
use std::sync::Arc;

/// Register the stock serializers and compressors under the standard type
/// codes. Idempotent; later registrations under the same code replace
/// earlier ones.
pub fn register_defaults() {
    register_serializer(SERIALIZATION_TYPE_JSON, Arc::new(JsonSerializer));
    register_serializer(SERIALIZATION_TYPE_MSGPACK, Arc::new(MsgpackSerializer));
    register_serializer(SERIALIZATION_TYPE_NOOP, Arc::new(BytesSerializer));
    register_compressor(COMPRESS_TYPE_GZIP, Arc::new(GzipCompressor));
}
