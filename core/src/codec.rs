//! Serialization, compression and protocol framing seams.
//!
//! Serializers and compressors are looked up by small integer codes so the
//! protocol head can carry them; frame codecs are looked up by protocol
//! name. Registration happens at startup, lookup is lock-free afterwards.
//!
//! A lookup miss is a silent pass-through (no marshalling / no
//! decompression happens): this is how opaque pre-encoded payloads travel
//! through the pipeline untouched. [set_strict_types] turns a miss for a
//! valid code into an error for deployments that prefer failing loudly on
//! misconfiguration.

use crate::message::Message;
use dashmap::DashMap;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

pub const SERIALIZATION_TYPE_PB: i32 = 0;
pub const SERIALIZATION_TYPE_JSON: i32 = 2;
pub const SERIALIZATION_TYPE_MSGPACK: i32 = 3;
/// Pass-through for pre-encoded `Vec<u8>` bodies
pub const SERIALIZATION_TYPE_NOOP: i32 = 4;
pub const SERIALIZATION_TYPE_UNSUPPORTED: i32 = -1;

pub const COMPRESS_TYPE_NOOP: i32 = 0;
pub const COMPRESS_TYPE_GZIP: i32 = 1;
pub const COMPRESS_TYPE_UNSUPPORTED: i32 = -1;

/// User defined serialization/compress codes start here, below is reserved
/// for the framework.
pub const TYPE_CODE_USER_FLOOR: i32 = 1000;

#[inline]
pub fn is_valid_serialization_type(t: i32) -> bool {
    t >= SERIALIZATION_TYPE_PB
}

#[inline]
pub fn is_valid_compress_type(t: i32) -> bool {
    t >= COMPRESS_TYPE_NOOP
}

/// Type-erased request body crossing the filter chain.
///
/// Blanket-implemented for anything `serde::Serialize`, so user request
/// structs need no extra trait impls. `as_any` lets format-fixed
/// serializers (like the byte pass-through) look at the concrete type.
pub trait ReqBody: Send + Sync {
    fn serialize_into(
        &self, serializer: &mut dyn erased_serde::Serializer,
    ) -> Result<(), erased_serde::Error>;

    fn as_any(&self) -> &dyn Any;
}

impl<T> ReqBody for T
where
    T: serde::Serialize + Send + Sync + 'static,
{
    #[inline]
    fn serialize_into(
        &self, serializer: &mut dyn erased_serde::Serializer,
    ) -> Result<(), erased_serde::Error> {
        erased_serde::Serialize::erased_serialize(self, serializer)
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Type-erased response body, filled in place by the unmarshal stage.
pub trait RspBody: Send {
    fn deserialize_from(
        &mut self, deserializer: &mut dyn erased_serde::Deserializer,
    ) -> Result<(), erased_serde::Error>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> RspBody for T
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    #[inline]
    fn deserialize_from(
        &mut self, deserializer: &mut dyn erased_serde::Deserializer,
    ) -> Result<(), erased_serde::Error> {
        *self = erased_serde::deserialize(deserializer)?;
        Ok(())
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Symmetric marshal/unmarshal over type-erased bodies.
pub trait Serializer: Send + Sync {
    fn marshal(&self, body: &dyn ReqBody) -> anyhow::Result<Vec<u8>>;

    fn unmarshal(&self, buf: &[u8], body: &mut dyn RspBody) -> anyhow::Result<()>;
}

/// Symmetric compress/decompress over byte buffers.
pub trait Compressor: Send + Sync {
    fn compress(&self, buf: &[u8]) -> anyhow::Result<Vec<u8>>;

    fn decompress(&self, buf: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Protocol framing for the client side of a call.
///
/// `encode` wraps a serialized body into a wire frame, `decode` unwraps a
/// wire frame into the response body bytes. Both read and write protocol
/// head state on the [Message]; in particular `decode` is responsible for
/// moving a response error into [Message::set_client_rsp_err].
pub trait ClientCodec: Send + Sync {
    fn encode(&self, msg: &Message, body: &[u8]) -> anyhow::Result<Vec<u8>>;

    fn decode(&self, msg: &Message, frame: &[u8]) -> anyhow::Result<Vec<u8>>;
}

static SERIALIZERS: LazyLock<DashMap<i32, Arc<dyn Serializer>>> = LazyLock::new(DashMap::new);
static COMPRESSORS: LazyLock<DashMap<i32, Arc<dyn Compressor>>> = LazyLock::new(DashMap::new);
static CODECS: LazyLock<DashMap<String, Arc<dyn ClientCodec>>> = LazyLock::new(DashMap::new);
static STRICT_TYPES: AtomicBool = AtomicBool::new(false);

/// When on, a registry miss for a valid type code is an error instead of a
/// silent pass-through. Off by default.
pub fn set_strict_types(strict: bool) {
    STRICT_TYPES.store(strict, Ordering::Relaxed);
}

#[inline]
fn strict_types() -> bool {
    STRICT_TYPES.load(Ordering::Relaxed)
}

pub fn register_serializer(code: i32, s: Arc<dyn Serializer>) {
    SERIALIZERS.insert(code, s);
}

pub fn serializer(code: i32) -> Option<Arc<dyn Serializer>> {
    SERIALIZERS.get(&code).map(|s| s.value().clone())
}

pub fn register_compressor(code: i32, c: Arc<dyn Compressor>) {
    COMPRESSORS.insert(code, c);
}

pub fn compressor(code: i32) -> Option<Arc<dyn Compressor>> {
    COMPRESSORS.get(&code).map(|c| c.value().clone())
}

pub fn register_client_codec(name: &str, c: Arc<dyn ClientCodec>) {
    CODECS.insert(name.to_string(), c);
}

pub fn client_codec(name: &str) -> Option<Arc<dyn ClientCodec>> {
    CODECS.get(name).map(|c| c.value().clone())
}

/// Marshal `body` with the serializer registered under `code`.
/// A miss yields an empty buffer (or an error in strict mode).
pub fn marshal(code: i32, body: &dyn ReqBody) -> anyhow::Result<Vec<u8>> {
    match serializer(code) {
        Some(s) => s.marshal(body),
        None if strict_types() => anyhow::bail!("serializer {} not registered", code),
        None => Ok(Vec::new()),
    }
}

/// Unmarshal `buf` into `body` with the serializer registered under `code`.
/// A miss leaves `body` untouched (or errors in strict mode).
pub fn unmarshal(code: i32, buf: &[u8], body: &mut dyn RspBody) -> anyhow::Result<()> {
    match serializer(code) {
        Some(s) => s.unmarshal(buf, body),
        None if strict_types() => anyhow::bail!("serializer {} not registered", code),
        None => Ok(()),
    }
}

/// Compress `buf` with the compressor registered under `code`.
/// The noop code and a registry miss return the buffer unchanged.
pub fn compress(code: i32, buf: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    if code == COMPRESS_TYPE_NOOP {
        return Ok(buf);
    }
    match compressor(code) {
        Some(c) => c.compress(&buf),
        None if strict_types() => anyhow::bail!("compressor {} not registered", code),
        None => Ok(buf),
    }
}

/// Inverse of [compress].
pub fn decompress(code: i32, buf: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    if code == COMPRESS_TYPE_NOOP {
        return Ok(buf);
    }
    match compressor(code) {
        Some(c) => c.decompress(&buf),
        None if strict_types() => anyhow::bail!("compressor {} not registered", code),
        None => Ok(buf),
    }
}
