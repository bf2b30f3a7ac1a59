use pylon_rpc_core::codec::{ReqBody, RspBody, Serializer};
use std::io::Cursor;

/// MessagePack serializer, registered under the msgpack serialization code.
///
/// Structs are encoded as maps with field names, so both ends can evolve
/// independently.
#[derive(Default)]
pub struct MsgpackSerializer;

impl Serializer for MsgpackSerializer {
    fn marshal(&self, body: &dyn ReqBody) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut ser = rmp_serde::Serializer::new(&mut buf).with_struct_map();
        let mut erased = <dyn erased_serde::Serializer>::erase(&mut ser);
        if let Err(e) = body.serialize_into(&mut erased) {
            log::warn!("msgpack marshal error: {:?}", e);
            return Err(e.into());
        }
        Ok(buf)
    }

    fn unmarshal(&self, buf: &[u8], body: &mut dyn RspBody) -> anyhow::Result<()> {
        let mut de = rmp_serde::Deserializer::new(Cursor::new(buf));
        let mut erased = <dyn erased_serde::Deserializer>::erase(&mut de);
        if let Err(e) = body.deserialize_from(&mut erased) {
            log::warn!("msgpack unmarshal error: {:?}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
