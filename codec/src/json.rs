use pylon_rpc_core::codec::{ReqBody, RspBody, Serializer};

/// JSON serializer, registered under the JSON serialization code.
#[derive(Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn marshal(&self, body: &dyn ReqBody) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::new(&mut buf);
        let mut erased = <dyn erased_serde::Serializer>::erase(&mut ser);
        if let Err(e) = body.serialize_into(&mut erased) {
            log::warn!("json marshal error: {:?}", e);
            return Err(e.into());
        }
        Ok(buf)
    }

    fn unmarshal(&self, buf: &[u8], body: &mut dyn RspBody) -> anyhow::Result<()> {
        let mut de = serde_json::Deserializer::from_slice(buf);
        let mut erased = <dyn erased_serde::Deserializer>::erase(&mut de);
        if let Err(e) = body.deserialize_from(&mut erased) {
            log::warn!("json unmarshal error: {:?}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
