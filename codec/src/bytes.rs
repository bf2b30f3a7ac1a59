use pylon_rpc_core::codec::{ReqBody, RspBody, Serializer};

/// Pass-through serializer for pre-encoded payloads: the body must be a
/// `Vec<u8>` and travels byte-for-byte.
#[derive(Default)]
pub struct BytesSerializer;

impl Serializer for BytesSerializer {
    fn marshal(&self, body: &dyn ReqBody) -> anyhow::Result<Vec<u8>> {
        match body.as_any().downcast_ref::<Vec<u8>>() {
            Some(buf) => Ok(buf.clone()),
            None => anyhow::bail!("bytes serializer: request body is not Vec<u8>"),
        }
    }

    fn unmarshal(&self, buf: &[u8], body: &mut dyn RspBody) -> anyhow::Result<()> {
        match body.as_any_mut().downcast_mut::<Vec<u8>>() {
            Some(out) => {
                *out = buf.to_vec();
                Ok(())
            }
            None => anyhow::bail!("bytes serializer: response body is not Vec<u8>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_passthrough() {
        let s = BytesSerializer;
        let req: Vec<u8> = vec![0xde, 0xad];
        let buf = s.marshal(&req).expect("marshal");
        assert_eq!(buf, req);
        let mut rsp: Vec<u8> = Vec::new();
        s.unmarshal(&buf, &mut rsp).expect("unmarshal");
        assert_eq!(rsp, req);
    }

    #[test]
    fn test_bytes_rejects_other_types() {
        let s = BytesSerializer;
        assert!(s.marshal(&"not bytes".to_string()).is_err());
        let mut rsp = String::new();
        assert!(s.unmarshal(b"x", &mut rsp).is_err());
    }
}
