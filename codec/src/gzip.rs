use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pylon_rpc_core::codec::Compressor;
use std::io::{Read, Write};

/// Gzip compressor, registered under the gzip compress code.
#[derive(Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, buf: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(buf)?;
        Ok(enc.finish()?)
    }

    fn decompress(&self, buf: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::new();
        GzDecoder::new(buf).read_to_end(&mut out)?;
        Ok(out)
    }
}
