//! Terminal handler of the filter chain: serialize, compress and frame the
//! request, round-trip it over the transport, then decode, decompress and
//! unmarshal the response.

use crate::client::options::{options_from_context, Options};
use crate::filter::Handler;
use crate::report;
use async_trait::async_trait;
use pylon_rpc_core::codec::{
    compress, decompress, is_valid_compress_type, is_valid_serialization_type, marshal, unmarshal,
    ReqBody, RspBody, COMPRESS_TYPE_NOOP,
};
use pylon_rpc_core::transport::RoundTripOpt;
use pylon_rpc_core::{Code, Context, Error, Message};
use tracing::debug_span;

pub(crate) struct CallFunc;

#[async_trait]
impl Handler for CallFunc {
    async fn handle(
        &self, ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody,
    ) -> Result<(), Error> {
        let msg = ctx.message();
        let Some(opts) = options_from_context(&ctx) else {
            return Err(Error::frame(Code::ClientEncodeFail, "client: options missing on context"));
        };
        call(&ctx, &msg, req, rsp, &opts).await.map_err(opts.fix_timeout)
    }
}

async fn call(
    ctx: &Context, msg: &Message, req: &dyn ReqBody, rsp: &mut dyn RspBody, opts: &Options,
) -> Result<(), Error> {
    let Some(codec) = opts.codec.clone() else {
        report::CLIENT_CODEC_EMPTY.incr();
        return Err(Error::frame(Code::ClientEncodeFail, "client: codec empty"));
    };

    let req_body_buf = serialize_and_compress(msg, req, opts)?;
    let req_buf = {
        let span = debug_span!("EncodeProtocolHead", request_size = tracing::field::Empty);
        let _enter = span.enter();
        let req_buf = codec
            .encode(msg, &req_body_buf)
            .map_err(|e| Error::frame(Code::ClientEncodeFail, format!("client codec Encode: {e:#}")))?;
        span.record("request_size", req_buf.len());
        req_buf
    };

    let Some(transport) = opts.transport.clone() else {
        return Err(Error::frame(Code::ClientConnectFail, "client: transport empty"));
    };
    let mut call_opts = opts.call_options.clone();
    if opts.enable_multiplexed {
        call_opts.push(RoundTripOpt::Msg(msg.clone()));
        call_opts.push(RoundTripOpt::Multiplexed(true));
    }
    let rsp_buf = match transport.round_trip(ctx, req_buf, &call_opts).await {
        Ok(buf) => buf,
        // Sendonly mode, no response, just return.
        Err(e) if e.is_no_response() => return Ok(()),
        Err(e) => return Err(e),
    };

    let rsp_body_buf = {
        let span = debug_span!("DecodeProtocolHead", response_size = rsp_buf.len());
        let _enter = span.enter();
        codec
            .decode(msg, &rsp_buf)
            .map_err(|e| Error::frame(Code::ClientDecodeFail, format!("client codec Decode: {e:#}")))?
    };

    process_response_buf(msg, rsp, rsp_body_buf, opts)
}

fn serialize_and_compress(
    msg: &Message, req: &dyn ReqBody, opts: &Options,
) -> Result<Vec<u8>, Error> {
    let mut serialization_type = msg.serialization_type();
    if is_valid_serialization_type(opts.current_serialization_type) {
        serialization_type = opts.current_serialization_type;
    }
    let mut req_body_buf = Vec::new();
    {
        let span = debug_span!("Marshal", body_size = tracing::field::Empty);
        let _enter = span.enter();
        if is_valid_serialization_type(serialization_type) {
            req_body_buf = marshal(serialization_type, req).map_err(|e| {
                Error::frame(Code::ClientEncodeFail, format!("client codec Marshal: {e:#}"))
            })?;
        }
        span.record("body_size", req_body_buf.len());
    }

    let mut compress_type = msg.compress_type();
    if is_valid_compress_type(opts.current_compress_type) {
        compress_type = opts.current_compress_type;
    }
    if is_valid_compress_type(compress_type) && compress_type != COMPRESS_TYPE_NOOP {
        let _enter = debug_span!("Compress").entered();
        req_body_buf = compress(compress_type, req_body_buf).map_err(|e| {
            Error::frame(Code::ClientEncodeFail, format!("client codec Compress: {e:#}"))
        })?;
    }
    Ok(req_body_buf)
}

fn process_response_buf(
    msg: &Message, rsp: &mut dyn RspBody, rsp_body_buf: Vec<u8>, opts: &Options,
) -> Result<(), Error> {
    // A response error set by the codec wins over any body bytes.
    if let Some(e) = msg.client_rsp_err() {
        return Err(e);
    }
    if rsp_body_buf.is_empty() {
        return Ok(());
    }

    let mut compress_type = msg.compress_type();
    if is_valid_compress_type(opts.current_compress_type) {
        compress_type = opts.current_compress_type;
    }
    let mut buf = rsp_body_buf;
    if is_valid_compress_type(compress_type) && compress_type != COMPRESS_TYPE_NOOP {
        let _enter = debug_span!("Decompress").entered();
        buf = decompress(compress_type, buf).map_err(|e| {
            Error::frame(Code::ClientDecodeFail, format!("client codec Decompress: {e:#}"))
        })?;
    }

    let mut serialization_type = msg.serialization_type();
    if is_valid_serialization_type(opts.current_serialization_type) {
        serialization_type = opts.current_serialization_type;
    }
    if is_valid_serialization_type(serialization_type) {
        let _enter = debug_span!("Unmarshal", body_size = buf.len()).entered();
        unmarshal(serialization_type, &buf, rsp).map_err(|e| {
            Error::frame(Code::ClientDecodeFail, format!("client codec Unmarshal: {e:#}"))
        })?;
    }
    Ok(())
}
