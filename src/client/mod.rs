//! Client entry point: [Client::invoke] performs one unary RPC through the
//! option merge, filter chain, node selection and codec/transport pipeline.

mod call;
pub mod options;
pub mod route;

pub use options::{
    context_with_options, context_with_options_immutable, options_from_context, options_immutable,
    register_baseline, with_attachment, with_call_option, with_call_type, with_callee_method,
    with_caller_service_name, with_codec, with_compress_type, with_current_compress_type,
    with_current_serialization_type, with_disable_filter, with_disable_service_router, with_filter,
    with_filter_names, with_meta_data, with_multiplexed, with_network, with_protocol, with_req_head,
    with_rsp_head, with_select_option, with_selector, with_selector_node, with_serialization_type,
    with_service_name, with_should_err_report_to_selector, with_target, with_timeout, with_transport,
    ClientOpt, NodeCell, NodeInfo, Options,
};
pub use route::{SelectorFilter, SELECTOR_FILTER_NAME};

use crate::client::call::CallFunc;
use crate::client::options::convert_to_full_link_timeout;
use crate::filter::FilterChain;
use pylon_rpc_core::codec::{
    is_valid_compress_type, is_valid_serialization_type, ReqBody, RspBody, COMPRESS_TYPE_NOOP,
};
use pylon_rpc_core::selector::SelectOption;
use pylon_rpc_core::{Context, Error, Message};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Stateless handle that initiates RPCs; concurrent callers share one
/// freely. The default instance is all most programs need.
#[derive(Clone, Copy, Debug, Default)]
pub struct Client;

impl Client {
    pub fn new() -> Self {
        Self
    }

    /// Perform one unary RPC: resolve the callee, run the filter chain and
    /// ship `req` / fill `rsp` through the configured codec and transport.
    pub async fn invoke(
        &self, ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody, call_opts: &[ClientOpt],
    ) -> Result<(), Error> {
        // Each backend call runs on its own message; the stub layer usually
        // attaches one carrying the callee info before invoking.
        let (ctx, msg) = ctx.ensure_message();

        let span = tracing::info_span!(
            "client",
            rpc_name = tracing::field::Empty,
            filter_names = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        let result = self
            .invoke_inner(ctx, &msg, req, rsp, call_opts, &span)
            .instrument(span.clone())
            .await;

        span.record("rpc_name", msg.client_rpc_name().as_str());
        match &result {
            Err(e) => {
                span.record("error", e.to_string().as_str());
            }
            Ok(()) => {
                if let Some(e) = msg.client_rsp_err() {
                    span.record("error", e.to_string().as_str());
                }
            }
        };
        result
    }

    async fn invoke_inner(
        &self, mut ctx: Context, msg: &Message, req: &dyn ReqBody, rsp: &mut dyn RspBody,
        call_opts: &[ClientOpt], span: &tracing::Span,
    ) -> Result<(), Error> {
        let mut opts = get_options(msg, call_opts)?;
        update_msg(msg, &mut opts);

        // Compose the per-call timeout with any deadline inherited from
        // upstream; when the inherited one is the tighter bound, a timeout
        // surfacing from below is re-tagged as full-link.
        let full_link_deadline = ctx.deadline();
        if opts.timeout > Duration::ZERO {
            ctx = ctx.with_timeout(opts.timeout);
        }
        if let Some(deadline) = ctx.deadline() {
            msg.set_request_timeout(deadline.saturating_duration_since(Instant::now()));
        }
        if let Some(full_link) = full_link_deadline {
            if opts.timeout.is_zero() || full_link < Instant::now() + opts.timeout {
                opts.fix_timeout = convert_to_full_link_timeout;
            }
        }

        let chain = fix_filters(&mut opts);
        span.record("filter_names", opts.filter_names.join(",").as_str());

        let ctx = context_with_options(ctx, Arc::new(opts));
        chain.run(ctx, req, rsp, &CallFunc).await
    }
}

/// One unary RPC through the default client.
pub async fn invoke(
    ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody, call_opts: &[ClientOpt],
) -> Result<(), Error> {
    Client::new().invoke(ctx, req, rsp, call_opts).await
}

/// Clone the callee baseline, derive service-info select options from the
/// message, then apply call-site options last so they win.
fn get_options(msg: &Message, call_opts: &[ClientOpt]) -> Result<Options, Error> {
    let mut opts = options::baseline_for(&msg.callee_service_name());
    opts.select_options.extend(service_info_options(msg));
    for o in call_opts {
        o.apply(&mut opts);
    }
    opts.parse_target()?;
    Ok(opts)
}

fn service_info_options(msg: &Message) -> Vec<SelectOption> {
    if msg.namespace().is_empty() {
        return Vec::new();
    }
    vec![
        SelectOption::SourceNamespace(msg.namespace()),
        SelectOption::SourceServiceName(msg.caller_service_name()),
        SelectOption::SourceEnvName(msg.env_name()),
        SelectOption::EnvTransfer(msg.env_transfer()),
        SelectOption::SourceSetName(msg.caller_set_name()),
    ]
}

/// Push option fields into the message; call-site option beats baseline
/// beats message default.
fn update_msg(msg: &Message, opts: &mut Options) {
    if !opts.service_name.is_empty() {
        // From the client's perspective the callee is the backend service.
        msg.set_callee_service_name(&opts.service_name);
    }
    if opts.endpoint.is_empty() {
        // No explicit target: the selector addresses the callee name.
        opts.endpoint = msg.callee_service_name();
    }
    if !opts.callee_method.is_empty() {
        msg.set_callee_method(&opts.callee_method);
    }

    if !opts.meta_data.is_empty() {
        let mut md = msg.client_meta_data();
        for (k, v) in &opts.meta_data {
            md.insert(k.clone(), v.clone());
        }
        msg.set_client_meta_data(md);
    }

    if !opts.caller_service_name.is_empty() {
        msg.set_caller_service_name(&opts.caller_service_name);
    }
    if is_valid_serialization_type(opts.serialization_type) {
        msg.set_serialization_type(opts.serialization_type);
    }
    if is_valid_compress_type(opts.compress_type) && opts.compress_type != COMPRESS_TYPE_NOOP {
        msg.set_compress_type(opts.compress_type);
    }

    if let Some(head) = &opts.req_head {
        msg.set_client_req_head(head.clone());
    }
    if let Some(head) = &opts.rsp_head {
        msg.set_client_rsp_head(head.clone());
    }

    msg.set_call_type(opts.call_type);

    if let Some(attm) = &opts.attachment {
        msg.set_attachment(attm.clone());
    }
}

/// The effective chain: with filters disabled or none configured, only the
/// selector filter runs; otherwise the selector filter is appended last
/// unless the caller pinned its position.
fn fix_filters(opts: &mut Options) -> FilterChain {
    if opts.disable_filter || opts.filters.is_empty() {
        opts.filter_names.push(SELECTOR_FILTER_NAME.to_string());
        return FilterChain::new(vec![Arc::new(SelectorFilter)]);
    }
    if !opts.selector_filter_pos_fixed {
        opts.filters.push(Arc::new(SelectorFilter));
        opts.filter_names.push(SELECTOR_FILTER_NAME.to_string());
    }
    FilterChain::new(opts.filters.clone())
}
