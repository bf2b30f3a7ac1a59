//! Per-call options: a snapshot assembled from the per-callee baseline,
//! call-site option constructors and the parsed target string.

use crate::filter::{self, Filter};
use crate::client::route::{SelectorFilter, SELECTOR_FILTER_NAME};
use dashmap::DashMap;
use log::warn;
use parking_lot::Mutex;
use pylon_rpc_core::codec::{
    ClientCodec, COMPRESS_TYPE_NOOP, COMPRESS_TYPE_UNSUPPORTED, SERIALIZATION_TYPE_UNSUPPORTED,
};
use pylon_rpc_core::selector::{self, SelectOption, Selector};
use pylon_rpc_core::transport::{self, ClientTransport, RoundTripOpt};
use pylon_rpc_core::{Attachment, CallType, Code, Context, Error, MetaData, Node};
use std::any::Any;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Snapshot of the node selected for a finished call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeInfo {
    pub service_name: String,
    pub address: String,
    pub cost: Duration,
}

/// Shared cell a caller hands in via [with_selector_node] to learn which
/// backend instance served the call.
#[derive(Clone, Default)]
pub struct NodeCell(Arc<Mutex<Option<NodeInfo>>>);

impl NodeCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NodeInfo> {
        self.0.lock().clone()
    }

    pub(crate) fn set(&self, node: &Node, address: String, cost: Duration) {
        *self.0.lock() = Some(NodeInfo {
            service_name: node.service_name.clone(),
            address,
            cost,
        });
    }
}

fn keep_error(e: Error) -> Error {
    e
}

/// Replaces a per-call timeout error with the full-link kind when the
/// deadline inherited from upstream was the tighter bound.
pub(crate) fn convert_to_full_link_timeout(mut e: Error) -> Error {
    if e == Code::ClientTimeout {
        e.code = Code::ClientFullLinkTimeout as i32;
    }
    e
}

/// Per-call configuration snapshot.
///
/// Built by `invoke` from the registered baseline plus call-site options,
/// then attached to the context. Filters read it through
/// [options_from_context]; a filter that needs to mutate it clones first
/// and republishes the clone via [context_with_options], which is also
/// what isolates concurrent retry/hedging attempts from each other.
#[derive(Clone)]
pub struct Options {
    /// overrides the callee service name recorded on the message
    pub service_name: String,
    pub caller_service_name: String,
    pub callee_method: String,
    /// fallback network when the selected node does not carry one
    pub network: String,
    /// per-call timeout, zero means none
    pub timeout: Duration,
    pub serialization_type: i32,
    /// overrides the wire serialization for body processing only
    pub current_serialization_type: i32,
    pub compress_type: i32,
    pub current_compress_type: i32,
    pub meta_data: MetaData,
    pub filters: Vec<Arc<dyn Filter>>,
    pub filter_names: Vec<String>,
    pub select_options: Vec<SelectOption>,
    pub call_options: Vec<RoundTripOpt>,
    pub codec: Option<Arc<dyn ClientCodec>>,
    pub transport: Option<Arc<dyn ClientTransport>>,
    pub selector: Option<Arc<dyn Selector>>,
    pub req_head: Option<Arc<dyn Any + Send + Sync>>,
    pub rsp_head: Option<Arc<dyn Any + Send + Sync>>,
    pub call_type: CallType,
    pub enable_multiplexed: bool,
    pub disable_filter: bool,
    pub disable_service_router: bool,
    pub(crate) target: String,
    pub(crate) endpoint: String,
    pub(crate) attachment: Option<Attachment>,
    pub(crate) node: Option<NodeCell>,
    pub(crate) should_err_report_to_selector: Arc<dyn Fn(&Error) -> bool + Send + Sync>,
    pub(crate) fix_timeout: fn(Error) -> Error,
    pub(crate) selector_filter_pos_fixed: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            caller_service_name: String::new(),
            callee_method: String::new(),
            network: "tcp".to_string(),
            timeout: Duration::ZERO,
            serialization_type: SERIALIZATION_TYPE_UNSUPPORTED,
            current_serialization_type: SERIALIZATION_TYPE_UNSUPPORTED,
            // the noop default is never pushed onto the message
            compress_type: COMPRESS_TYPE_NOOP,
            current_compress_type: COMPRESS_TYPE_UNSUPPORTED,
            meta_data: MetaData::new(),
            filters: Vec::new(),
            filter_names: Vec::new(),
            select_options: Vec::new(),
            call_options: Vec::new(),
            codec: None,
            transport: None,
            selector: None,
            req_head: None,
            rsp_head: None,
            call_type: CallType::Unary,
            enable_multiplexed: false,
            disable_filter: false,
            disable_service_router: false,
            target: String::new(),
            endpoint: String::new(),
            attachment: None,
            node: None,
            should_err_report_to_selector: Arc::new(|_| false),
            fix_timeout: keep_error,
            selector_filter_pos_fixed: false,
        }
    }
}

impl Options {
    /// The endpoint the selector resolves, from the target's authority or
    /// defaulted to the callee service name.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Split `scheme://endpoint[?query]` and pick the selector registered
    /// under the scheme. An empty target leaves the options untouched.
    pub(crate) fn parse_target(&mut self) -> Result<(), Error> {
        if self.target.is_empty() {
            return Ok(());
        }
        let Some((scheme, rest)) = self.target.split_once("://") else {
            return Err(Error::frame(
                Code::ClientRouteErr,
                format!("client: target {} scheme invalid, must be scheme://endpoint", self.target),
            ));
        };
        let endpoint = rest.split('?').next().unwrap_or_default();
        if scheme.is_empty() || endpoint.is_empty() {
            return Err(Error::frame(
                Code::ClientRouteErr,
                format!("client: target {} scheme or endpoint empty", self.target),
            ));
        }
        let Some(s) = selector::selector(scheme) else {
            return Err(Error::frame(
                Code::ClientRouteErr,
                format!("client: selector for scheme {} not registered", scheme),
            ));
        };
        self.selector = Some(s);
        self.endpoint = endpoint.to_string();
        Ok(())
    }

    /// Adopt the selected node's dialing info for the transport.
    pub(crate) fn load_node_config(&mut self, node: &Node) {
        self.call_options.push(RoundTripOpt::DialAddress(node.address.clone()));
        if !node.network.is_empty() {
            self.network = node.network.clone();
            self.call_options.push(RoundTripOpt::DialNetwork(node.network.clone()));
        }
    }
}

/// A call-site option. Options apply in order, later ones win.
pub struct ClientOpt(Box<dyn Fn(&mut Options) + Send + Sync>);

impl ClientOpt {
    fn new(f: impl Fn(&mut Options) + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    #[inline]
    pub(crate) fn apply(&self, opts: &mut Options) {
        (self.0)(opts)
    }
}

/// Backend service name the call is addressed to.
pub fn with_service_name(name: impl Into<String>) -> ClientOpt {
    let name = name.into();
    ClientOpt::new(move |o| o.service_name = name.clone())
}

pub fn with_caller_service_name(name: impl Into<String>) -> ClientOpt {
    let name = name.into();
    ClientOpt::new(move |o| o.caller_service_name = name.clone())
}

pub fn with_callee_method(method: impl Into<String>) -> ClientOpt {
    let method = method.into();
    ClientOpt::new(move |o| o.callee_method = method.clone())
}

/// Resolution target `scheme://endpoint`; the scheme picks the selector.
pub fn with_target(target: impl Into<String>) -> ClientOpt {
    let target = target.into();
    ClientOpt::new(move |o| o.target = target.clone())
}

pub fn with_timeout(timeout: Duration) -> ClientOpt {
    ClientOpt::new(move |o| o.timeout = timeout)
}

pub fn with_network(network: impl Into<String>) -> ClientOpt {
    let network = network.into();
    ClientOpt::new(move |o| o.network = network.clone())
}

/// Serialization type recorded on the message (what goes on the wire).
pub fn with_serialization_type(t: i32) -> ClientOpt {
    ClientOpt::new(move |o| o.serialization_type = t)
}

/// Serialization type used for body processing without touching the wire
/// head, for proxies re-encoding foreign payloads.
pub fn with_current_serialization_type(t: i32) -> ClientOpt {
    ClientOpt::new(move |o| o.current_serialization_type = t)
}

pub fn with_compress_type(t: i32) -> ClientOpt {
    ClientOpt::new(move |o| o.compress_type = t)
}

pub fn with_current_compress_type(t: i32) -> ClientOpt {
    ClientOpt::new(move |o| o.current_compress_type = t)
}

/// One metadata key transparently transmitted to the backend. Merged over
/// existing message metadata, option keys win.
pub fn with_meta_data(key: impl Into<String>, value: Vec<u8>) -> ClientOpt {
    let key = key.into();
    ClientOpt::new(move |o| {
        o.meta_data.insert(key.clone(), value.clone());
    })
}

/// Append a filter. Naming the selector filter pins its position instead
/// of letting the chain append it last.
pub fn with_filter(f: Arc<dyn Filter>) -> ClientOpt {
    ClientOpt::new(move |o| {
        if f.name() == SELECTOR_FILTER_NAME {
            o.selector_filter_pos_fixed = true;
        }
        o.filter_names.push(f.name().to_string());
        o.filters.push(f.clone());
    })
}

/// Append registered filters by name. `"selector"` resolves to the selector
/// filter and pins its position; unknown names are skipped with a warning.
pub fn with_filter_names<I, S>(names: I) -> ClientOpt
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    ClientOpt::new(move |o| {
        for name in &names {
            if name == SELECTOR_FILTER_NAME {
                o.selector_filter_pos_fixed = true;
                o.filter_names.push(name.clone());
                o.filters.push(Arc::new(SelectorFilter));
                continue;
            }
            match filter::get(name) {
                Some(f) => {
                    o.filter_names.push(name.clone());
                    o.filters.push(f);
                }
                None => warn!("client: filter {} not registered, skipped", name),
            }
        }
    })
}

/// Hand in a cell that receives the selected node's info after the call.
pub fn with_selector_node(cell: NodeCell) -> ClientOpt {
    ClientOpt::new(move |o| o.node = Some(cell.clone()))
}

pub fn with_req_head(head: Arc<dyn Any + Send + Sync>) -> ClientOpt {
    ClientOpt::new(move |o| o.req_head = Some(head.clone()))
}

pub fn with_rsp_head(head: Arc<dyn Any + Send + Sync>) -> ClientOpt {
    ClientOpt::new(move |o| o.rsp_head = Some(head.clone()))
}

pub fn with_call_type(t: CallType) -> ClientOpt {
    ClientOpt::new(move |o| o.call_type = t)
}

/// Share one connection between concurrent calls; the transport receives
/// the message for request-id correlation.
pub fn with_multiplexed(enable: bool) -> ClientOpt {
    ClientOpt::new(move |o| o.enable_multiplexed = enable)
}

/// Run only the selector filter, dropping everything else from the chain.
pub fn with_disable_filter() -> ClientOpt {
    ClientOpt::new(|o| o.disable_filter = true)
}

/// Clear environment routing info instead of transferring it downstream.
pub fn with_disable_service_router() -> ClientOpt {
    ClientOpt::new(|o| o.disable_service_router = true)
}

/// Predicate deciding whether a non-network error still counts against the
/// node in selector accounting.
pub fn with_should_err_report_to_selector(
    f: impl Fn(&Error) -> bool + Send + Sync + 'static,
) -> ClientOpt {
    let f = Arc::new(f);
    ClientOpt::new(move |o| o.should_err_report_to_selector = f.clone())
}

/// Out-of-band payload stored in the message's common meta for codecs that
/// support it.
pub fn with_attachment(attm: Attachment) -> ClientOpt {
    ClientOpt::new(move |o| o.attachment = Some(attm.clone()))
}

pub fn with_select_option(opt: SelectOption) -> ClientOpt {
    ClientOpt::new(move |o| o.select_options.push(opt.clone()))
}

pub fn with_call_option(opt: RoundTripOpt) -> ClientOpt {
    ClientOpt::new(move |o| o.call_options.push(opt.clone()))
}

pub fn with_codec(codec: Arc<dyn ClientCodec>) -> ClientOpt {
    ClientOpt::new(move |o| o.codec = Some(codec.clone()))
}

pub fn with_transport(t: Arc<dyn ClientTransport>) -> ClientOpt {
    ClientOpt::new(move |o| o.transport = Some(t.clone()))
}

pub fn with_selector(s: Arc<dyn Selector>) -> ClientOpt {
    ClientOpt::new(move |o| o.selector = Some(s.clone()))
}

/// Pick the codec (and transport, when one is registered under the same
/// name) by protocol name.
pub fn with_protocol(name: impl Into<String>) -> ClientOpt {
    let name = name.into();
    ClientOpt::new(move |o| {
        match pylon_rpc_core::codec::client_codec(&name) {
            Some(c) => o.codec = Some(c),
            None => warn!("client: codec {} not registered", name),
        }
        if let Some(t) = transport::transport(&name) {
            o.transport = Some(t);
        }
    })
}

static BASELINES: LazyLock<DashMap<String, Arc<Options>>> = LazyLock::new(DashMap::new);

/// Register the baseline options applied to every call addressed to
/// `callee`. Expected at startup; calls clone the baseline, so later
/// re-registration does not affect in-flight calls.
pub fn register_baseline(callee: &str, opts: &[ClientOpt]) {
    let mut baseline = Options::default();
    for o in opts {
        o.apply(&mut baseline);
    }
    BASELINES.insert(callee.to_string(), Arc::new(baseline));
}

/// A fresh copy of the baseline registered for `callee`, or defaults.
pub(crate) fn baseline_for(callee: &str) -> Options {
    match BASELINES.get(callee) {
        Some(b) => (**b.value()).clone(),
        None => Options::default(),
    }
}

/// Attach `opts` to the context for the downstream chain.
pub fn context_with_options(ctx: Context, opts: Arc<Options>) -> Context {
    ctx.with_value(opts)
}

/// The options attached to the context, if any.
pub fn options_from_context(ctx: &Context) -> Option<Arc<Options>> {
    ctx.value::<Options>()
}

struct OptionsImmutableMark;

/// Mark the context so downstream filters treat the attached options as
/// shared between concurrent attempts. Fan-out filters (retry/hedging) set
/// this before running the chain suffix more than once; the selector
/// filter then works on its own clone instead of mutating in place.
pub fn context_with_options_immutable(ctx: Context) -> Context {
    ctx.with_value(Arc::new(OptionsImmutableMark))
}

pub fn options_immutable(ctx: &Context) -> bool {
    ctx.value::<OptionsImmutableMark>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pylon_rpc_core::codec::SERIALIZATION_TYPE_JSON;

    #[test]
    fn test_call_site_options_override_baseline() {
        register_baseline(
            "test.precedence.svc",
            &[
                with_timeout(Duration::from_secs(1)),
                with_callee_method("FromBaseline"),
                with_serialization_type(SERIALIZATION_TYPE_JSON),
            ],
        );
        let mut opts = baseline_for("test.precedence.svc");
        assert_eq!(opts.timeout, Duration::from_secs(1));

        for o in [with_timeout(Duration::from_secs(2)), with_callee_method("FromCall")] {
            o.apply(&mut opts);
        }
        assert_eq!(opts.timeout, Duration::from_secs(2));
        assert_eq!(opts.callee_method, "FromCall");
        // untouched baseline fields survive
        assert_eq!(opts.serialization_type, SERIALIZATION_TYPE_JSON);
    }

    #[test]
    fn test_baseline_is_copy_on_use() {
        register_baseline("test.copy.svc", &[with_timeout(Duration::from_secs(3))]);
        let mut first = baseline_for("test.copy.svc");
        first.timeout = Duration::from_secs(9);
        let second = baseline_for("test.copy.svc");
        assert_eq!(second.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_parse_target() {
        let mut opts = Options::default();
        opts.target = "ip://10.0.0.1:8000?set=a".to_string();
        opts.parse_target().expect("parse");
        assert_eq!(opts.endpoint(), "10.0.0.1:8000");
        assert!(opts.selector.is_some());

        let mut opts = Options::default();
        opts.target = "no-scheme-here".to_string();
        assert_eq!(opts.parse_target().expect_err("must fail"), Code::ClientRouteErr);

        let mut opts = Options::default();
        opts.target = "mystery://ep".to_string();
        assert_eq!(opts.parse_target().expect_err("must fail"), Code::ClientRouteErr);

        let mut opts = Options::default();
        opts.parse_target().expect("empty target is fine");
        assert!(opts.selector.is_none());
    }

    #[test]
    fn test_load_node_config() {
        let mut opts = Options::default();
        let node =
            Node { address: "10.1.1.1:90".to_string(), network: "udp".to_string(), ..Default::default() };
        opts.load_node_config(&node);
        assert_eq!(opts.network, "udp");
        assert_eq!(opts.call_options.len(), 2);
        assert!(matches!(&opts.call_options[0], RoundTripOpt::DialAddress(a) if a == "10.1.1.1:90"));
    }

    #[test]
    fn test_options_on_context() {
        let ctx = Context::new();
        assert!(options_from_context(&ctx).is_none());
        assert!(!options_immutable(&ctx));
        let ctx = context_with_options(ctx, Arc::new(Options::default()));
        assert!(options_from_context(&ctx).is_some());
        let ctx = context_with_options_immutable(ctx);
        assert!(options_immutable(&ctx));
    }

    #[test]
    fn test_full_link_conversion_only_touches_timeout() {
        let e = convert_to_full_link_timeout(Error::frame(Code::ClientTimeout, "t"));
        assert_eq!(e, Code::ClientFullLinkTimeout);
        let e = convert_to_full_link_timeout(Error::frame(Code::ClientNetErr, "n"));
        assert_eq!(e, Code::ClientNetErr);
        let e = convert_to_full_link_timeout(Error::business(101, "b"));
        assert!(!e.is_framework());
        assert_eq!(e.code, 101);
    }
}
