//! Naming seam: resolve a logical endpoint to one backend [Node] and feed
//! call outcomes back for health/load accounting.

use crate::context::Context;
use crate::error::{Code, Error};
use crate::node::Node;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Caller-side info passed down to the selector for service routing.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectOption {
    SourceNamespace(String),
    SourceServiceName(String),
    SourceEnvName(String),
    SourceSetName(String),
    EnvTransfer(String),
    /// stable routing key for consistent-hash balancers
    Key(String),
    /// network to dial selected nodes over, for selectors whose backend
    /// does not record one (tcp/udp/unix...)
    Network(String),
}

/// A naming plugin: `select` resolves an endpoint to a node, `report`
/// records the observed outcome so the plugin can adjust health and load.
///
/// `select` may block on I/O; implementations must observe `ctx` for
/// cancellation. Both methods must be safe to call concurrently.
#[async_trait]
pub trait Selector: Send + Sync {
    async fn select(
        &self, ctx: &Context, endpoint: &str, opts: &[SelectOption],
    ) -> Result<Node, Error>;

    fn report(&self, node: &Node, cost: Duration, err: Option<&Error>) -> Result<(), Error>;
}

static SELECTORS: LazyLock<DashMap<String, Arc<dyn Selector>>> = LazyLock::new(|| {
    let m: DashMap<String, Arc<dyn Selector>> = DashMap::new();
    let direct = Arc::new(IpSelector::default());
    // addressing without a naming service: the endpoint is the address list
    m.insert("ip".to_string(), direct.clone());
    m.insert("dns".to_string(), direct);
    m
});

/// Register a selector plugin under a target scheme.
pub fn register_selector(scheme: &str, s: Arc<dyn Selector>) {
    SELECTORS.insert(scheme.to_string(), s);
}

pub fn selector(scheme: &str) -> Option<Arc<dyn Selector>> {
    SELECTORS.get(scheme).map(|s| s.value().clone())
}

/// Direct addressing selector: the endpoint is `host:port` or a
/// comma-separated list round-robined across calls. Name resolution is left
/// to the transport, which is also why this selector backs the `dns`
/// scheme. `report` is a no-op.
#[derive(Default)]
pub struct IpSelector {
    rr_counter: AtomicUsize,
}

#[async_trait]
impl Selector for IpSelector {
    async fn select(
        &self, _ctx: &Context, endpoint: &str, opts: &[SelectOption],
    ) -> Result<Node, Error> {
        let addrs: Vec<&str> = endpoint.split(',').filter(|a| !a.is_empty()).collect();
        if addrs.is_empty() {
            return Err(Error::frame(Code::ClientRouteErr, "ip selector: endpoint empty"));
        }
        let idx = self.rr_counter.fetch_add(1, Ordering::Relaxed) % addrs.len();
        // There is no naming backend to record a network, default it from
        // the select options; an empty one lets the caller's own default win.
        let mut network = String::new();
        for opt in opts {
            if let SelectOption::Network(n) = opt {
                network = n.clone();
            }
        }
        Ok(Node {
            service_name: endpoint.to_string(),
            address: addrs[idx].to_string(),
            network,
            ..Default::default()
        })
    }

    fn report(&self, _node: &Node, _cost: Duration, _err: Option<&Error>) -> Result<(), Error> {
        Ok(())
    }
}
