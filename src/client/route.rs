//! The selector filter: resolves the endpoint to one backend node, pins
//! the remote address on the message, and reports the call outcome back to
//! the selector. Runs last in the chain unless the caller pinned it.

use crate::client::options::{
    context_with_options, options_from_context, Options,
};
use crate::filter::{Filter, Next};
use crate::report;
use async_trait::async_trait;
use pylon_rpc_core::codec::{ReqBody, RspBody};
use pylon_rpc_core::net::PeerAddr;
use pylon_rpc_core::{Code, Context, ContextError, Error, Message, Node};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Instant;

pub const SELECTOR_FILTER_NAME: &str = "selector";

/// Terminal interceptor performing node selection and selector feedback.
pub struct SelectorFilter;

#[async_trait]
impl Filter for SelectorFilter {
    fn name(&self) -> &str {
        SELECTOR_FILTER_NAME
    }

    async fn call(
        &self, mut ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody, next: Next<'_>,
    ) -> Result<(), Error> {
        let msg = ctx.message();
        let Some(shared) = options_from_context(&ctx) else {
            return Err(Error::frame(Code::ClientRouteErr, "client: options missing on context"));
        };
        // Always mutate an owned clone and republish it below. Under the
        // options-immutable marker (retry/hedging fan-out) this is what
        // keeps sibling attempts from corrupting each other's option
        // vectors; without the marker it is simply cheap.
        let mut opts = (*shared).clone();

        let node = match select_node(&ctx, &msg, &mut opts).await {
            Ok(node) => node,
            Err(e) => return Err((opts.fix_timeout)(e)),
        };
        let network = first_non_empty(&node.network, &opts.network);
        ensure_msg_remote_addr(&msg, network, &node.address);

        let selector = opts.selector.clone();
        let node_cell = opts.node.clone();
        let should_report = opts.should_err_report_to_selector.clone();
        ctx = context_with_options(ctx, std::sync::Arc::new(opts));

        let begin = Instant::now();
        let mut err = next.run(ctx, req, rsp).await.err();
        let cost = begin.elapsed();

        if let Some(selector) = &selector {
            match &mut err {
                Some(e)
                    if matches!(
                        e.frame_code(),
                        Some(Code::ClientConnectFail | Code::ClientTimeout | Code::ClientNetErr)
                    ) =>
                {
                    e.msg = format!("{}, cost:{:?}", e.msg, cost);
                    let _ = selector.report(&node, cost, Some(&*e));
                }
                Some(e) if should_report(&*e) => {
                    let _ = selector.report(&node, cost, Some(&*e));
                }
                // success for selector accounting even if the business
                // returned an error
                _ => {
                    let _ = selector.report(&node, cost, None);
                }
            }
        }

        if let Some(cell) = &node_cell {
            let address = match msg.remote_addr() {
                Some(addr) => addr.to_string(),
                None => node.address.clone(),
            };
            cell.set(&node, address, cost);
        }

        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Resolve one node and push its routing info onto the message.
async fn select_node(ctx: &Context, msg: &Message, opts: &mut Options) -> Result<Node, Error> {
    let node = match get_node(ctx, opts).await {
        Ok(node) => node,
        Err(e) => {
            report::SELECT_NODE_FAIL.incr();
            return Err(e);
        }
    };

    opts.load_node_config(&node);
    msg.set_callee_container_name(&node.container_name);
    msg.set_callee_set_name(&node.set_name);

    // Adopt the node's env info for transfer only when upstream did not
    // already hand one down.
    if msg.env_transfer().is_empty() {
        msg.set_env_transfer(&node.env_key);
    }
    if opts.disable_service_router {
        msg.set_env_transfer("");
    }

    // The selector may have blocked for a while.
    match ctx.err() {
        Some(ContextError::Canceled) => Err(Error::frame(
            Code::ClientCanceled,
            "selector canceled after Select: context canceled",
        )),
        Some(ContextError::DeadlineExceeded) => Err(Error::frame(
            Code::ClientTimeout,
            "selector timeout after Select: context deadline exceeded",
        )),
        None => Ok(node),
    }
}

async fn get_node(ctx: &Context, opts: &mut Options) -> Result<Node, Error> {
    let Some(selector) = opts.selector.clone() else {
        return Err(Error::frame(Code::ClientRouteErr, "client Select: selector empty"));
    };
    let node = match selector.select(ctx, &opts.endpoint, &opts.select_options).await {
        Ok(node) => node,
        Err(e) => {
            return Err(Error::frame(Code::ClientRouteErr, format!("client Select: {}", e.msg)));
        }
    };
    if node.address.is_empty() {
        return Err(Error::frame(
            Code::ClientRouteErr,
            format!("client Select: node address empty:{}", node),
        ));
    }
    Ok(node)
}

/// Pin the remote address on the message unless one is already set.
///
/// IP-family networks only accept a literal `ip:port` here; hostnames are
/// left for the transport to resolve. Unknown networks fall back to socket
/// resolution, and any failure silently leaves the address unset.
pub(crate) fn ensure_msg_remote_addr(msg: &Message, network: &str, address: &str) {
    if msg.remote_addr().is_some() {
        return;
    }
    match network {
        "tcp" | "tcp4" | "tcp6" | "udp" | "udp4" | "udp6" => {
            if let Ok(addr) = address.parse::<SocketAddr>() {
                msg.set_remote_addr(PeerAddr::Socket(addr));
            }
        }
        "unix" => {
            msg.set_remote_addr(PeerAddr::Path(PathBuf::from(address)));
        }
        _ => {
            if let Some(addr) = resolve_socket_addr(address) {
                msg.set_remote_addr(PeerAddr::Socket(addr));
            }
        }
    }
}

fn resolve_socket_addr(address: &str) -> Option<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Some(addr);
    }
    address.to_socket_addrs().ok()?.next()
}

#[inline]
fn first_non_empty<'a>(a: &'a str, b: &'a str) -> &'a str {
    if !a.is_empty() { a } else { b }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_addr_literal_ip_only_for_ip_networks() {
        let msg = Message::new();
        ensure_msg_remote_addr(&msg, "tcp", "backend.internal:8000");
        assert!(msg.remote_addr().is_none());

        ensure_msg_remote_addr(&msg, "tcp", "10.0.0.1:8000");
        assert_eq!(msg.remote_addr().expect("addr").to_string(), "10.0.0.1:8000");
    }

    #[test]
    fn test_remote_addr_v6_and_udp() {
        let msg = Message::new();
        ensure_msg_remote_addr(&msg, "udp6", "[::1]:9000");
        assert!(matches!(msg.remote_addr(), Some(PeerAddr::Socket(s)) if s.is_ipv6()));
    }

    #[test]
    fn test_remote_addr_unix_path() {
        let msg = Message::new();
        ensure_msg_remote_addr(&msg, "unix", "/var/run/app.sock");
        assert_eq!(msg.remote_addr().expect("addr").to_string(), "/var/run/app.sock");
    }

    #[test]
    fn test_remote_addr_set_only_once() {
        let msg = Message::new();
        ensure_msg_remote_addr(&msg, "tcp", "10.0.0.1:8000");
        ensure_msg_remote_addr(&msg, "tcp", "10.0.0.2:9000");
        assert_eq!(msg.remote_addr().expect("addr").to_string(), "10.0.0.1:8000");
    }

    #[test]
    fn test_remote_addr_unknown_network_resolves_as_socket() {
        let msg = Message::new();
        ensure_msg_remote_addr(&msg, "quic", "10.0.0.3:7000");
        assert_eq!(msg.remote_addr().expect("addr").to_string(), "10.0.0.3:7000");

        let msg = Message::new();
        ensure_msg_remote_addr(&msg, "quic", "no such host at all");
        assert!(msg.remote_addr().is_none());
    }

    #[test]
    fn test_first_non_empty() {
        assert_eq!(first_non_empty("udp", "tcp"), "udp");
        assert_eq!(first_non_empty("", "tcp"), "tcp");
    }
}
