//! Transport seam: ship a request frame, get a response frame back.

use crate::context::Context;
use crate::error::Error;
use crate::message::Message;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, LazyLock};

/// Per-round-trip option handed to the transport by the invocation pipeline.
#[derive(Clone)]
pub enum RoundTripOpt {
    /// the call's message, for transports that multiplex by request id
    Msg(Message),
    /// share one connection between concurrent calls
    Multiplexed(bool),
    /// address selected for this call
    DialAddress(String),
    /// network selected for this call (tcp/udp/unix...)
    DialNetwork(String),
}

/// A client transport round-trips one request frame.
///
/// Implementations must observe `ctx` for cancellation and bound their I/O
/// by its deadline. A send-only round trip reports success by returning
/// [Error::client_no_response]; the pipeline maps it to a successful call
/// with no response processing.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    async fn round_trip(
        &self, ctx: &Context, req: Vec<u8>, opts: &[RoundTripOpt],
    ) -> Result<Vec<u8>, Error>;
}

static TRANSPORTS: LazyLock<DashMap<String, Arc<dyn ClientTransport>>> =
    LazyLock::new(DashMap::new);

/// Register a transport plugin under a protocol name.
pub fn register_transport(name: &str, t: Arc<dyn ClientTransport>) {
    TRANSPORTS.insert(name.to_string(), t);
}

pub fn transport(name: &str) -> Option<Arc<dyn ClientTransport>> {
    TRANSPORTS.get(name).map(|t| t.value().clone())
}
