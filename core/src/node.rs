use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// One backend instance as resolved by a [Selector](crate::selector::Selector).
///
/// A node is immutable once handed out for a call; the selector may hand the
/// same instance info to concurrent calls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub service_name: String,
    pub container_name: String,
    /// `host:port` for socket networks, a filesystem path for `unix`
    pub address: String,
    /// tcp/tcp4/tcp6/udp/udp4/udp6/unix, empty means caller default
    pub network: String,
    /// business protocol tag, e.g. which codec the instance speaks
    pub protocol: String,
    pub set_name: String,
    pub weight: usize,
    /// observed cost of the call this node was selected for
    pub cost_time: Duration,
    /// environment info to transfer downstream
    pub env_key: String,
    pub metadata: HashMap<String, String>,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "service:{}, addr:{}, cost:{:?}", self.service_name, self.address, self.cost_time)
    }
}
