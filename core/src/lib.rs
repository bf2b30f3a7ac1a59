//! # pylon-rpc-core
//!
//! Data model and plugin seams shared by the `pylon-rpc` client pipeline:
//! the per-call [Message](message::Message) and [Context](context::Context),
//! the framework [Error](error::Error) taxonomy, and the
//! codec/selector/transport traits with their registries.

pub mod codec;
pub mod context;
pub mod error;
pub mod message;
pub mod net;
pub mod node;
pub mod selector;
pub mod transport;

pub use context::{Context, ContextError};
pub use error::{Code, Error, ErrorType};
pub use message::{Attachment, CallType, CommonMeta, Message, MetaData, CLIENT_ATTACHMENT_KEY};
pub use net::PeerAddr;
pub use node::Node;
