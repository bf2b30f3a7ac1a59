use crate::error::Error;
use crate::net::PeerAddr;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Metadata transparently transmitted to the backend service.
pub type MetaData = HashMap<String, Vec<u8>>;

/// Free-form per-call state shared between the framework and codec plugins.
pub type CommonMeta = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Common-meta key under which the client [Attachment] is stored.
pub const CLIENT_ATTACHMENT_KEY: &str = "client_attachment";

/// How the request is exchanged with the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CallType {
    /// one request, one response
    #[default]
    Unary = 0,
    /// fire and forget, the transport never reads a response
    SendOnly = 1,
}

/// Out-of-band binary payload carried alongside the request message.
///
/// Whether it actually goes on the wire depends on the protocol codec; the
/// framework only stores it in the message's common meta.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attachment {
    request: Vec<u8>,
}

impl Attachment {
    #[inline]
    pub fn new(request: Vec<u8>) -> Self {
        Self { request }
    }

    #[inline]
    pub fn request(&self) -> &[u8] {
        &self.request
    }
}

#[derive(Default)]
struct MsgInner {
    caller_service_name: String,
    callee_service_name: String,
    callee_method: String,
    callee_container_name: String,
    callee_set_name: String,
    caller_set_name: String,
    namespace: String,
    env_name: String,
    env_transfer: String,
    client_rpc_name: String,
    // -1 marks unsupported; defaults follow the protocol zero values
    serialization_type: i32,
    compress_type: i32,
    request_timeout: Duration,
    remote_addr: Option<PeerAddr>,
    client_req_head: Option<Arc<dyn Any + Send + Sync>>,
    client_rsp_head: Option<Arc<dyn Any + Send + Sync>>,
    common_meta: CommonMeta,
    client_meta_data: MetaData,
    call_type: CallType,
    client_rsp_err: Option<Error>,
}

/// Per-call protocol head state.
///
/// A `Message` is a shared handle: clones refer to the same record, so the
/// invoker, the selector filter and the codec all observe each other's
/// updates. It is not meant to be shared between concurrent call attempts;
/// fan-out filters clone the record itself via [Message::detached_clone].
#[derive(Clone, Default)]
pub struct Message(Arc<Mutex<MsgInner>>);

macro_rules! str_field {
    ($get: ident, $set: ident) => {
        #[inline]
        pub fn $get(&self) -> String {
            self.0.lock().$get.clone()
        }

        #[inline]
        pub fn $set(&self, v: impl Into<String>) {
            self.0.lock().$get = v.into();
        }
    };
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    str_field!(caller_service_name, set_caller_service_name);
    str_field!(callee_service_name, set_callee_service_name);
    str_field!(callee_method, set_callee_method);
    str_field!(callee_container_name, set_callee_container_name);
    str_field!(callee_set_name, set_callee_set_name);
    str_field!(caller_set_name, set_caller_set_name);
    str_field!(namespace, set_namespace);
    str_field!(env_name, set_env_name);
    str_field!(env_transfer, set_env_transfer);
    str_field!(client_rpc_name, set_client_rpc_name);

    #[inline]
    pub fn serialization_type(&self) -> i32 {
        self.0.lock().serialization_type
    }

    #[inline]
    pub fn set_serialization_type(&self, t: i32) {
        self.0.lock().serialization_type = t;
    }

    #[inline]
    pub fn compress_type(&self) -> i32 {
        self.0.lock().compress_type
    }

    #[inline]
    pub fn set_compress_type(&self, t: i32) {
        self.0.lock().compress_type = t;
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        self.0.lock().request_timeout
    }

    #[inline]
    pub fn set_request_timeout(&self, d: Duration) {
        self.0.lock().request_timeout = d;
    }

    #[inline]
    pub fn remote_addr(&self) -> Option<PeerAddr> {
        self.0.lock().remote_addr.clone()
    }

    /// The remote address is expected to be set once per call; callers that
    /// only want to fill a missing value check [Message::remote_addr] first.
    #[inline]
    pub fn set_remote_addr(&self, addr: PeerAddr) {
        self.0.lock().remote_addr = Some(addr);
    }

    #[inline]
    pub fn client_req_head(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.0.lock().client_req_head.clone()
    }

    #[inline]
    pub fn set_client_req_head(&self, head: Arc<dyn Any + Send + Sync>) {
        self.0.lock().client_req_head = Some(head);
    }

    #[inline]
    pub fn client_rsp_head(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.0.lock().client_rsp_head.clone()
    }

    #[inline]
    pub fn set_client_rsp_head(&self, head: Arc<dyn Any + Send + Sync>) {
        self.0.lock().client_rsp_head = Some(head);
    }

    #[inline]
    pub fn common_meta(&self) -> CommonMeta {
        self.0.lock().common_meta.clone()
    }

    #[inline]
    pub fn set_common_meta(&self, meta: CommonMeta) {
        self.0.lock().common_meta = meta;
    }

    #[inline]
    pub fn set_common_meta_entry(&self, key: impl Into<String>, v: Arc<dyn Any + Send + Sync>) {
        self.0.lock().common_meta.insert(key.into(), v);
    }

    #[inline]
    pub fn set_attachment(&self, attm: Attachment) {
        self.set_common_meta_entry(CLIENT_ATTACHMENT_KEY, Arc::new(attm));
    }

    /// The client attachment, when one was placed in the common meta.
    pub fn attachment(&self) -> Option<Arc<Attachment>> {
        let v = self.0.lock().common_meta.get(CLIENT_ATTACHMENT_KEY)?.clone();
        v.downcast::<Attachment>().ok()
    }

    #[inline]
    pub fn client_meta_data(&self) -> MetaData {
        self.0.lock().client_meta_data.clone()
    }

    #[inline]
    pub fn set_client_meta_data(&self, md: MetaData) {
        self.0.lock().client_meta_data = md;
    }

    #[inline]
    pub fn call_type(&self) -> CallType {
        self.0.lock().call_type
    }

    #[inline]
    pub fn set_call_type(&self, t: CallType) {
        self.0.lock().call_type = t;
    }

    /// Error carried inside the response head, decoded by the codec.
    /// A non-nil response error wins over any response body bytes.
    #[inline]
    pub fn client_rsp_err(&self) -> Option<Error> {
        self.0.lock().client_rsp_err.clone()
    }

    #[inline]
    pub fn set_client_rsp_err(&self, e: Option<Error>) {
        self.0.lock().client_rsp_err = e;
    }

    /// A deep copy that no longer shares state with `self`, for fan-out
    /// filters running concurrent call attempts.
    pub fn detached_clone(&self) -> Message {
        let inner = self.0.lock();
        Message(Arc::new(Mutex::new(MsgInner {
            caller_service_name: inner.caller_service_name.clone(),
            callee_service_name: inner.callee_service_name.clone(),
            callee_method: inner.callee_method.clone(),
            callee_container_name: inner.callee_container_name.clone(),
            callee_set_name: inner.callee_set_name.clone(),
            caller_set_name: inner.caller_set_name.clone(),
            namespace: inner.namespace.clone(),
            env_name: inner.env_name.clone(),
            env_transfer: inner.env_transfer.clone(),
            client_rpc_name: inner.client_rpc_name.clone(),
            serialization_type: inner.serialization_type,
            compress_type: inner.compress_type,
            request_timeout: inner.request_timeout,
            remote_addr: inner.remote_addr.clone(),
            client_req_head: inner.client_req_head.clone(),
            client_rsp_head: inner.client_rsp_head.clone(),
            common_meta: inner.common_meta.clone(),
            client_meta_data: inner.client_meta_data.clone(),
            call_type: inner.call_type,
            client_rsp_err: inner.client_rsp_err.clone(),
        })))
    }
}
