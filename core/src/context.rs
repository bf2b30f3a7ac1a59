use crate::message::Message;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a context is no longer usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextError {
    Canceled,
    DeadlineExceeded,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Canceled => write!(f, "context canceled"),
            Self::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Per-call context: deadline, cancellation and typed per-call values.
///
/// Clones are cheap and share the cancellation token, the attached
/// [Message] and the value chain. Deriving a child with
/// [Context::with_timeout] narrows the deadline but never widens it, so a
/// deadline inherited from an upstream caller always holds.
///
/// The deadline is observed, not enforced: `err()` reports it as exceeded
/// once passed, and transports are expected to bound their I/O with it.
#[derive(Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: CancellationToken,
    msg: Option<Message>,
    values: Arc<Vec<(TypeId, Arc<dyn Any + Send + Sync>)>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Child context whose deadline is `min(current, d)`.
    pub fn with_deadline(&self, d: Instant) -> Context {
        let mut ctx = self.clone();
        ctx.deadline = Some(match ctx.deadline {
            Some(cur) if cur <= d => cur,
            _ => d,
        });
        ctx
    }

    /// Child context whose deadline is `min(current, now + d)`.
    #[inline]
    pub fn with_timeout(&self, d: Duration) -> Context {
        self.with_deadline(Instant::now() + d)
    }

    /// Cancel this context and every clone sharing its token.
    #[inline]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the context is canceled. Deadline expiry does not wake
    /// this future; poll [Context::err] or race against the deadline.
    pub async fn canceled(&self) {
        self.cancel.cancelled().await
    }

    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        if let Some(d) = self.deadline {
            if Instant::now() >= d {
                return Some(ContextError::DeadlineExceeded);
            }
        }
        None
    }

    /// The attached message, or a fresh detached one when none is attached.
    #[inline]
    pub fn message(&self) -> Message {
        self.msg.clone().unwrap_or_default()
    }

    /// The attached `(ctx, msg)` pair, attaching a fresh message if absent.
    pub fn ensure_message(&self) -> (Context, Message) {
        if let Some(msg) = &self.msg {
            return (self.clone(), msg.clone());
        }
        let msg = Message::new();
        let mut ctx = self.clone();
        ctx.msg = Some(msg.clone());
        (ctx, msg)
    }

    /// Child context carrying a new message handle, for fan-out filters that
    /// give each attempt its own record.
    pub fn with_message(&self, msg: Message) -> Context {
        let mut ctx = self.clone();
        ctx.msg = Some(msg);
        ctx
    }

    /// Child context with `v` stored under its type. An existing value of
    /// the same type is replaced in the child; the parent is unaffected.
    pub fn with_value<T: Any + Send + Sync>(&self, v: Arc<T>) -> Context {
        let tid = TypeId::of::<T>();
        let mut values: Vec<_> =
            self.values.iter().filter(|(t, _)| *t != tid).cloned().collect();
        values.push((tid, v));
        let mut ctx = self.clone();
        ctx.values = Arc::new(values);
        ctx
    }

    /// The value stored under type `T`, if any.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let tid = TypeId::of::<T>();
        for (t, v) in self.values.iter() {
            if *t == tid {
                return v.clone().downcast::<T>().ok();
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_never_widens() {
        let ctx = Context::new();
        assert!(ctx.deadline().is_none());
        let tight = ctx.with_timeout(Duration::from_millis(10));
        let loose = tight.with_timeout(Duration::from_secs(60));
        assert_eq!(loose.deadline(), tight.deadline());
        let tighter = tight.with_timeout(Duration::from_millis(1));
        assert!(tighter.deadline().expect("deadline") < tight.deadline().expect("deadline"));
    }

    #[test]
    fn test_err_on_cancel_and_deadline() {
        let ctx = Context::new();
        assert_eq!(ctx.err(), None);

        let expired = ctx.with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(expired.err(), Some(ContextError::DeadlineExceeded));

        ctx.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
        // clones share the token
        assert_eq!(expired.err(), Some(ContextError::Canceled));
    }

    #[test]
    fn test_ensure_message_attaches_once() {
        let ctx = Context::new();
        let (ctx, msg) = ctx.ensure_message();
        msg.set_callee_method("Echo");
        let (_, again) = ctx.ensure_message();
        assert_eq!(again.callee_method(), "Echo");
        assert_eq!(ctx.message().callee_method(), "Echo");
    }

    #[test]
    fn test_typed_values_replace_in_child() {
        let ctx = Context::new();
        let ctx = ctx.with_value(Arc::new(1u32));
        let child = ctx.with_value(Arc::new(2u32)).with_value(Arc::new("tag".to_string()));
        assert_eq!(*ctx.value::<u32>().expect("u32"), 1);
        assert_eq!(*child.value::<u32>().expect("u32"), 2);
        assert_eq!(*child.value::<String>().expect("string"), "tag");
        assert!(ctx.value::<String>().is_none());
    }
}
