//! Interceptor chain wrapped around every client call.
//!
//! A [Filter] receives the call plus a [Next] continuation for the
//! remaining chain suffix. It may mutate the context before passing it on,
//! short-circuit by returning without calling `next`, or wrap the
//! continuation with timing/retry/auth behavior. The engine itself spawns
//! nothing; any concurrency is introduced by individual filters.

use async_trait::async_trait;
use dashmap::DashMap;
use pylon_rpc_core::codec::{ReqBody, RspBody};
use pylon_rpc_core::{Context, Error};
use std::sync::{Arc, LazyLock};

/// A client interceptor.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Name recorded on the call span and used for position pinning.
    fn name(&self) -> &str {
        "custom"
    }

    async fn call(
        &self, ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody, next: Next<'_>,
    ) -> Result<(), Error>;
}

/// Terminal of the chain: performs the actual call once every filter ran.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self, ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody,
    ) -> Result<(), Error>;
}

/// Continuation over the remaining chain suffix.
///
/// `Next` is `Copy`, so a fan-out filter can run the same suffix for
/// several attempts (each attempt needs its own response body and should
/// mark the context options-immutable first, see the client module).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Filter>],
    terminal: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Run the next filter in the suffix, or the terminal handler when the
    /// suffix is empty.
    pub async fn run(
        mut self, ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody,
    ) -> Result<(), Error> {
        if let Some((head, tail)) = self.rest.split_first() {
            self.rest = tail;
            head.call(ctx, req, rsp, self).await
        } else {
            self.terminal.handle(ctx, req, rsp).await
        }
    }
}

/// Ordered filter list executed around a terminal handler.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub async fn run(
        &self, ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody, terminal: &dyn Handler,
    ) -> Result<(), Error> {
        Next { rest: &self.filters, terminal }.run(ctx, req, rsp).await
    }
}

static FILTERS: LazyLock<DashMap<String, Arc<dyn Filter>>> = LazyLock::new(DashMap::new);

/// Register a filter under a name so call sites can refer to it with
/// `with_filter_names`. Expected at startup.
pub fn register(name: &str, f: Arc<dyn Filter>) {
    FILTERS.insert(name.to_string(), f);
}

pub fn get(name: &str) -> Option<Arc<dyn Filter>> {
    FILTERS.get(name).map(|f| f.value().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Trace {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        short_circuit: bool,
    }

    #[async_trait]
    impl Filter for Trace {
        fn name(&self) -> &str {
            self.tag
        }

        async fn call(
            &self, ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody, next: Next<'_>,
        ) -> Result<(), Error> {
            self.log.lock().push(self.tag);
            if self.short_circuit {
                return Ok(());
            }
            let ret = next.run(ctx, req, rsp).await;
            self.log.lock().push(self.tag);
            ret
        }
    }

    struct Terminal {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Handler for Terminal {
        async fn handle(
            &self, _ctx: Context, _req: &dyn ReqBody, _rsp: &mut dyn RspBody,
        ) -> Result<(), Error> {
            self.log.lock().push("terminal");
            Ok(())
        }
    }

    fn trace(tag: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Filter> {
        Arc::new(Trace { tag, log: log.clone(), short_circuit: false })
    }

    #[tokio::test]
    async fn test_chain_order_and_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new(vec![trace("a", &log), trace("b", &log)]);
        let mut rsp = 0u32;
        chain
            .run(Context::new(), &1u32, &mut rsp, &Terminal { log: log.clone() })
            .await
            .expect("chain");
        assert_eq!(*log.lock(), vec!["a", "b", "terminal", "b", "a"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_suffix() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new(vec![
            trace("a", &log),
            Arc::new(Trace { tag: "stop", log: log.clone(), short_circuit: true }),
            trace("never", &log),
        ]);
        let mut rsp = 0u32;
        chain
            .run(Context::new(), &1u32, &mut rsp, &Terminal { log: log.clone() })
            .await
            .expect("chain");
        assert_eq!(*log.lock(), vec!["a", "stop", "a"]);
    }

    #[tokio::test]
    async fn test_ctx_value_propagates_to_suffix() {
        struct Tagger;
        #[async_trait]
        impl Filter for Tagger {
            async fn call(
                &self, ctx: Context, req: &dyn ReqBody, rsp: &mut dyn RspBody, next: Next<'_>,
            ) -> Result<(), Error> {
                next.run(ctx.with_value(Arc::new("tagged".to_string())), req, rsp).await
            }
        }
        struct Checker;
        #[async_trait]
        impl Handler for Checker {
            async fn handle(
                &self, ctx: Context, _req: &dyn ReqBody, _rsp: &mut dyn RspBody,
            ) -> Result<(), Error> {
                assert_eq!(*ctx.value::<String>().expect("tag"), "tagged");
                Ok(())
            }
        }
        let chain = FilterChain::new(vec![Arc::new(Tagger)]);
        let mut rsp = 0u32;
        chain.run(Context::new(), &1u32, &mut rsp, &Checker).await.expect("chain");
    }

    #[test]
    fn test_registry() {
        let log = Arc::new(Mutex::new(Vec::new()));
        register("trace-a", trace("a", &log));
        assert!(get("trace-a").is_some());
        assert!(get("trace-z").is_none());
    }
}
