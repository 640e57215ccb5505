//! Declarative assembly of a resolver pipeline.
//!
//! The builder wraps a base resolver with the requested behaviors in the
//! one order that is correct, innermost to outermost:
//!
//! 1. graceful fallback, closest to the resolver so it observes raw
//!    failures before any caching replays them;
//! 2. a single caching layer, chosen by precedence: a positive TTL wins
//!    over retry-forever, which wins over resolve-once;
//! 3. the concurrency guard, always last, so the cache's check-then-act
//!    window is enclosed.
//!
//! Conflicting options are resolved by that precedence, never at runtime.

use std::sync::Arc;
use std::time::Duration;

use tower::util::BoxService;
use tower::{BoxError, Service};

use crate::cache::{CacheOptions, ExpiringCache, RetryOptions};
use crate::clock::{Clock, SystemClock};
use crate::graceful::Graceful;
use crate::resolver::{Resolution, ResolverSvc};
use crate::safe::Safe;

/// Chainable assembly of caching, retry, fallback, and serialization around
/// a base resolver.
///
/// ```rust
/// use std::time::Duration;
/// use tower::{BoxError, Service, ServiceExt};
/// use tower_resolve::{resolver_fn, ResolverBuilder};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut svc = ResolverBuilder::new()
///     .ttl(Duration::from_secs(30))
///     .retry()
///     .graceful()
///     .build(resolver_fn(|(): ()| async move { Ok::<_, BoxError>(42u32) }));
///
/// let res = svc.ready().await.unwrap().call(()).await.unwrap();
/// assert_eq!(res.value(), Some(&42));
/// # }
/// ```
pub struct ResolverBuilder {
    once: bool,
    retry: bool,
    retry_opts: RetryOptions,
    graceful: bool,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    safe: bool,
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self {
            once: false,
            retry: false,
            retry_opts: RetryOptions::default(),
            graceful: false,
            ttl: Duration::ZERO,
            clock: Arc::new(SystemClock),
            safe: true,
        }
    }

    /// Resolve once and replay the outcome forever, errors included.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Re-resolve after failures instead of caching them; without a TTL
    /// this retries until the first success, which is then replayed
    /// forever.
    pub fn retry(mut self) -> Self {
        self.retry = true;
        self
    }

    /// Tune the retry schedule. Has no effect unless [`retry`](Self::retry)
    /// is also set.
    pub fn retry_options(mut self, opts: RetryOptions) -> Self {
        self.retry_opts = opts;
        self
    }

    /// Remember the last successful value and serve it alongside any later
    /// failure.
    pub fn graceful(mut self) -> Self {
        self.graceful = true;
        self
    }

    /// Cache resolutions for `ttl`. Takes precedence over
    /// [`once`](Self::once); combined with [`retry`](Self::retry), failed
    /// resolutions follow the backoff schedule while successes are held for
    /// the full window.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the clock consulted for expiry decisions.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serialize concurrent callers around the finished stack. This is the
    /// default.
    pub fn guarded(mut self) -> Self {
        self.safe = true;
        self
    }

    /// Skip the outermost concurrency guard. Only sound when callers are
    /// already serialized; racing callers may resolve concurrently and
    /// interleave cache bookkeeping.
    pub fn unguarded(mut self) -> Self {
        self.safe = false;
        self
    }

    /// Assemble the pipeline around `resolver`.
    pub fn build<S, Req, T>(self, resolver: S) -> ResolverSvc<Req, T>
    where
        S: Service<Req, Response = Resolution<T>, Error = BoxError> + Send + 'static,
        S::Future: Send + 'static,
        Req: Send + 'static,
        T: Clone + Send + 'static,
    {
        let mut svc: ResolverSvc<Req, T> = BoxService::new(resolver);

        if self.graceful {
            svc = BoxService::new(Graceful::new(svc));
        }

        if !self.ttl.is_zero() {
            svc = BoxService::new(ExpiringCache::new(
                svc,
                CacheOptions {
                    ttl: self.ttl,
                    retry_on_error: self.retry,
                    retry: self.retry_opts,
                    clock: self.clock,
                },
            ));
        } else if self.retry {
            svc = BoxService::new(ExpiringCache::new(
                svc,
                CacheOptions {
                    retry_on_error: true,
                    retry: self.retry_opts,
                    clock: self.clock,
                    ..CacheOptions::default()
                },
            ));
        } else if self.once {
            svc = BoxService::new(ExpiringCache::new(
                svc,
                CacheOptions {
                    clock: self.clock,
                    ..CacheOptions::default()
                },
            ));
        }

        // The guard must enclose the cache's check-then-act window, so it
        // always goes last.
        if self.safe {
            svc = BoxService::new(Safe::new(svc));
        }

        svc
    }
}
