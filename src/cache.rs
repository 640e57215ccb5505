//! Expiring cache over a resolver: the state machine deciding when the
//! inner resolver is re-invoked versus when a stored resolution is replayed.
//!
//! The cache holds a single slot: the last [`Resolution`] and the instant
//! at which the resolver becomes eligible to run again. A successful resolve
//! (or a failed one when retry is disabled) occupies the slot for the full
//! TTL window; a failed resolve under retry occupies it only for the
//! backoff-supplied delay. A zero TTL means the slot never expires once
//! filled, which is distinct from the empty slot a fresh cache starts with.
//!
//! The cache never sleeps: delays only shape the next-eligible instant, and
//! the decision is taken against an injected [`Clock`].
//!
//! The expired-or-not check followed by a resolve is a check-then-act
//! sequence. It is not guarded here; compose [`Safe`](crate::safe::Safe)
//! outermost when callers race, as the builder does.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tower::{BoxError, Service, ServiceExt};
use tracing::{debug, warn};

use crate::backoff::{Backoff, NoBackoff};
use crate::clock::{Clock, SystemClock};
use crate::resolver::Resolution;

/// Retry tuning for a cache operating with `retry_on_error`.
#[derive(Default)]
pub struct RetryOptions {
    /// Backoff policy consulted after each failed resolution. Absent means
    /// retry immediately, forever.
    pub backoff: Option<Box<dyn Backoff>>,
    /// Upper bound on consecutive failed resolutions. Once reached, the
    /// failure is pinned and replayed forever, as if the backoff had
    /// stopped.
    pub max_tries: Option<u32>,
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("backoff", &self.backoff.as_ref().map(|_| "<backoff>"))
            .field("max_tries", &self.max_tries)
            .finish()
    }
}

/// Configuration for [`ExpiringCache`].
pub struct CacheOptions {
    /// How long a stored resolution is replayed before the resolver becomes
    /// eligible to run again. `Duration::ZERO` means the slot never expires.
    pub ttl: Duration,
    /// Re-resolve failed resolutions on the backoff schedule instead of
    /// caching them for the full TTL window.
    pub retry_on_error: bool,
    pub retry: RetryOptions,
    /// Clock consulted for expiry decisions.
    pub clock: Arc<dyn Clock>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::ZERO,
            retry_on_error: false,
            retry: RetryOptions::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// When a stored resolution stops being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    /// Replay until the given instant.
    At(Instant),
    /// Replay forever; the resolver will not run again.
    Never,
}

impl Expiry {
    fn expired(&self, now: Instant) -> bool {
        match self {
            Expiry::At(at) => now >= *at,
            Expiry::Never => false,
        }
    }

    fn after(now: Instant, ttl: Duration) -> Self {
        if ttl.is_zero() {
            Expiry::Never
        } else {
            Expiry::At(now + ttl)
        }
    }
}

struct Slot<T> {
    resolution: Resolution<T>,
    eligible_at: Expiry,
}

struct CacheState<T> {
    /// `None` until the first resolution completes; an empty slot is always
    /// treated as expired.
    slot: Option<Slot<T>>,
    backoff: Box<dyn Backoff>,
    failed_tries: u32,
}

/// Single-slot cache around a resolver.
///
/// Clones share the same slot, so handing clones to concurrent tasks keeps
/// them resolving against one cache instance.
pub struct ExpiringCache<S, T> {
    inner: Arc<Mutex<S>>,
    state: Arc<Mutex<CacheState<T>>>,
    ttl: Duration,
    retry_on_error: bool,
    max_tries: Option<u32>,
    clock: Arc<dyn Clock>,
}

impl<S, T> ExpiringCache<S, T> {
    pub fn new(inner: S, opts: CacheOptions) -> Self {
        let backoff = opts
            .retry
            .backoff
            .unwrap_or_else(|| Box::new(NoBackoff));
        Self {
            inner: Arc::new(Mutex::new(inner)),
            state: Arc::new(Mutex::new(CacheState {
                slot: None,
                backoff,
                failed_tries: 0,
            })),
            ttl: opts.ttl,
            retry_on_error: opts.retry_on_error,
            max_tries: opts.retry.max_tries,
            clock: opts.clock,
        }
    }

    /// Resolve once and replay the outcome forever, errors included.
    pub fn once(inner: S) -> Self {
        Self::new(inner, CacheOptions::default())
    }

    /// Re-resolve after every failure until a success, which is then
    /// replayed forever.
    pub fn retrying(inner: S, retry: RetryOptions) -> Self {
        Self::new(
            inner,
            CacheOptions {
                retry_on_error: true,
                retry,
                ..CacheOptions::default()
            },
        )
    }
}

impl<S, T> Clone for ExpiringCache<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            state: self.state.clone(),
            ttl: self.ttl,
            retry_on_error: self.retry_on_error,
            max_tries: self.max_tries,
            clock: self.clock.clone(),
        }
    }
}

impl<S, Req, T> Service<Req> for ExpiringCache<S, T>
where
    S: Service<Req, Response = Resolution<T>, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
    T: Clone + Send + 'static,
{
    type Response = Resolution<T>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let inner = self.inner.clone();
        let state = self.state.clone();
        let clock = self.clock.clone();
        let ttl = self.ttl;
        let retry_on_error = self.retry_on_error;
        let max_tries = self.max_tries;
        Box::pin(async move {
            {
                let mut st = state.lock().await;
                match &st.slot {
                    Some(slot) if !slot.eligible_at.expired(clock.now()) => {
                        debug!("replaying stored resolution");
                        return Ok(slot.resolution.clone());
                    }
                    Some(_) => {}
                    None => {
                        // The backoff may have been handed over mid-state.
                        st.backoff.reset();
                        st.failed_tries = 0;
                    }
                }
            }

            let resolution = {
                let mut guard = inner.lock().await;
                match ServiceExt::ready(&mut *guard).await {
                    Ok(svc) => match svc.call(req).await {
                        Ok(resolution) => resolution,
                        Err(err) => Resolution::from_transport(err),
                    },
                    Err(err) => Resolution::from_transport(err),
                }
            };

            let mut st = state.lock().await;
            let now = clock.now();
            let eligible_at = if resolution.is_ok() {
                st.backoff.reset();
                st.failed_tries = 0;
                Expiry::after(now, ttl)
            } else if retry_on_error {
                st.failed_tries += 1;
                if max_tries.is_some_and(|max| st.failed_tries >= max) {
                    warn!(tries = st.failed_tries, "max tries reached, pinning failure");
                    Expiry::Never
                } else {
                    match st.backoff.next_delay() {
                        Some(delay) => Expiry::At(now + delay),
                        None => {
                            warn!("backoff stopped, pinning failure");
                            Expiry::Never
                        }
                    }
                }
            } else {
                // Failed resolutions are cached for the full window, exactly
                // like a success.
                Expiry::after(now, ttl)
            };
            st.slot = Some(Slot {
                resolution: resolution.clone(),
                eligible_at,
            });

            Ok(resolution)
        })
    }
}
