//! Graceful degradation: substitute the last known-good value when the
//! inner resolver fails, while still surfacing the fresh error.
//!
//! The layer never suppresses an error: a caller always learns that the
//! most recent resolve failed. Only the value half of the outcome is
//! substituted, so the application can keep running on a stale value while
//! reacting to (or logging) the failure.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Mutex;
use tower::{BoxError, Layer, Service, ServiceExt};
use tracing::debug;

use crate::resolver::Resolution;

/// Layer applying [`Graceful`] to a resolver service.
pub struct GracefulLayer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> GracefulLayer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for GracefulLayer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for GracefulLayer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<S, T> Layer<S> for GracefulLayer<T> {
    type Service = Graceful<S, T>;

    fn layer(&self, inner: S) -> Self::Service {
        Graceful::new(inner)
    }
}

/// Remembers the last successful value and serves it alongside any later
/// failure.
///
/// Clones share the remembered value, so handing clones to concurrent tasks
/// keeps them degrading against one instance's history.
pub struct Graceful<S, T> {
    inner: Arc<Mutex<S>>,
    last_good: Arc<Mutex<Option<T>>>,
}

impl<S, T> Graceful<S, T> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            last_good: Arc::new(Mutex::new(None)),
        }
    }
}

impl<S, T> Clone for Graceful<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            last_good: self.last_good.clone(),
        }
    }
}

impl<S, Req, T> Service<Req> for Graceful<S, T>
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
        let last_good = self.last_good.clone();
        Box::pin(async move {
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

            let mut last_good = last_good.lock().await;
            match resolution {
                Resolution::Ok(value) => {
                    *last_good = Some(value.clone());
                    Ok(Resolution::Ok(value))
                }
                Resolution::Err(error) => match last_good.clone() {
                    Some(stale) => {
                        debug!("substituting last known-good value");
                        Ok(Resolution::Degraded(stale, error))
                    }
                    None => Ok(Resolution::Err(error)),
                },
                // An inner layer already substituted a value closer to the
                // source; keep it and leave the remembered value alone.
                Resolution::Degraded(value, error) => Ok(Resolution::Degraded(value, error)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::resolver::resolver_fn;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    async fn resolve<S>(svc: &mut S) -> Resolution<usize>
    where
        S: Service<(), Response = Resolution<usize>, Error = BoxError>,
    {
        ServiceExt::ready(svc).await.unwrap().call(()).await.unwrap()
    }

    #[tokio::test]
    async fn serves_the_last_good_value_alongside_each_new_error() {
        let count = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        let c = count.clone();
        let f = fail.clone();
        let mut svc = Graceful::new(resolver_fn(move |(): ()| {
            let count = c.clone();
            let fail = f.clone();
            async move {
                let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                if fail.load(Ordering::SeqCst) {
                    Err::<usize, BoxError>("resolve error".into())
                } else {
                    Ok(n)
                }
            }
        }));

        assert_eq!(resolve(&mut svc).await.value(), Some(&1));

        fail.store(true, Ordering::SeqCst);
        let degraded = resolve(&mut svc).await;
        assert!(degraded.is_degraded());
        assert_eq!(degraded.value(), Some(&1));
        assert_eq!(degraded.error().unwrap().to_string(), "resolve error");

        // The inner resolver is still invoked on every call.
        fail.store(false, Ordering::SeqCst);
        assert_eq!(resolve(&mut svc).await.value(), Some(&3));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn a_failure_with_no_prior_success_passes_through() {
        let mut svc = Graceful::new(resolver_fn(|(): ()| async move {
            Err::<usize, BoxError>("never resolved".into())
        }));

        let res = resolve(&mut svc).await;
        assert!(res.value().is_none());
        assert_eq!(res.error().unwrap().to_string(), "never resolved");
    }

    #[tokio::test]
    async fn a_later_success_replaces_the_remembered_value() {
        let values = Arc::new(Mutex::new(vec![
            Ok(10usize),
            Err(ResolveError::msg("blip")),
            Ok(20),
            Err(ResolveError::msg("blip again")),
        ]));
        let v = values.clone();
        let mut svc = Graceful::new(resolver_fn(move |(): ()| {
            let values = v.clone();
            async move {
                match values.lock().await.remove(0) {
                    Ok(n) => Ok::<usize, BoxError>(n),
                    Err(e) => Err(e.into()),
                }
            }
        }));

        assert_eq!(resolve(&mut svc).await.value(), Some(&10));
        assert_eq!(resolve(&mut svc).await.value(), Some(&10));
        assert_eq!(resolve(&mut svc).await.value(), Some(&20));
        let res = resolve(&mut svc).await;
        assert_eq!(res.value(), Some(&20));
        assert_eq!(res.error().unwrap().to_string(), "blip again");
    }

    #[tokio::test]
    async fn an_already_degraded_resolution_passes_through_unchanged() {
        // Hand-built stacks can produce a degraded outcome beneath this
        // layer; the inner substitution wins and is not remembered.
        let outcomes = Arc::new(std::sync::Mutex::new(vec![
            Resolution::Degraded(5usize, ResolveError::msg("inner degradation")),
            Resolution::Err(ResolveError::msg("hard failure")),
        ]));
        let o = outcomes.clone();
        let mut svc = Graceful::new(tower::service_fn(move |(): ()| {
            let outcomes = o.clone();
            async move {
                let next = outcomes.lock().unwrap().remove(0);
                Ok::<_, BoxError>(next)
            }
        }));

        let first = resolve(&mut svc).await;
        assert_eq!(first.value(), Some(&5));
        assert_eq!(first.error().unwrap().to_string(), "inner degradation");

        // The pass-through did not seed the remembered value, so a bare
        // failure stays bare.
        let second = resolve(&mut svc).await;
        assert!(second.value().is_none());
        assert_eq!(second.error().unwrap().to_string(), "hard failure");
    }
}
