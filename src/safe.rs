//! Mutual exclusion around a resolver stack.
//!
//! A caching layer's expired-or-not check followed by a resolve is a
//! check-then-act sequence; for it to be race-free the guard must wrap the
//! cache from the outside, bookkeeping included. The builder therefore
//! applies this layer last. Without it, racing callers may resolve
//! concurrently and interleave cache updates; that trade-off belongs to
//! the caller who opts out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Mutex;
use tower::{Layer, Service, ServiceExt};

/// Layer applying [`Safe`] to a service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeLayer;

impl SafeLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for SafeLayer {
    type Service = Safe<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Safe::new(inner)
    }
}

/// Serializes all callers through a single critical section around the
/// inner service call.
///
/// Clones share the critical section, so handing clones to concurrent tasks
/// still serializes them against each other.
pub struct Safe<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Safe<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }
}

impl<S> Clone for Safe<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, Req> Service<Req> for Safe<S>
where
    S: Service<Req> + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.lock().await;
            ServiceExt::ready(&mut *guard).await?.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{resolver_fn, Resolution};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::BoxError;

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let gauge = in_flight.clone();
        let high_water = max_in_flight.clone();
        let svc = Safe::new(resolver_fn(move |(): ()| {
            let gauge = gauge.clone();
            let high_water = high_water.clone();
            async move {
                let current = gauge.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                gauge.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, BoxError>(current)
            }
        }));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let mut svc = svc.clone();
            tasks.push(tokio::spawn(async move {
                let res: Resolution<usize> = ServiceExt::ready(&mut svc)
                    .await
                    .unwrap()
                    .call(())
                    .await
                    .unwrap();
                res
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }
}
