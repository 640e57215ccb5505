//! The resolver contract: resolution outcomes, adapters, and bindings.
//!
//! A resolver is any Tower service producing a [`Resolution`] for a request.
//! The request type is opaque to every layer in this crate: it is the
//! caller's execution context, passed straight through to the innermost
//! resolver. Plain async closures become resolvers via [`resolver_fn`], and
//! [`Bound`] pre-binds a request so a finished pipeline can be invoked with
//! no arguments.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::util::BoxService;
use tower::{BoxError, Service, ServiceExt};

use crate::error::ResolveError;

/// Outcome of a single resolution: a value paired with the error observed
/// while producing it.
///
/// Both halves travel together so a decorator can substitute one without
/// hiding the other: the graceful layer pairs a stale value with a fresh
/// error, and the caching layer replays a stored outcome verbatim, errors
/// included. "No value yet" is an explicit variant, never inferred from a
/// default value.
#[derive(Debug, Clone)]
pub enum Resolution<T> {
    /// The resolver produced a fresh value.
    Ok(T),
    /// The resolver failed and no usable value exists.
    Err(ResolveError),
    /// The resolver failed but a usable (stale) value is still on offer,
    /// paired with the fresh error so the caller learns about the failure.
    Degraded(T, ResolveError),
}

impl<T> Resolution<T> {
    /// Whether the resolution completed without an error.
    pub fn is_ok(&self) -> bool {
        matches!(self, Resolution::Ok(_))
    }

    /// Whether this is a stale value paired with a fresh error.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolution::Degraded(..))
    }

    /// The value half, if any layer had one to offer.
    pub fn value(&self) -> Option<&T> {
        match self {
            Resolution::Ok(value) | Resolution::Degraded(value, _) => Some(value),
            Resolution::Err(_) => None,
        }
    }

    /// The error half, if the most recent resolve failed.
    pub fn error(&self) -> Option<&ResolveError> {
        match self {
            Resolution::Ok(_) => None,
            Resolution::Err(error) | Resolution::Degraded(_, error) => Some(error),
        }
    }

    /// Split into the value and error halves.
    pub fn into_parts(self) -> (Option<T>, Option<ResolveError>) {
        match self {
            Resolution::Ok(value) => (Some(value), None),
            Resolution::Err(error) => (None, Some(error)),
            Resolution::Degraded(value, error) => (Some(value), Some(error)),
        }
    }

    /// Collapse into a `Result`, dropping the stale value a degraded
    /// resolution carries.
    pub fn into_result(self) -> Result<T, ResolveError> {
        match self {
            Resolution::Ok(value) => Ok(value),
            Resolution::Err(error) | Resolution::Degraded(_, error) => Err(error),
        }
    }

    pub(crate) fn from_transport(err: BoxError) -> Self {
        Resolution::Err(ResolveError::new(err))
    }
}

/// Boxed resolver service type for ergonomic returns.
pub type ResolverSvc<Req, T> = BoxService<Req, Resolution<T>, BoxError>;

/// Adapt an async closure returning `Result<T, E>` into a resolver service.
///
/// The closure's error is folded into the [`Resolution`] so downstream
/// layers observe failures in-band rather than through the transport error
/// channel.
pub fn resolver_fn<F>(f: F) -> ResolverFn<F> {
    ResolverFn { f }
}

/// Service returned by [`resolver_fn`].
#[derive(Debug, Clone)]
pub struct ResolverFn<F> {
    f: F,
}

impl<F, Fut, Req, T, E> Service<Req> for ResolverFn<F>
where
    F: FnMut(Req) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<BoxError>,
    T: Send + 'static,
{
    type Response = Resolution<T>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let fut = (self.f)(req);
        Box::pin(async move {
            match fut.await {
                Ok(value) => Ok(Resolution::Ok(value)),
                Err(err) => Ok(Resolution::Err(ResolveError::new(err))),
            }
        })
    }
}

/// Resolver that always yields the same value and never fails.
#[derive(Debug, Clone)]
pub struct Static<T> {
    value: T,
}

impl<T> Static<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<Req, T> Service<Req> for Static<T>
where
    T: Clone + Send + 'static,
{
    type Response = Resolution<T>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Req) -> Self::Future {
        let value = self.value.clone();
        Box::pin(async move { Ok(Resolution::Ok(value)) })
    }
}

/// A resolver pipeline with its request pre-bound, invocable with no
/// arguments.
pub struct Bound<Req, T> {
    svc: ResolverSvc<Req, T>,
    req: Req,
}

impl<Req, T> Bound<Req, T>
where
    Req: Clone,
{
    /// Bind `req` to the pipeline; every [`resolve`](Bound::resolve) call
    /// passes a clone of it through the stack.
    pub fn new(svc: ResolverSvc<Req, T>, req: Req) -> Self {
        Self { svc, req }
    }

    /// Resolve using the bound request.
    ///
    /// Transport-level failures from the underlying stack are folded into
    /// the returned [`Resolution`] so the caller deals with a single error
    /// surface.
    pub async fn resolve(&mut self) -> Resolution<T> {
        match self.svc.ready().await {
            Ok(svc) => match svc.call(self.req.clone()).await {
                Ok(resolution) => resolution,
                Err(err) => Resolution::from_transport(err),
            },
            Err(err) => Resolution::from_transport(err),
        }
    }
}

impl<Req, T> Bound<Req, T>
where
    Req: Clone + Default,
{
    /// Bind the request type's default value, for resolvers that ignore
    /// their request entirely.
    pub fn with_default(svc: ResolverSvc<Req, T>) -> Self {
        Self::new(svc, Req::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_returns_the_same_value_on_every_call() {
        let mut svc = Static::new("fixed");
        for _ in 0..3 {
            let res: Resolution<&str> = ServiceExt::<()>::ready(&mut svc)
                .await
                .unwrap()
                .call(())
                .await
                .unwrap();
            assert!(res.is_ok());
            assert_eq!(res.value(), Some(&"fixed"));
        }
    }

    #[tokio::test]
    async fn resolver_fn_folds_errors_into_the_resolution() {
        let mut svc = resolver_fn(|n: u32| async move {
            if n == 0 {
                Err::<u32, BoxError>("zero is not resolvable".into())
            } else {
                Ok(n * 2)
            }
        });

        let ok = ServiceExt::ready(&mut svc).await.unwrap().call(2).await.unwrap();
        assert_eq!(ok.value(), Some(&4));

        let err = ServiceExt::ready(&mut svc).await.unwrap().call(0).await.unwrap();
        assert!(err.value().is_none());
        assert_eq!(err.error().unwrap().to_string(), "zero is not resolvable");
    }

    #[tokio::test]
    async fn bound_resolves_with_the_bound_request() {
        let svc: ResolverSvc<u32, u32> =
            BoxService::new(resolver_fn(|n: u32| async move { Ok::<_, BoxError>(n + 1) }));
        let mut bound = Bound::new(svc, 41);
        assert_eq!(bound.resolve().await.value(), Some(&42));
        assert_eq!(bound.resolve().await.value(), Some(&42));
    }

    #[test]
    fn resolution_accessors() {
        let degraded = Resolution::Degraded(7, ResolveError::msg("stale"));
        assert!(!degraded.is_ok());
        assert!(degraded.is_degraded());
        assert_eq!(degraded.value(), Some(&7));
        assert!(degraded.into_result().is_err());

        let (value, error) = Resolution::Ok(1).into_parts();
        assert_eq!(value, Some(1));
        assert!(error.is_none());
    }
}
