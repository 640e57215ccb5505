//! # tower-resolve
//!
//! Composable caching, retry, and graceful-degradation layers for fallible
//! resolvers, built on Tower's service architecture.
//!
//! A *resolver* is any Tower service producing a [`Resolution`]: the value
//! it resolved, paired with the error observed while producing it, if any.
//! This crate wraps resolvers with cross-cutting behaviors that stack
//! predictably:
//!
//! - [`ExpiringCache`]: single-slot caching with optional TTL,
//!   retry-on-error re-resolution on a backoff schedule, and verbatim
//!   replay of the last outcome, errors included
//! - [`Graceful`]: remembers the last successful value and serves it
//!   alongside any later failure, so the application keeps a usable value
//!   while still learning that the resolve failed
//! - [`Safe`]: serializes concurrent callers around the whole stack
//! - [`Static`]: a fixed value that never fails
//! - [`ResolverBuilder`]: assembles the layers in the one order that is
//!   correct (graceful innermost, one cache by precedence, guard outermost)
//!
//! ## Getting Started
//!
//! ```rust
//! use std::time::Duration;
//! use tower::{BoxError, Service, ServiceExt};
//! use tower_resolve::{resolver_fn, ResolverBuilder};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // Wrap an async closure: cache successes for 30s, re-resolve failures
//! // immediately, and fall back to the last good value on errors.
//! let mut config = ResolverBuilder::new()
//!     .ttl(Duration::from_secs(30))
//!     .retry()
//!     .graceful()
//!     .build(resolver_fn(|(): ()| async move {
//!         Ok::<_, BoxError>("config payload".to_string())
//!     }));
//!
//! let res = config.ready().await.unwrap().call(()).await.unwrap();
//! assert_eq!(res.value().map(String::as_str), Some("config payload"));
//! assert!(res.error().is_none());
//! # }
//! ```
//!
//! The request type is the caller's execution context and is passed through
//! every layer untouched; resolvers that ignore it use `()`. [`Bound`]
//! pre-binds a request so a finished pipeline resolves with no arguments.

pub mod backoff;
pub mod builder;
pub mod cache;
pub mod clock;
pub mod error;
pub mod graceful;
pub mod resolver;
pub mod safe;

pub use backoff::{Backoff, ExponentialBackoff, FixedBackoff};
pub use builder::ResolverBuilder;
pub use cache::{CacheOptions, ExpiringCache, RetryOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ResolveError;
pub use graceful::{Graceful, GracefulLayer};
pub use resolver::{resolver_fn, Bound, Resolution, ResolverFn, ResolverSvc, Static};
pub use safe::{Safe, SafeLayer};

// Re-export Tower traits that users need
pub use tower::{BoxError, Layer, Service, ServiceExt};
