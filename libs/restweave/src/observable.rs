//! Push-based adapter for synthesized methods declared as observables.
//!
//! An observable result is a stream that yields exactly one item (the
//! value or the error of the underlying call) and then completes.

use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt};

/// Name of the library that provides this adapter to woven modules.
pub const ADAPTER_LIBRARY: &str = "restweave-observable";

pub type Observable<T, E> = BoxStream<'static, Result<T, E>>;

/// Lift a future into a single-value stream. The future is not polled
/// until the stream is.
pub fn from_future<F, T, E>(fut: F) -> Observable<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    stream::once(fut).boxed()
}
