//! Stack safety for deep recursion
//!
//! Parsing and evaluation recurse on the native stack. Recursive entry
//! points run through these helpers so the stack grows on demand instead of
//! overflowing; the call-depth limit in the runtime bounds how far it grows.

use futures_util::future::LocalBoxFuture;
use std::future::Future;

/// Minimum stack space to keep available (256KB red zone)
const RED_ZONE: usize = 256 * 1024;

/// Stack space to allocate when growing (2MB)
const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

/// Run `f`, growing the stack first when less than the red zone remains
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Box a future whose every poll runs with sufficient stack
pub(crate) fn on_sufficient_stack<'a, T: 'a>(
    future: impl Future<Output = T> + 'a,
) -> LocalBoxFuture<'a, T> {
    let mut future = Box::pin(future);
    Box::pin(futures_util::future::poll_fn(move |cx| {
        ensure_sufficient_stack(|| future.as_mut().poll(cx))
    }))
}
