//! Stack growth for deeply nested evaluation.
//!
//! Every script call nests several boxed-future polls, so a recursion depth
//! that is well inside the configured call limit can still exhaust a small
//! thread stack. Polls wrapped in [`GrowStack`] move onto a freshly
//! allocated segment when the remaining stack runs low.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Runs `f`, first growing the stack if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Minimum stack space to keep available (128KB red zone).
    const RED_ZONE: usize = 128 * 1024;

    /// Stack space to allocate when growing (1MB).
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Polls the inner future under [`ensure_sufficient_stack`].
pub struct GrowStack<F>(pub F);

impl<F: Future + Unpin> Future for GrowStack<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.get_mut().0;
        ensure_sufficient_stack(|| Pin::new(inner).poll(cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_recursion() {
        fn deep_recurse(n: u64) -> u64 {
            ensure_sufficient_stack(|| if n == 0 { 0 } else { deep_recurse(n - 1) + 1 })
        }

        assert_eq!(deep_recurse(100_000), 100_000);
    }

    #[tokio::test]
    async fn test_wrapped_future_output() {
        let value = GrowStack(Box::pin(async { 7 })).await;
        assert_eq!(value, 7);
    }
}
