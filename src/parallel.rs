// src/parallel.rs

//! Indexed fan-out: run the same unit of work `n` times concurrently and wait
//! for every run to finish.
//!
//! Each run receives its own index in `0..n`. Which index starts or finishes
//! first is not defined. Runs share nothing unless the closure captures shared
//! state, in which case the caller synchronizes it. There is no timeout and no
//! cancellation: a run that never returns blocks the call forever.

use std::future::Future;
use std::panic;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Runs `f(0)`, `f(1)`, ..., `f(n - 1)` on `n` scoped threads and blocks until
/// all of them have returned.
///
/// A panicking run does not cut the others short: the panic is re-raised on
/// the calling thread only after every run has finished. `n == 0` returns
/// immediately without calling `f`.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let sum = AtomicUsize::new(0);
/// gracewell::parallel::parallel(4, |i| {
///     sum.fetch_add(i, Ordering::SeqCst);
/// });
/// assert_eq!(sum.into_inner(), 6);
/// ```
pub fn parallel<F>(n: usize, f: F)
where
    F: Fn(usize) + Sync,
{
    if n == 0 {
        return;
    }
    debug!("Fanning out {n} threads.");
    let f = &f;
    std::thread::scope(|scope| {
        for index in 0..n {
            scope.spawn(move || f(index));
        }
    });
}

/// Async counterpart of [`parallel`]: spawns `f(0)` to `f(n - 1)` as tokio
/// tasks and waits for all of them.
///
/// The calling task is suspended while it waits. If any task panics, the
/// remaining ones still run to completion, then the first panic is resumed.
pub async fn parallel_async<F, Fut>(n: usize, f: F)
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    if n == 0 {
        return;
    }
    debug!("Fanning out {n} tasks.");
    let mut tasks = JoinSet::new();
    for index in 0..n {
        tasks.spawn(f(index));
    }

    let mut first_panic = None;
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res
            && e.is_panic()
        {
            error!("A fan-out task panicked.");
            first_panic.get_or_insert(e.into_panic());
        }
    }
    if let Some(payload) = first_panic {
        panic::resume_unwind(payload);
    }
}
