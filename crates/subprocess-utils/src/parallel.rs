//! Parallel dispatcher: bounded fan-out with results in input order

use futures::stream::{FuturesOrdered, StreamExt};
use rayon::prelude::*;
use std::future::Future;

use crate::error::{ConfigError, Error, Result};

/// Default worker count: all CPUs but one, and never fewer than four.
pub fn get_parallel_threads() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    4.max(cpus.saturating_sub(1))
}

fn pool_size(num_threads: Option<usize>) -> Result<usize> {
    match num_threads {
        Some(0) => Err(Error::Config(ConfigError::ValidationError(
            "num_threads must be at least 1".to_string(),
        ))),
        Some(n) => Ok(n),
        None => Ok(get_parallel_threads()),
    }
}

/// Apply an async `func` to every element of `args`.
///
/// At most `num_threads` invocations are in flight at any time (default
/// [`get_parallel_threads`]). The output is in the order of `args` no matter
/// which invocation finishes first.
///
/// Once an invocation fails no further elements are dispatched, but the
/// invocations already in flight are driven to completion before the first
/// error, in input order, is returned.
pub async fn run_in_parallel<T, R, F, Fut>(
    func: F,
    args: impl IntoIterator<Item = T>,
    num_threads: Option<usize>,
) -> Result<Vec<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let limit = pool_size(num_threads)?;
    let mut pending = args.into_iter();
    let mut in_flight = FuturesOrdered::new();
    let mut results = Vec::new();
    let mut first_error = None;

    loop {
        while first_error.is_none() && in_flight.len() < limit {
            match pending.next() {
                Some(arg) => in_flight.push_back(func(arg)),
                None => break,
            }
        }
        match in_flight.next().await {
            Some(Ok(value)) => results.push(value),
            Some(Err(err)) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            None => break,
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

/// Apply a blocking `func` to every element of `args` on a dedicated pool
/// of `num_threads` worker threads (default [`get_parallel_threads`]).
///
/// Results come back in input order. An error from any invocation is
/// returned; work already handed to a worker still runs to completion.
pub fn run_in_parallel_blocking<T, R, F>(
    func: F,
    args: impl IntoIterator<Item = T>,
    num_threads: Option<usize>,
) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R> + Send + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size(num_threads)?)
        .thread_name(|i| format!("subprocess-worker-{i}"))
        .build()
        .map_err(|e| Error::spawn_failed(format!("Failed to build worker pool: {}", e)))?;

    let args: Vec<T> = args.into_iter().collect();
    pool.install(|| args.into_par_iter().map(&func).collect())
}
