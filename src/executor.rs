// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};

/// Wraps a tokio multi-thread runtime to give the scheduler's worker pool a single spawn
/// surface, regardless of whether the runtime was handed to us (a "borrowed" executor
/// living inside someone else's process) or built by us (an "owned" executor that is
/// shut down when the last handle is dropped).
///
/// Grounded on `task_executor::Executor` in the teacher's `task_executor` crate, trimmed to
/// the subset this crate's scheduler needs: spawning a target's `run`/`clean` future onto
/// a fixed-size worker pool.
#[derive(Clone)]
pub struct Executor {
    handle: Handle,
    _owned_runtime: Option<Arc<Runtime>>,
}

impl Executor {
    /// Wraps an already-running runtime's handle. The caller remains responsible for the
    /// runtime's lifetime.
    pub fn borrowed(handle: Handle) -> Self {
        Executor {
            handle,
            _owned_runtime: None,
        }
    }

    /// Builds and owns a new multi-thread runtime with `worker_threads` OS threads, matching
    /// the spec's "fixed-size worker pool" model directly.
    pub fn owned(worker_threads: usize) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Executor {
            handle,
            _owned_runtime: Some(Arc::new(runtime)),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns `future` onto the pool, returning a join handle the scheduler awaits to learn
    /// the target's build outcome.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Blocks the calling thread on `future`, for the top-level caller that kicks off a
    /// build from synchronous code.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_executor_runs_spawned_work() {
        let executor = Executor::owned(2).unwrap();
        let result = executor.block_on(async {
            let handle = executor.spawn(async { 1 + 1 });
            handle.await.unwrap()
        });
        assert_eq!(result, 2);
    }
}
