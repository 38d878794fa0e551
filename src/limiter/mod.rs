//! Bounded-parallelism executor for independent async tasks.
//!
//! [`run_limited`] takes an ordered list of task factories and runs them with
//! at most `limit` in flight. Every factory yields exactly one [`Settled`]
//! slot, in input order; a failing or panicking task never affects its
//! siblings.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum TaskError<E> {
    #[error("{0}")]
    Failed(E),

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Outcome of one task.
#[derive(Debug)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(TaskError<E>),
}

impl<T, E> Settled<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn into_result(self) -> Result<T, TaskError<E>> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(err) => Err(err),
        }
    }
}

/// Runs every factory with at most `limit` tasks outstanding.
///
/// A `limit` of zero is treated as one. Tasks start in input order; the
/// returned vector has one slot per factory, matched by index.
pub async fn run_limited<F, Fut, T, E>(factories: Vec<F>, limit: usize) -> Vec<Settled<T, E>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    if factories.is_empty() {
        return Vec::new();
    }

    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut handles = Vec::with_capacity(factories.len());

    for factory in factories {
        // The semaphore is never closed, so acquisition only fails on shutdown
        // of the runtime itself.
        let permit = Arc::clone(&permits).acquire_owned().await.ok();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            factory().await
        }));
    }

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(Ok(value)) => Settled::Fulfilled(value),
            Ok(Err(err)) => Settled::Rejected(TaskError::Failed(err)),
            Err(join_err) => Settled::Rejected(TaskError::Panicked(join_err.to_string())),
        })
        .collect()
}
