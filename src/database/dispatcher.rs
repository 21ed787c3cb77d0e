//! Runs store operations on the worker pool and hands back a future.
//!
//! Every database call goes through [`Dispatcher::submit`]; the caller gets a
//! [`Pending`] that resolves exactly once. Callers on an event thread chain
//! on it or drop it; dropping does not cancel the work.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::error::DbError;

/// Handle to a store operation that is running (or already resolved).
#[must_use = "dropping a Pending detaches the operation; await it to observe failures"]
pub struct Pending<T> {
    state: PendingState<T>,
}

enum PendingState<T> {
    Ready(Option<Result<T, DbError>>),
    Running(JoinHandle<Result<T, DbError>>),
}

// The value is only ever moved out, never pinned in place.
impl<T> Unpin for Pending<T> {}

impl<T> Pending<T> {
    /// Already-resolved result; used by the disabled layer.
    pub fn ready(value: T) -> Self {
        Self { state: PendingState::Ready(Some(Ok(value))) }
    }

    pub fn failed(err: DbError) -> Self {
        Self { state: PendingState::Ready(Some(Err(err))) }
    }

    /// Release the handle without waiting. The operation still runs to completion.
    pub fn detach(self) {}
}

impl<T> Future for Pending<T> {
    type Output = Result<T, DbError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            PendingState::Ready(slot) => match slot.take() {
                Some(result) => Poll::Ready(result),
                None => Poll::Ready(Err(DbError::Task("polled after completion".into()))),
            },
            PendingState::Running(handle) => match Pin::new(handle).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(join_err)) => {
                    tracing::error!("[db] [dispatch] worker task died: {}", join_err);
                    Poll::Ready(Err(DbError::Task(join_err.to_string())))
                }
            },
        }
    }
}

/// Schedules data-layer work onto a tokio runtime's worker threads.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    handle: Handle,
}

impl Dispatcher {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Dispatcher bound to the runtime we are currently running in.
    ///
    /// Panics outside a tokio runtime, like `Handle::current`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Start `work` on the pool; it is never cancelled once submitted.
    pub fn submit<T, F>(&self, work: F) -> Pending<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, DbError>> + Send + 'static,
    {
        Pending { state: PendingState::Running(self.handle.spawn(work)) }
    }

    /// Fire-and-forget write: failures are logged under `op` and otherwise
    /// only visible to whoever awaits the returned handle.
    pub fn fire<F>(&self, op: &'static str, work: F) -> Pending<()>
    where
        F: Future<Output = Result<(), DbError>> + Send + 'static,
    {
        self.submit(async move {
            let result = work.await;
            if let Err(ref e) = result {
                tracing::warn!("[db] [{}] write failed: {}", op, e);
            }
            result
        })
    }
}
