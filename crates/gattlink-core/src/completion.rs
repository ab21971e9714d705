//! Single-shot completion contract
//!
//! Every callback-style operation takes a completion closure that is invoked
//! exactly once with either the success payload or a [`GattError`]. The
//! closure runs on the runtime that drives native I/O, never on the calling
//! thread before the operation method returns.
//!
//! A [`Completion`] that is dropped without being completed (for example
//! because its task was dropped during runtime shutdown) still fires, with a
//! cancellation error, so callers never wait on a callback that cannot come.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::error;

use crate::errors::{GattError, GattResult};

type Callback<T> = Box<dyn FnOnce(GattResult<T>) + Send + 'static>;

/// One-shot completion callback for an operation producing `T`
pub struct Completion<T> {
    callback: Option<Callback<T>>,
}

impl<T> Completion<T> {
    /// Wrap a closure as a completion
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(GattResult<T>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Deliver the result, consuming the completion
    pub fn complete(mut self, result: GattResult<T>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(GattError::Cancelled(
                "Operation dropped before completion".into(),
            )));
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// Run `operation` on `runtime` and deliver its result to `completion`
///
/// A panic inside the operation is reported as a transport error instead of
/// unwinding into the runtime.
pub(crate) fn dispatch<T, Fut>(runtime: &Handle, operation: Fut, completion: Completion<T>)
where
    T: Send + 'static,
    Fut: Future<Output = GattResult<T>> + Send + 'static,
{
    runtime.spawn(async move {
        let result = match AssertUnwindSafe(operation).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!("Native backend panicked while servicing a gatt operation");
                Err(GattError::Transport("Native backend fault".into()))
            }
        };
        completion.complete(result);
    });
}
