//! Running blocking native calls under a caller's [`Context`].
//!
//! The native library gives us no async interface. A call that could be
//! cancelled runs on the blocking pool while we wait for either its result or
//! the context to fire. When the context wins, the connection's cancel
//! primitive interrupts the call and we wait for it to return before handing
//! the cancellation error back.
//!
//! A future dropped mid-call cannot wait. The call is interrupted but may
//! still be running when the drop completes; the next call on the same
//! connection is kept from overlapping it only by the connection lock the
//! running call holds.

use std::sync::Arc;

use super::native::NativeCancel;
use crate::context::Context;
use crate::error::{Error, Result};

/// Fires the cancel primitive if the awaiting future is dropped mid-call.
struct InterruptOnDrop<'a> {
    canceller: &'a dyn NativeCancel,
    armed: bool,
}

impl Drop for InterruptOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("blocking call abandoned, interrupting");
            self.canceller.cancel();
        }
    }
}

/// Run `run` with the chance to cancel it through `ctx`.
///
/// A context that can never fire runs the call inline. Only one call per
/// connection may be in flight; callers sharing a canceller must serialise.
pub async fn await_call<T, F>(ctx: &Context, canceller: &Arc<dyn NativeCancel>, run: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    if !ctx.can_cancel() {
        return run();
    }

    if let Some(err) = ctx.err() {
        return Err(err);
    }

    let mut task = tokio::task::spawn_blocking(run);
    let mut guard = InterruptOnDrop {
        canceller: canceller.as_ref(),
        armed: true,
    };

    let outcome = tokio::select! {
        joined = &mut task => {
            joined.map_err(|e| Error::Task(e.to_string())).and_then(|result| result)
        }
        err = ctx.done() => {
            tracing::debug!(error = %err, "context finished first, interrupting blocking call");
            canceller.cancel();

            // Drain the interrupted call; its outcome is discarded.
            let _discarded = task.await;
            Err(err)
        }
    };

    guard.armed = false;
    outcome
}
