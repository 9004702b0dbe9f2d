// Completion watcher
// One per attached stream; waits for the stream to drain or for the session to cancel it

// Cancellation is single-shot: `CancelHandle::cancel` consumes the handle.

use tokio::sync::oneshot::{self, error::TryRecvError};

/// Fired by the device's pull path once the wrapped stream drains
pub struct FinishSignal(oneshot::Sender<()>);

impl FinishSignal {
    pub fn fire(self) {
        // The watcher may already be gone after a cancellation
        let _ = self.0.send(());
    }
}

/// Held by the session for as long as its stream is attached
pub struct CancelHandle(oneshot::Sender<()>);

impl CancelHandle {
    pub fn cancel(self) {
        let _ = self.0.send(());
    }
}

pub struct Watcher {
    finished: oneshot::Receiver<()>,
    cancelled: oneshot::Receiver<()>,
}

/// How a watcher's wait ended
pub enum Outcome {
    /// The stream drained. The session must still confirm the watcher was not
    /// cancelled in the meantime before acting on it.
    Finished(Pending),
    Cancelled,
}

/// A finished watcher that has not yet acted on the completion
pub struct Pending {
    cancelled: oneshot::Receiver<()>,
}

impl Pending {
    /// Whether the session cancelled this watcher after the stream drained.
    /// Call with the session lock held.
    pub fn is_cancelled(&mut self) -> bool {
        !matches!(self.cancelled.try_recv(), Err(TryRecvError::Empty))
    }
}

impl Watcher {
    pub fn new() -> (Watcher, FinishSignal, CancelHandle) {
        let (finish_tx, finish_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let watcher = Watcher {
            finished: finish_rx,
            cancelled: cancel_rx,
        };
        (watcher, FinishSignal(finish_tx), CancelHandle(cancel_tx))
    }

    /// Wait for completion or cancellation. Cancellation wins ties.
    ///
    /// A finish signal dropped without firing (the stream was detached
    /// without draining) counts as cancellation.
    pub async fn wait(self) -> Outcome {
        let Watcher {
            mut finished,
            mut cancelled,
        } = self;

        let drained = tokio::select! {
            biased;
            _ = &mut cancelled => false,
            res = &mut finished => res.is_ok(),
        };

        if drained {
            Outcome::Finished(Pending { cancelled })
        } else {
            Outcome::Cancelled
        }
    }
}
