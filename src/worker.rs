//! CPU-work offload (§5 "Scheduling model"): encode, XOR-diff and
//! incremental-update calls are dispatched to a dedicated worker and
//! awaited through a one-shot completion handle, rather than run inline
//! on the thread driving iteration and RPCs.

use crate::{AggError, AggResult};

/// A single CPU-bound unit of work dispatched off the calling thread. Join
/// to await its completion -- the one distinct suspension point §5 calls
/// out for "awaiting a worker task after dispatching encode/update/recalc
/// CPU work".
pub struct WorkHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> WorkHandle<T> {
    /// Block (cooperatively, from the caller's point of view) until the
    /// offloaded closure completes, surfacing a [`AggError::Fatal`] if the
    /// worker thread panicked or was dropped without sending a result.
    pub fn join(self) -> AggResult<T> {
        self.rx
            .recv()
            .map_err(|_| AggError::fatal("worker task dropped without a result"))
    }
}

/// Dispatch `f` onto a dedicated worker thread, returning a handle to
/// join on. One thread per offload mirrors the cost model of genuinely
/// CPU-bound Galois-field arithmetic over a handful of cells per stripe;
/// there is no shared worker pool to starve or queue behind.
pub fn offload<F, T>(f: F) -> WorkHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    WorkHandle { rx }
}
