//! Write batching: independent calls that arrive close together share one
//! physical transaction, each inside its own savepoint.

use std::mem;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use rusqlite::TransactionBehavior;
use tracing::debug;

use crate::{DbConfig, PaymentDb, StoreError, Tx};

type BatchFn = Box<dyn FnOnce(&Tx<'_>) -> Result<(), StoreError> + Send>;

struct BatchCall {
    run: BatchFn,
    done: mpsc::Sender<Result<(), StoreError>>,
}

#[derive(Default)]
struct Pending {
    generation: u64,
    calls: Vec<BatchCall>,
}

impl Pending {
    fn take(&mut self) -> Vec<BatchCall> {
        self.generation += 1;
        mem::take(&mut self.calls)
    }
}

pub(crate) struct Batcher {
    pending: Mutex<Pending>,
    max_size: usize,
    max_delay: Duration,
}

impl Batcher {
    pub(crate) fn new(config: &DbConfig) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            max_size: config.batch_max_size.max(1),
            max_delay: config.batch_max_delay(),
        }
    }
}

impl PaymentDb {
    /// Runs `f` in a write transaction that may be shared with other
    /// concurrent `batch` calls.
    ///
    /// An error from `f` rolls back only that call's writes and is returned
    /// only to its caller. If the shared transaction cannot begin or commit,
    /// every call in the batch receives that store error; SQLite failures
    /// keep their result code.
    pub fn batch<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Tx<'_>) -> Result<T, StoreError> + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let out = Arc::clone(&slot);
        let run: BatchFn = Box::new(move |tx| {
            let value = f(tx)?;
            *out.lock().map_err(|_| StoreError::LockPoisoned)? = Some(value);
            Ok(())
        });

        let (done, wait) = mpsc::channel();
        self.enqueue(BatchCall { run, done })?;
        wait.recv().map_err(|_| StoreError::BatchDropped)??;

        let value = slot.lock().map_err(|_| StoreError::LockPoisoned)?.take();
        value.ok_or(StoreError::BatchDropped)
    }

    /// The first call of a generation waits `max_delay` and then flushes
    /// whatever has queued up; a call that fills the batch flushes at once.
    fn enqueue(&self, call: BatchCall) -> Result<(), StoreError> {
        let mut pending = self.pending_calls()?;
        pending.calls.push(call);

        if pending.calls.len() >= self.batcher.max_size {
            let calls = pending.take();
            drop(pending);
            self.run_batch(calls);
            return Ok(());
        }
        if pending.calls.len() > 1 {
            return Ok(());
        }

        let generation = pending.generation;
        drop(pending);
        thread::sleep(self.batcher.max_delay);

        let mut pending = self.pending_calls()?;
        if pending.generation != generation {
            return Ok(());
        }
        let calls = pending.take();
        drop(pending);
        self.run_batch(calls);
        Ok(())
    }

    fn pending_calls(&self) -> Result<std::sync::MutexGuard<'_, Pending>, StoreError> {
        self.batcher
            .pending
            .lock()
            .map_err(|_| StoreError::LockPoisoned)
    }

    fn run_batch(&self, calls: Vec<BatchCall>) {
        debug!(calls = calls.len(), "flushing write batch");
        let (runs, senders): (Vec<_>, Vec<_>) =
            calls.into_iter().map(|call| (call.run, call.done)).unzip();

        match self.execute_calls(runs) {
            Ok(results) => {
                for (done, result) in senders.into_iter().zip(results) {
                    let _ = done.send(result);
                }
            }
            Err(err) => {
                debug!(calls = senders.len(), error = %err, "write batch failed");
                let mut senders = senders.into_iter();
                let first = senders.next();
                for done in senders {
                    let _ = done.send(Err(share_failure(&err)));
                }
                if let Some(done) = first {
                    let _ = done.send(Err(err));
                }
            }
        }
    }

    fn execute_calls(&self, runs: Vec<BatchFn>) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut results = Vec::with_capacity(runs.len());
        for run in runs {
            tx.execute_batch("SAVEPOINT batch_call")?;
            let result = run(&Tx::new(&tx, true));
            if result.is_ok() {
                tx.execute_batch("RELEASE batch_call")?;
            } else {
                tx.execute_batch("ROLLBACK TO batch_call; RELEASE batch_call")?;
            }
            results.push(result);
        }

        tx.commit()?;
        Ok(results)
    }
}

/// Copy of a failed batch's error for the other waiting callers.
/// `rusqlite::Error` is not `Clone`, so SQLite failures are rebuilt from
/// their result code and message.
fn share_failure(err: &StoreError) -> StoreError {
    match err {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, message)) => {
            let code = rusqlite::ffi::Error::new(code.extended_code);
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, message.clone()))
        }
        StoreError::LockPoisoned => StoreError::LockPoisoned,
        other => StoreError::BatchCommit(other.to_string()),
    }
}
