//! The file-system transaction layer.
//!
//! Every operation that writes file-system state runs inside a transaction
//! bracketed by [`begin_op`] and the drop of the returned [`Transaction`].
//! Holding the transaction as a guard guarantees release on every exit path,
//! including early returns and panics during unwinding.
//!
//! In the on-disk implementation, `begin_op` blocks while the log is too
//! full to admit another operation and the commit writes the journal out.
//! The in-memory model keeps the same bracket structure and tracks how many
//! operations are outstanding and how many batches have committed, so the
//! discipline stays observable.

use spin::Mutex;

static LOG: Mutex<LogState> = Mutex::new(LogState {
    outstanding: 0,
    commits: 0,
});

struct LogState {
    /// Number of operations currently inside a transaction.
    outstanding: usize,
    /// Number of commit points reached (outstanding dropping to zero).
    commits: usize,
}

/// Guard for one file-system operation.
///
/// The operation ends when the guard is dropped.
#[must_use = "the transaction ends when this guard is dropped"]
pub struct Transaction {
    _private: (),
}

/// Starts a file-system operation.
pub fn begin_op() -> Transaction {
    LOG.lock().outstanding += 1;
    Transaction { _private: () }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let mut log = LOG.lock();
        log.outstanding -= 1;
        if log.outstanding == 0 {
            log.commits += 1;
        }
    }
}

/// Number of operations currently inside a transaction.
pub fn outstanding() -> usize {
    LOG.lock().outstanding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transactions_nest_and_release() {
        // Other tests may run transactions concurrently, so only lower
        // bounds on the outstanding count can be asserted.
        let outer = begin_op();
        assert!(outstanding() >= 1);
        {
            let _inner = begin_op();
            assert!(outstanding() >= 2);
        }
        assert!(outstanding() >= 1);
        drop(outer);
    }
}
