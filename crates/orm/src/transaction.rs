//! Scoped transactions with savepoint nesting.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::db::Db;

/// Transaction bookkeeping shared by every clone of a [`Db`].
#[derive(Debug, Default)]
pub(crate) struct TxState {
    depth: AtomicUsize,
    // rollback statements left behind by scopes dropped before they settled
    owed: Mutex<Vec<String>>,
}

impl TxState {
    pub(crate) fn take_owed(&self) -> Vec<String> {
        std::mem::take(&mut *self.owed.lock())
    }
}

// Releases one nesting level however the scope exits. A level dropped before
// it commits or rolls back leaves its rollback owed to the next statement.
struct LevelGuard {
    state: Arc<TxState>,
    level: Level,
    settled: bool,
}

impl LevelGuard {
    fn enter(state: &Arc<TxState>) -> Self {
        let depth = state.depth.fetch_add(1, Ordering::SeqCst);
        let level = if depth == 0 { Level::Outer } else { Level::Savepoint(format!("sp_{depth}")) };
        Self {
            state: Arc::clone(state),
            level,
            settled: false,
        }
    }
}

impl Drop for LevelGuard {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(level = ?self.level, "transaction dropped before settling; rollback deferred");
            self.state.owed.lock().extend(self.level.rollback());
        }
        self.state.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    Outer,
    Savepoint(String),
}

impl Level {
    fn begin(&self) -> String {
        match self {
            Self::Outer => "BEGIN".to_string(),
            Self::Savepoint(name) => format!("SAVEPOINT {name}"),
        }
    }

    fn commit(&self) -> String {
        match self {
            Self::Outer => "COMMIT".to_string(),
            Self::Savepoint(name) => format!("RELEASE SAVEPOINT {name}"),
        }
    }

    fn rollback(&self) -> Vec<String> {
        match self {
            Self::Outer => vec!["ROLLBACK".to_string()],
            // a rolled-back savepoint stays on the stack until released
            Self::Savepoint(name) => {
                vec![format!("ROLLBACK TO SAVEPOINT {name}"), format!("RELEASE SAVEPOINT {name}")]
            }
        }
    }
}

impl Db {
    /// Runs `scope` inside a transaction.
    ///
    /// The transaction commits when `scope` returns `Ok` and rolls back when
    /// it returns `Err` or panics; the panic is then resumed. Calls nested
    /// inside another transaction use a savepoint, so an inner failure only
    /// undoes the inner work.
    ///
    /// If the returned future is dropped before it settles, the rollback is
    /// sent ahead of the next statement issued through this `Db` or its clones.
    ///
    /// Clones of a `Db` share one connection, so transactions on clones must
    /// not interleave.
    ///
    /// ```ignore
    /// db.transaction(|db| async move {
    ///     db.save(&mut order).await?;
    ///     db.save(&mut invoice).await
    /// })
    /// .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the error from `scope`, or the engine's error when the
    /// transaction cannot begin or commit.
    pub async fn transaction<F, Fut, T>(&self, scope: F) -> Result<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut guard = LevelGuard::enter(&self.tx);
        let level = guard.level.clone();

        if let Err(e) = self.execute(level.begin(), Vec::new()).await {
            guard.settled = true;
            return Err(e);
        }
        tracing::debug!(?level, "transaction started");

        let outcome = AssertUnwindSafe(scope(self.clone())).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => {
                let committed = self.execute(level.commit(), Vec::new()).await;
                if committed.is_err() {
                    self.rollback(&level).await;
                }
                guard.settled = true;
                committed.map(|_| value)
            }
            Ok(Err(e)) => {
                tracing::debug!(?level, error = %e, "rolling back transaction");
                self.rollback(&level).await;
                guard.settled = true;
                Err(e)
            }
            Err(panic) => {
                self.rollback(&level).await;
                guard.settled = true;
                std::panic::resume_unwind(panic)
            }
        }
    }

    // The scope's error is what callers see; a failed rollback is only logged.
    async fn rollback(&self, level: &Level) {
        for sql in level.rollback() {
            if let Err(e) = self.execute(sql, Vec::new()).await {
                tracing::warn!(error = %e, "rollback failed");
            }
        }
    }
}
