//! Per-session mutual exclusion
//!
//! Turns on the same session id queue on one async mutex (tokio's mutex is
//! FIFO, so they run in arrival order). Entries are dropped once no turn holds
//! or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct SessionLocks {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the whole turn; releasing it lets the next queued turn run
pub struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    entry: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        // map is only touched in short non-panicking sections
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn acquire(&self, session_id: &str) -> SessionGuard<'_> {
        let entry = self
            .entries()
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();

        let guard = entry.clone().lock_owned().await;

        SessionGuard {
            locks: self,
            session_id: session_id.to_string(),
            entry,
            guard: Some(guard),
        }
    }

    /// Number of session ids with a live lock entry
    pub fn active(&self) -> usize {
        self.entries().len()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut entries = self.locks.entries();
        // one reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&self.entry) == 2 {
            entries.remove(&self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let locks = Arc::new(SessionLocks::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = locks.acquire("s").await;

        let waiter = {
            let locks = locks.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("s").await;
                log.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.lock().unwrap().push("first");
        drop(first);

        waiter.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_distinct_sessions_do_not_block() {
        let locks = SessionLocks::new();

        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }
}
