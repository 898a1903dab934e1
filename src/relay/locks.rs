use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// One async lock per chat session, so a session's messages are processed
/// one at a time no matter how many connections have joined it.
///
/// An entry lives only while some task holds or waits for it.
#[derive(Clone, Default)]
pub struct SessionLocks {
    sessions: LockMap,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds the lock for `session_id`.
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = {
            let mut sessions = self
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        SessionGuard {
            guard: Some(lock.lock_owned().await),
            session_id: session_id.to_string(),
            sessions: self.sessions.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held for the duration of one turn. Dropping it releases the session and
/// forgets the lock if nobody else is waiting on it.
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    session_id: String,
    sessions: LockMap,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Clones are only taken under this mutex, so a count of one means
        // the map holds the last reference.
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sessions
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            sessions.remove(&self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_session_is_exclusive() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("s1").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("s1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn sessions_do_not_block_each_other() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("a").await;
        tokio::time::timeout(Duration::from_secs(1), locks.acquire("b"))
            .await
            .unwrap();
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn idle_sessions_are_forgotten() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("s1").await;
        assert_eq!(locks.len(), 1);

        let other = locks.clone();
        let waiter = tokio::spawn(async move { other.acquire("s1").await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still needs the entry.
        drop(guard);
        assert_eq!(locks.len(), 1);

        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        drop(second);
        assert_eq!(locks.len(), 0);
    }
}
