// src/session/locks.rs
// Per-session locking so turns on the same conversation never interleave

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Lock key: (project id, topic id)
pub type SessionKey = (String, String);

/// Keyed-lock map. Turns on different sessions proceed in parallel,
/// turns on the same session are serialized.
#[derive(Default)]
pub struct SessionLocks {
    locks: RwLock<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for a (project, topic) pair, created on first use
    pub async fn get_lock(&self, project_id: &str, topic_id: &str) -> Arc<Mutex<()>> {
        let key = (project_id.to_string(), topic_id.to_string());

        if let Some(lock) = self.locks.read().await.get(&key) {
            return lock.clone();
        }

        // Another task may have inserted between the read and write guards
        self.locks
            .write()
            .await
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop locks nobody is holding or waiting on
    pub async fn cleanup_unused(&self) -> usize {
        let mut locks = self.locks.write().await;
        let before = locks.len();
        // the map's own Arc is the only reference left
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_locks_get_or_create() {
        let locks = SessionLocks::new();

        let lock1 = locks.get_lock("p1", "chat").await;
        let lock2 = locks.get_lock("p1", "chat").await;

        assert!(Arc::ptr_eq(&lock1, &lock2));
    }

    #[tokio::test]
    async fn test_session_locks_different_sessions() {
        let locks = SessionLocks::new();

        let same_project_other_topic = locks.get_lock("p1", "a").await;
        let other = locks.get_lock("p1", "b").await;
        let other_project = locks.get_lock("p2", "a").await;

        assert!(!Arc::ptr_eq(&same_project_other_topic, &other));
        assert!(!Arc::ptr_eq(&same_project_other_topic, &other_project));
    }

    #[tokio::test]
    async fn test_session_locks_serialization() {
        let locks = Arc::new(SessionLocks::new());

        let locks1 = locks.clone();
        let locks2 = locks.clone();

        let (tx, mut rx) = tokio::sync::mpsc::channel::<i32>(10);

        // Task 1: acquires lock, sends 1, waits, sends 3
        let tx1 = tx.clone();
        let t1 = tokio::spawn(async move {
            let lock = locks1.get_lock("p", "t").await;
            let _guard = lock.lock().await;
            tx1.send(1).await.unwrap();
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            tx1.send(3).await.unwrap();
        });

        // Task 2: tries to acquire lock shortly after, sends 2 when it gets it
        let tx2 = tx.clone();
        let t2 = tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
            let lock = locks2.get_lock("p", "t").await;
            let _guard = lock.lock().await;
            tx2.send(2).await.unwrap();
        });

        t1.await.unwrap();
        t2.await.unwrap();
        drop(tx);

        let mut results = Vec::new();
        while let Some(v) = rx.recv().await {
            results.push(v);
        }

        assert_eq!(results, vec![1, 3, 2], "Lock should serialize access");
    }

    #[tokio::test]
    async fn test_cleanup_unused_keeps_held_locks() {
        let locks = SessionLocks::new();
        let held = locks.get_lock("p", "held").await;
        let _ = locks.get_lock("p", "idle").await;
        assert_eq!(locks.len().await, 2);

        let removed = locks.cleanup_unused().await;
        assert_eq!(removed, 1);
        assert_eq!(locks.len().await, 1);

        drop(held);
        locks.cleanup_unused().await;
        assert!(locks.is_empty().await);
    }
}
