//! Per-session conversation memory backed by SQLite.
//!
//! Every completed exchange appends a human turn and an assistant turn to
//! an append-only log keyed by `"{user_id}_{session_id}"`. Reads return only
//! the most recent `window_pairs` exchanges, oldest first.
//!
//! Saves to the same session are serialised through a per-session async
//! lock, so two concurrent requests in one session cannot interleave their
//! turns. Different sessions never contend.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db;
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Role, SessionKey, Turn};

pub struct ChatMemory {
    pool: SqlitePool,
    window_pairs: usize,
    session_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatMemory {
    /// Open (creating if needed) the history database at `path`.
    pub async fn open(path: &Path, window_pairs: usize) -> Result<Self> {
        if window_pairs == 0 {
            return Err(RagError::InvalidInput(
                "memory window must hold at least one exchange".into(),
            ));
        }
        let pool = db::connect(path).await?;
        migrate::migrate_history(&pool).await?;
        Ok(Self {
            pool,
            window_pairs,
            session_locks: StdMutex::new(HashMap::new()),
        })
    }

    pub fn window_pairs(&self) -> usize {
        self.window_pairs
    }

    /// The last `window_pairs` exchanges for `key`, in chronological order.
    pub async fn load(&self, key: &SessionKey) -> Result<Vec<Turn>> {
        let limit = (self.window_pairs * 2) as i64;
        let rows = sqlx::query(
            r#"
            SELECT role, content FROM chat_history
            WHERE session_key = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(key.storage_key())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let role: String = row.get("role");
            let role = Role::parse(&role)
                .ok_or_else(|| anyhow::anyhow!("unknown role in chat history: {}", role))?;
            turns.push(Turn {
                role,
                content: row.get("content"),
            });
        }

        // A window cut mid-exchange would start with an assistant turn.
        if turns.first().map(|t| t.role) == Some(Role::Assistant) {
            turns.remove(0);
        }
        Ok(turns)
    }

    /// Append one exchange atomically.
    pub async fn save(&self, key: &SessionKey, query: &str, answer: &str) -> Result<()> {
        let session = self.lock_session(key).await;
        session.save(query, answer).await
    }

    /// Serialise a whole request in one session: hold the returned guard
    /// across load, generation and save.
    pub async fn lock_session(&self, key: &SessionKey) -> SessionGuard<'_> {
        let storage_key = key.storage_key();
        let lock = self.session_lock(&storage_key);
        let guard = lock.clone().lock_owned().await;
        SessionGuard {
            memory: self,
            key: key.clone(),
            lock: Some(lock),
            guard: Some(guard),
        }
    }

    async fn append(&self, key: &SessionKey, query: &str, answer: &str) -> Result<()> {
        let storage_key = key.storage_key();
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for (role, content) in [(Role::Human, query), (Role::Assistant, answer)] {
            sqlx::query(
                r#"
                INSERT INTO chat_history (session_key, user_id, session_id, role, content, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&storage_key)
            .bind(&key.user_id)
            .bind(&key.session_id)
            .bind(role.as_str())
            .bind(content)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn session_lock(&self, storage_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(storage_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock once no request holds or awaits it.
    fn release_session_lock(&self, storage_key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if let Some(entry) = locks.get(storage_key) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(storage_key);
            }
        }
    }

    /// Session ids for `user_id`, most recently active first.
    pub async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, MAX(id) AS last_id FROM chat_history
            WHERE user_id = ?
            GROUP BY session_id
            ORDER BY last_id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("session_id")).collect())
    }

    /// Delete turns recorded before `cutoff`. Returns the number removed.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_history WHERE created_at < ?")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Exclusive access to one session, released on drop.
pub struct SessionGuard<'a> {
    memory: &'a ChatMemory,
    key: SessionKey,
    lock: Option<Arc<Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionGuard<'_> {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub async fn load(&self) -> Result<Vec<Turn>> {
        self.memory.load(&self.key).await
    }

    pub async fn save(&self, query: &str, answer: &str) -> Result<()> {
        self.memory.append(&self.key, query, answer).await
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Some(lock) = self.lock.take() {
            self.memory
                .release_session_lock(&self.key.storage_key(), lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir, window_pairs: usize) -> ChatMemory {
        ChatMemory::open(&tmp.path().join("history.sqlite"), window_pairs)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn window_keeps_last_pairs_oldest_first() {
        let tmp = TempDir::new().unwrap();
        let memory = open(&tmp, 5).await;
        let key = SessionKey::new("alice", "s1");
        for i in 1..=7 {
            memory
                .save(&key, &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }

        let turns = memory.load(&key).await.unwrap();
        assert_eq!(turns.len(), 10);
        assert_eq!(turns[0], Turn::human("q3"));
        assert_eq!(turns[1], Turn::assistant("a3"));
        assert_eq!(turns[9], Turn::assistant("a7"));
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let tmp = TempDir::new().unwrap();
        let memory = open(&tmp, 5).await;
        let turns = memory.load(&SessionKey::new("nobody", "x")).await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn same_session_id_for_different_users_is_isolated() {
        let tmp = TempDir::new().unwrap();
        let memory = open(&tmp, 5).await;
        let alice = SessionKey::new("alice", "shared");
        let bob = SessionKey::new("bob", "shared");
        memory.save(&alice, "alice asks", "to alice").await.unwrap();
        memory.save(&bob, "bob asks", "to bob").await.unwrap();

        let turns = memory.load(&alice).await.unwrap();
        assert_eq!(turns, vec![Turn::human("alice asks"), Turn::assistant("to alice")]);
    }

    #[tokio::test]
    async fn concurrent_saves_keep_pairs_adjacent() {
        let tmp = TempDir::new().unwrap();
        let memory = Arc::new(open(&tmp, 50).await);
        let key = SessionKey::new("alice", "s1");

        let mut handles = Vec::new();
        for i in 0..10 {
            let memory = memory.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                memory
                    .save(&key, &format!("q{}", i), &format!("a{}", i))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let turns = memory.load(&key).await.unwrap();
        assert_eq!(turns.len(), 20);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::Human);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(&pair[0].content[1..], &pair[1].content[1..]);
        }
        assert!(memory.session_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let key = SessionKey::new("alice", "s1");
        {
            let memory = open(&tmp, 5).await;
            memory.save(&key, "hello", "hi there").await.unwrap();
            memory.close().await;
        }
        let memory = open(&tmp, 5).await;
        assert_eq!(memory.load(&key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lists_sessions_most_recent_first() {
        let tmp = TempDir::new().unwrap();
        let memory = open(&tmp, 5).await;
        memory.save(&SessionKey::new("u", "old"), "q", "a").await.unwrap();
        memory.save(&SessionKey::new("u", "new"), "q", "a").await.unwrap();
        memory.save(&SessionKey::new("other", "x"), "q", "a").await.unwrap();
        assert_eq!(memory.sessions_for_user("u").await.unwrap(), vec!["new", "old"]);
    }

    #[tokio::test]
    async fn prune_removes_old_turns() {
        let tmp = TempDir::new().unwrap();
        let memory = open(&tmp, 5).await;
        let key = SessionKey::new("u", "s");
        memory.save(&key, "q", "a").await.unwrap();

        let removed = memory
            .prune_older_than(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = memory
            .prune_older_than(Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(memory.load(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_window_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = ChatMemory::open(&tmp.path().join("h.sqlite"), 0)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }
}
