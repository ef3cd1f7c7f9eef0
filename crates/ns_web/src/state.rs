use std::collections::HashMap;

use ns_core::{Session, SummaryRecord};
use ns_inference::Summarizer;
use tokio::sync::{AcquireError, Mutex, Semaphore, SemaphorePermit};
use uuid::Uuid;

/// Sessions kept before the least recently updated one is dropped.
pub const DEFAULT_SESSION_CAPACITY: usize = 1024;

/// Per-browser sessions, keyed by the session cookie.
///
/// Bounded: once `capacity` sessions exist, recording a new one evicts the
/// session with the oldest `updated_at`. Clearing removes the entry.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// A copy of the session, empty if it has never been written.
    pub async fn get(&self, id: Uuid) -> Session {
        self.sessions
            .lock()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn record(&self, id: Uuid, article: String, summary: SummaryRecord) {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(&id) && sessions.len() >= self.capacity {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.updated_at())
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                tracing::debug!("Session store full, evicted {}", oldest);
            }
        }
        sessions.entry(id).or_default().record(article, summary);
    }

    pub async fn clear(&self, id: Uuid) {
        self.sessions.lock().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

pub struct AppState {
    pub summarizer: Summarizer,
    pub sessions: SessionStore,
    generation_gate: Semaphore,
}

impl AppState {
    pub fn new(summarizer: Summarizer) -> Self {
        Self::with_session_capacity(summarizer, DEFAULT_SESSION_CAPACITY)
    }

    pub fn with_session_capacity(summarizer: Summarizer, capacity: usize) -> Self {
        Self {
            summarizer,
            sessions: SessionStore::with_capacity(capacity),
            generation_gate: Semaphore::new(1),
        }
    }

    /// Wait for the single generation slot.
    pub async fn generation_permit(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.generation_gate.acquire().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use ns_core::SummaryRequest;

    use super::*;

    fn record_at(text: &str, generated_at: DateTime<Utc>) -> SummaryRecord {
        SummaryRecord {
            text: text.to_string(),
            request: SummaryRequest::default(),
            generated_at,
            elapsed: Duration::from_millis(10),
            truncated: false,
        }
    }

    fn record(text: &str) -> SummaryRecord {
        record_at(text, Utc::now())
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store.record(a, "article a".to_string(), record("summary a")).await;
        assert_eq!(store.get(a).await.article_text(), Some("article a"));
        assert!(store.get(b).await.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear_removes_entry() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        store.record(id, "article".to_string(), record("summary")).await;

        store.clear(Uuid::new_v4()).await;
        assert_eq!(store.len().await, 1);

        store.clear(id).await;
        assert!(store.get(id).await.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_updated() {
        let store = SessionStore::with_capacity(3);
        let start = Utc::now();
        let ids: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();

        for (i, id) in ids.iter().enumerate() {
            let at = start + chrono::Duration::seconds(i as i64);
            store.record(*id, format!("article {}", i), record_at("s", at)).await;
            assert!(store.len().await <= 3);
        }

        for id in &ids[..7] {
            assert!(store.get(*id).await.is_empty());
        }
        for id in &ids[7..] {
            assert!(!store.get(*id).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_rewriting_existing_session_does_not_evict() {
        let store = SessionStore::with_capacity(2);
        let start = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.record(a, "a".to_string(), record_at("s", start)).await;
        store
            .record(b, "b".to_string(), record_at("s", start + chrono::Duration::seconds(1)))
            .await;
        store
            .record(a, "a2".to_string(), record_at("s", start + chrono::Duration::seconds(2)))
            .await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(a).await.article_text(), Some("a2"));
        assert_eq!(store.get(b).await.article_text(), Some("b"));
    }
}
