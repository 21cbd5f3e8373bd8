//! Response Cache (C3): per-session memoization of tool calls, bounded and
//! LRU-evicted, dropped wholesale at session end.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::types::SessionId;

struct SessionCache {
    entries: DashMap<String, Value>,
    /// Recency order for LRU eviction; front is least recently used.
    order: Mutex<VecDeque<String>>,
    max_entries: usize,
}

impl SessionCache {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_entries,
        }
    }

    async fn touch(&self, key: &str) {
        let mut order = self.order.lock().await;
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.to_string());
    }

    async fn insert(&self, key: String, value: Value) {
        self.entries.insert(key.clone(), value);
        self.touch(&key).await;

        let mut order = self.order.lock().await;
        while order.len() > self.max_entries {
            if let Some(evict) = order.pop_front() {
                self.entries.remove(&evict);
            }
        }
    }
}

/// Session-scoped tool-response cache keyed by `ToolInvocation::cache_key`.
/// Writes are idempotent (last-writer-wins, §5); reads never block on a
/// miss — callers fall through to a tool call themselves.
pub struct ResponseCache {
    sessions: DashMap<SessionId, Arc<SessionCache>>,
    max_entries_per_session: usize,
}

impl ResponseCache {
    pub fn new(max_entries_per_session: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_entries_per_session,
        }
    }

    fn session(&self, session_id: &SessionId) -> Arc<SessionCache> {
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(SessionCache::new(self.max_entries_per_session)))
            .clone()
    }

    pub async fn get(&self, session_id: &SessionId, cache_key: &str) -> Option<Value> {
        let session = self.session(session_id);
        let hit = session.entries.get(cache_key).map(|v| v.clone());
        if hit.is_some() {
            session.touch(cache_key).await;
        }
        hit
    }

    pub async fn put(&self, session_id: &SessionId, cache_key: String, value: Value) {
        let session = self.session(session_id);
        session.insert(cache_key, value).await;
    }

    /// Drop every cached entry for a session; entries never survive it (§3).
    pub fn end_session(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_put_then_hit() {
        let cache = ResponseCache::new(256);
        let session = SessionId::new("s1");
        assert!(cache.get(&session, "k1").await.is_none());

        cache.put(&session, "k1".into(), serde_json::json!({"a": 1})).await;
        assert_eq!(cache.get(&session, "k1").await, Some(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn entries_scoped_to_session() {
        let cache = ResponseCache::new(256);
        let s1 = SessionId::new("s1");
        let s2 = SessionId::new("s2");
        cache.put(&s1, "k".into(), serde_json::json!(1)).await;
        assert!(cache.get(&s2, "k").await.is_none());
    }

    #[tokio::test]
    async fn end_session_drops_all_entries() {
        let cache = ResponseCache::new(256);
        let session = SessionId::new("s1");
        cache.put(&session, "k".into(), serde_json::json!(1)).await;
        cache.end_session(&session);
        assert!(cache.get(&session, "k").await.is_none());
    }

    #[tokio::test]
    async fn bounded_cache_evicts_least_recently_used() {
        let cache = ResponseCache::new(2);
        let session = SessionId::new("s1");
        cache.put(&session, "a".into(), serde_json::json!(1)).await;
        cache.put(&session, "b".into(), serde_json::json!(2)).await;
        // touch "a" so "b" becomes the least recently used
        let _ = cache.get(&session, "a").await;
        cache.put(&session, "c".into(), serde_json::json!(3)).await;

        assert!(cache.get(&session, "b").await.is_none());
        assert!(cache.get(&session, "a").await.is_some());
        assert!(cache.get(&session, "c").await.is_some());
    }
}
