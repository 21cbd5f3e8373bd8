//! Bounded per-category connection pool with a cooldown circuit breaker
//! (§4.1 pooling/retry, supplemented per SPEC_FULL.md §2).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::timeout as tokio_timeout;

use crate::types::{ToolCategory, TransportError};

use super::connection::{Connection, ToolServerSpec};

/// Trips after this many consecutive failures for a category, then refuses
/// further acquires for `cooldown` before letting one probe through.
const FAILURE_THRESHOLD: u32 = 5;

struct CircuitState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

struct Breaker {
    state: parking_lot::Mutex<CircuitState>,
    cooldown: Duration,
}

impl Breaker {
    fn new(cooldown: Duration) -> Self {
        Self {
            state: parking_lot::Mutex::new(CircuitState::default()),
            cooldown,
        }
    }

    fn allow(&self) -> bool {
        let mut state = self.state.lock();
        match state.opened_at {
            None => true,
            Some(opened) if opened.elapsed() >= self.cooldown => {
                // Half-open: let one probe through, reset the clock so a
                // second caller doesn't pile on while it's in flight.
                state.opened_at = Some(Instant::now());
                true
            }
            Some(_) => false,
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= FAILURE_THRESHOLD && state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
        }
    }
}

/// Per-category bounded pool of idle connections plus in-flight accounting,
/// capped at `capacity` total connections per category (default 3, §6).
struct CategoryPool {
    spec: ToolServerSpec,
    capacity: usize,
    idle: Mutex<Vec<Connection>>,
    outstanding: std::sync::atomic::AtomicUsize,
    breaker: Breaker,
}

impl CategoryPool {
    fn new(spec: ToolServerSpec, capacity: usize, breaker_cooldown: Duration) -> Self {
        Self {
            spec,
            capacity,
            idle: Mutex::new(Vec::new()),
            outstanding: std::sync::atomic::AtomicUsize::new(0),
            breaker: Breaker::new(breaker_cooldown),
        }
    }
}

/// The full pool: one `CategoryPool` per tool category, each sized and
/// spawned independently (§4.1, §6 `pool.capacity = 3`).
pub struct ConnectionPool {
    categories: DashMap<ToolCategory, CategoryPool>,
    acquire_deadline: Duration,
    ping_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(
        specs: HashMap<ToolCategory, ToolServerSpec>,
        capacity: usize,
        acquire_deadline: Duration,
        breaker_cooldown: Duration,
        ping_timeout: Duration,
    ) -> Self {
        let categories = DashMap::new();
        for (category, spec) in specs {
            categories.insert(category, CategoryPool::new(spec, capacity, breaker_cooldown));
        }
        Self {
            categories,
            acquire_deadline,
            ping_timeout,
        }
    }

    /// Acquire a healthy, initialized connection for `category`, spawning a
    /// fresh one if the idle pool is empty and capacity allows. Blocks up to
    /// `acquire_deadline` before returning `PoolExhausted` (§6 default 5s).
    pub async fn acquire(&self, category: ToolCategory) -> Result<Connection, TransportError> {
        let entry = self.categories.get(&category).ok_or_else(|| TransportError::ToolUnavailable {
            tool: category.to_string(),
            reason: "no tool server configured for this category".into(),
        })?;

        if !entry.breaker.allow() {
            return Err(TransportError::ToolUnavailable {
                tool: category.to_string(),
                reason: "circuit open: too many recent failures for this category".into(),
            });
        }

        let acquired = tokio_timeout(self.acquire_deadline, self.acquire_inner(&entry)).await;

        match acquired {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                entry.breaker.record_failure();
                Err(e)
            }
            Err(_) => {
                entry.breaker.record_failure();
                Err(TransportError::PoolExhausted {
                    category: category.to_string(),
                    timeout_ms: self.acquire_deadline.as_millis() as u64,
                })
            }
        }
    }

    async fn acquire_inner(&self, entry: &CategoryPool) -> Result<Connection, TransportError> {
        loop {
            let candidate = {
                let mut idle = entry.idle.lock().await;
                idle.pop()
            };

            if let Some(mut conn) = candidate {
                if conn.ping(self.ping_timeout).await {
                    conn.in_flight = true;
                    return Ok(conn);
                }
                // Unhealthy idle connection: drop it and try the next one or
                // spawn. Decrement outstanding first — this connection no
                // longer counts against capacity once terminated, and the
                // next loop iteration (or caller recycling it) will spawn a
                // fresh one and fetch_add its own count.
                entry.outstanding.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                conn.terminate(Duration::from_secs(2)).await;
                continue;
            }

            let outstanding = entry.outstanding.load(std::sync::atomic::Ordering::SeqCst);
            if outstanding >= entry.capacity {
                // At capacity with nothing idle: briefly yield and retry
                // until the caller's acquire_deadline elapses.
                tokio::time::sleep(Duration::from_millis(25)).await;
                continue;
            }

            let mut conn = Connection::spawn(&entry.spec, Duration::from_secs(5)).await?;
            conn.ensure_initialized(self.ping_timeout).await?;
            conn.in_flight = true;
            entry.outstanding.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            return Ok(conn);
        }
    }

    /// Return a connection to the idle pool, or terminate it if it came back
    /// unhealthy. Always records the call outcome against the breaker.
    pub async fn release(&self, category: ToolCategory, mut conn: Connection, call_succeeded: bool) {
        let Some(entry) = self.categories.get(&category) else {
            conn.terminate(Duration::from_secs(2)).await;
            return;
        };

        if call_succeeded {
            entry.breaker.record_success();
        } else {
            entry.breaker.record_failure();
        }

        conn.in_flight = false;
        if conn.healthy {
            let mut idle = entry.idle.lock().await;
            idle.push(conn);
        } else {
            entry.outstanding.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            conn.terminate(Duration::from_secs(2)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_spec(category: ToolCategory) -> ToolServerSpec {
        ToolServerSpec {
            category,
            command: "cat".into(),
            args: vec![],
        }
    }

    fn test_pool() -> ConnectionPool {
        let mut specs = HashMap::new();
        specs.insert(ToolCategory::Search, cat_spec(ToolCategory::Search));
        ConnectionPool::new(
            specs,
            2,
            Duration::from_secs(2),
            Duration::from_millis(200),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn acquire_unconfigured_category_is_tool_unavailable() {
        let pool = test_pool();
        let result = pool.acquire(ToolCategory::Clinical).await;
        assert!(matches!(result, Err(TransportError::ToolUnavailable { .. })));
    }

    #[tokio::test]
    async fn acquire_release_reuses_idle_connection() {
        let pool = test_pool();
        let conn = pool.acquire(ToolCategory::Search).await.unwrap();
        pool.release(ToolCategory::Search, conn, true).await;

        let entry = pool.categories.get(&ToolCategory::Search).unwrap();
        assert_eq!(entry.idle.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn breaker_opens_after_repeated_failures() {
        let entry_cooldown = Duration::from_secs(60);
        let mut specs = HashMap::new();
        specs.insert(ToolCategory::Search, cat_spec(ToolCategory::Search));
        let pool = ConnectionPool::new(specs, 2, Duration::from_millis(300), entry_cooldown, Duration::from_millis(100));

        {
            let entry = pool.categories.get(&ToolCategory::Search).unwrap();
            for _ in 0..FAILURE_THRESHOLD {
                entry.breaker.record_failure();
            }
        }

        let result = pool.acquire(ToolCategory::Search).await;
        assert!(matches!(result, Err(TransportError::ToolUnavailable { .. })));
    }
}
