//! Per-tenant provider client pool with TTL-based invalidation
//!
//! Tenants can carry their own provider credentials; clients are cached per
//! tenant and dropped after a TTL or on explicit invalidation (credential
//! update). Time is injected so tests control expiry deterministically.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock implementation
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CachedEntry<T> {
    client: Arc<T>,
    inserted_at: Instant,
}

/// TTL cache of per-tenant provider clients
pub struct ProviderCache<T> {
    entries: DashMap<Uuid, CachedEntry<T>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T> ProviderCache<T> {
    /// Create a cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an injected clock
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Get the cached client for a tenant, or build and cache one
    pub fn get_or_insert_with<F>(&self, tenant_id: Uuid, build: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(&tenant_id) {
            if now.duration_since(entry.inserted_at) < self.ttl {
                return entry.client.clone();
            }
        }
        let client = Arc::new(build());
        self.entries.insert(
            tenant_id,
            CachedEntry {
                client: client.clone(),
                inserted_at: now,
            },
        );
        client
    }

    /// Drop the cached client for a tenant (call on credential update)
    pub fn invalidate(&self, tenant_id: Uuid) {
        self.entries.remove(&tenant_id);
    }

    /// Drop all cached clients
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached clients, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
