//! Session cache for the read path.
//!
//! Status and arrivals views hit the cache; anything that writes goes
//! straight at the store and invalidates afterwards. The cache also
//! listens on the [`ChangeFeed`](super::ChangeFeed) so edits made by
//! another workstation drop the affected entry instead of waiting out
//! the TTL.

use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use super::{ChangeFeed, PhotoPhase, ReturnPhoto};
use crate::booking::{Booking, DamageReport};

/// Everything the session view needs, fetched in one pass.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub booking: Booking,
    pub damage_reports: Vec<DamageReport>,
    pub photos: Vec<ReturnPhoto>,
}

impl SessionRecord {
    /// Photos taken at return, the count the evidence floor is held to.
    pub fn return_photo_count(&self) -> usize {
        self.photos
            .iter()
            .filter(|p| p.phase == PhotoPhase::Return)
            .count()
    }
}

/// TTL-bounded cache of session records, keyed by booking reference.
pub struct SessionCache {
    cache: Cache<String, SessionRecord>,
}

impl SessionCache {
    /// 200 entries covers a busy branch day; the TTL bounds staleness
    /// when an invalidation event is missed.
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, 200)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub async fn get(&self, reference: &str) -> Option<SessionRecord> {
        self.cache.get(reference).await
    }

    pub async fn put(&self, reference: &str, record: SessionRecord) {
        self.cache.insert(reference.to_string(), record).await;
    }

    pub async fn invalidate(&self, reference: &str) {
        self.cache.invalidate(reference).await;
        debug!(reference, "session cache entry invalidated");
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Spawn a listener that drops entries named by feed events. The
    /// task ends when the feed's last sender is gone.
    pub fn listen(self: &std::sync::Arc<Self>, feed: &ChangeFeed) -> tokio::task::JoinHandle<()> {
        let mut rx = feed.subscribe();
        let cache = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        cache.invalidate(event.reference()).await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed events: cheap to just start over.
                        debug!(skipped, "change feed lagged, clearing session cache");
                        cache.invalidate_all();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
