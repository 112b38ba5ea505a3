//! Serve-or-refresh decider for cached graphs.
//!
//! A cached graph is served only when it is large enough to be a real
//! rendering and young enough to be current. Anything else is reported to
//! the caller as a refresh signal rather than served.

use crate::traits::{CounterStore, ObjectInfo, ObjectStore};
use cgraph_core::{
    FreshnessPolicy, GraphError, GraphResult, RefreshReason, RenderRequest, Timestamp,
    TrafficCounter,
};
use chrono::Utc;
use std::time::Duration;

/// Classification of the object stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing stored.
    Missing,
    /// Smaller than the minimum viable size.
    TooSmall { size_bytes: u64 },
    /// Older than the maximum age.
    Stale { age: Duration },
    /// Servable.
    Fresh,
}

impl CacheState {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Read path: serve a fresh graph or tell the caller to regenerate it.
#[derive(Debug, Clone)]
pub struct ServeOrRefresh<O, C> {
    objects: O,
    counters: C,
    policy: FreshnessPolicy,
}

impl<O: ObjectStore, C: CounterStore> ServeOrRefresh<O, C> {
    pub fn new(objects: O, counters: C, policy: FreshnessPolicy) -> Self {
        Self {
            objects,
            counters,
            policy,
        }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// Classify an object by size, then by age relative to `now`.
    ///
    /// Both limits are exclusive: an object of exactly `min_size_bytes`
    /// or exactly `max_age` old is fresh.
    pub fn classify(&self, info: Option<&ObjectInfo>, now: Timestamp) -> CacheState {
        let Some(info) = info else {
            return CacheState::Missing;
        };
        if info.size < self.policy.min_size_bytes {
            return CacheState::TooSmall {
                size_bytes: info.size,
            };
        }
        // Modification times in the future count as brand new.
        let age = (now - info.last_modified).to_std().unwrap_or(Duration::ZERO);
        if age > self.policy.max_age {
            return CacheState::Stale { age };
        }
        CacheState::Fresh
    }

    pub async fn get_or_signal_refresh(&self, request: &RenderRequest) -> GraphResult<Vec<u8>> {
        self.get_or_signal_refresh_at(request, Utc::now()).await
    }

    /// Serve the cached graph for `request` as of `now`.
    ///
    /// Returns `NotFound` or `NeedsUpdate` when the caller should regenerate.
    /// Serving a graph bumps its traffic counter; counter failures are
    /// returned as errors.
    pub async fn get_or_signal_refresh_at(
        &self,
        request: &RenderRequest,
        now: Timestamp,
    ) -> GraphResult<Vec<u8>> {
        let key = request.object_key();
        let object = self.objects.open(&key).await?;

        let state = self.classify(object.as_ref().map(|o| &o.info), now);
        tracing::debug!(key = %key, state = ?state, "Cache decision");

        let object = match (state, object) {
            (CacheState::Fresh, Some(object)) => object,
            (CacheState::TooSmall { size_bytes }, _) => {
                return Err(GraphError::NeedsUpdate {
                    key: key.to_string(),
                    reason: RefreshReason::TooSmall {
                        size_bytes,
                        min_size_bytes: self.policy.min_size_bytes,
                    },
                })
            }
            (CacheState::Stale { age }, _) => {
                return Err(GraphError::NeedsUpdate {
                    key: key.to_string(),
                    reason: RefreshReason::Stale {
                        age,
                        max_age: self.policy.max_age,
                    },
                })
            }
            _ => {
                return Err(GraphError::NotFound {
                    key: key.to_string(),
                })
            }
        };
        let content = object.read_to_end(&key).await?;

        self.record_access(&request.subject_key(), now).await?;
        Ok(content)
    }

    /// Read-then-write increment; concurrent readers may lose updates.
    async fn record_access(&self, subject_key: &str, now: Timestamp) -> GraphResult<()> {
        let counter = match self.counters.get_counter(subject_key).await? {
            Some(counter) => counter.incremented(now),
            None => TrafficCounter::first(subject_key, now),
        };
        self.counters.put_counter(&counter).await?;
        Ok(())
    }
}
