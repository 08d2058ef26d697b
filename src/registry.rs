/// Registry of trackers keyed by entity identity.
///
/// Hosts that want one tracker per entity without threading a [`Tracker`]
/// through every call site can keep them in a [`TrackerRegistry`]. Trackers
/// are created on first use from the registry's configuration and shared
/// observers; nothing is shared between entities implicitly.
///
/// The registry itself is safe to share across threads. Each tracker is
/// still a single-owner structure guarded by its map entry's lock.
/// [`TrackerRegistry::record_change`] appends under that lock and runs the
/// observers after releasing it, so observers may call back into the
/// registry. [`TrackerRegistry::with_tracker`] holds the lock for the whole
/// closure.
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::TrackResult;
use crate::observers::{dispatch_to, ObserverRef};
use crate::tracker::{Tracker, TrackerConfig};

/// Trackers keyed by entity identity.
pub struct TrackerRegistry {
    trackers: DashMap<String, Tracker>,
    config: TrackerConfig,
    observers: Vec<ObserverRef>,
}

impl TrackerRegistry {
    /// Create a registry whose trackers use `config`.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            trackers: DashMap::new(),
            config,
            observers: Vec::new(),
        }
    }

    /// Add an observer to every tracker created after this call.
    pub fn with_observer(mut self, observer: ObserverRef) -> Self {
        self.observers.push(observer);
        self
    }

    fn create(&self, key: &str) -> Tracker {
        debug!(key, "tracker created");
        self.observers
            .iter()
            .cloned()
            .fold(Tracker::with_config(self.config.clone()), |tracker, observer| {
                tracker.with_observer(observer)
            })
    }

    /// Run `f` against the tracker for `key`, creating it if needed.
    ///
    /// The entry stays locked while `f` runs, and so does its shard of the
    /// map: `f` (and any observer a write inside `f` dispatches to) must not
    /// access the registry, or it can deadlock. Use
    /// [`record_change`](Self::record_change) for writes whose observers
    /// need the registry.
    pub fn with_tracker<R>(&self, key: &str, f: impl FnOnce(&mut Tracker) -> R) -> R {
        let mut entry = self
            .trackers
            .entry(key.to_string())
            .or_insert_with(|| self.create(key));
        f(entry.value_mut())
    }

    /// Record a write on the tracker for `key`.
    ///
    /// Observers run once the entry's lock is released; they see the write
    /// already in the log.
    pub fn record_change(
        &self,
        key: &str,
        attribute: &str,
        old: JsonValue,
        new: JsonValue,
    ) -> TrackResult<()> {
        let pending = self.with_tracker(key, |tracker| {
            if !tracker.record(attribute, old, new) || !tracker.auto_notify() {
                return None;
            }
            let entry = tracker.history().entries().last()?.clone();
            Some((tracker.resolve_observers(attribute).to_vec(), entry))
        });

        match pending {
            Some((observers, entry)) => dispatch_to(
                &observers,
                entry.attribute(),
                entry.old_value(),
                entry.new_value(),
            ),
            None => Ok(()),
        }
    }

    /// Whether the entity under `key` has changed, if it has a tracker.
    pub fn get_changed(&self, key: &str) -> Option<bool> {
        self.trackers.get(key).map(|tracker| tracker.changed())
    }

    /// Remove and return the tracker for `key`.
    pub fn remove(&self, key: &str) -> Option<Tracker> {
        self.trackers.remove(key).map(|(_, tracker)| tracker)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.trackers.contains_key(key)
    }

    /// Number of trackers.
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Keys of all registered trackers, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.trackers.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for TrackerRegistry {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
