/// The tracker: change-detection facade over one change log.
///
/// A [`Tracker`] owns exactly one [`ChangeLog`], the observer routing for
/// the entity it tracks, and an optional baseline [`Snapshot`]. Whether a
/// change query is answered from the log or from the baseline depends on
/// whether a baseline was captured:
///
/// | query                          | no baseline          | baseline set          |
/// |--------------------------------|----------------------|-----------------------|
/// | `attribute_changed(a)`         | log net change       | live view vs baseline |
/// | `changed()`                    | any log net change   | live view vs baseline |
/// | `attribute_changed_against(..)`| `MissingBaseline`    | entity vs baseline    |
/// | `changed_against(..)`          | `MissingBaseline`    | entity vs baseline    |
///
/// The tracker does not own the entity. Once baselined it keeps a *live
/// view*: a copy of the baseline that every [`record_change`] updates, so it
/// mirrors the entity as long as all writes go through `record_change`.
/// [`Tracked`](crate::Tracked) also re-seeds it from the entity it wraps.
///
/// [`record_change`]: Tracker::record_change
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::changelog::ChangeLog;
use crate::error::{TrackError, TrackResult};
use crate::observers::{ObserverRef, ObserverRouting};
use crate::types::Snapshot;

/// Tracker configuration.
///
/// Deserializable so hosts can load it alongside their own settings; any
/// missing field takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Dispatch observers automatically on every recorded write.
    pub auto_notify: bool,
    /// Suppress logging and notification of writes made while the tracker is
    /// in its initialization phase.
    pub ignore_init: bool,
    /// Attributes eligible for global observers (empty = all).
    pub observable_attributes: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            auto_notify: true,
            ignore_init: true,
            observable_attributes: Vec::new(),
        }
    }
}

/// Lifecycle phase for the two-phase construction protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    Tracking,
}

/// Change tracker for one entity.
#[derive(Clone)]
pub struct Tracker {
    log: ChangeLog,
    routing: ObserverRouting,
    auto_notify: bool,
    ignore_init: bool,
    phase: Phase,
    initial_state: Option<Snapshot>,
    live: Option<Snapshot>,
}

impl Tracker {
    /// Create a tracker with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    /// Create a tracker with a custom configuration.
    pub fn with_config(config: TrackerConfig) -> Self {
        let mut routing = ObserverRouting::new();
        for attribute in config.observable_attributes {
            routing.observe_attribute(attribute);
        }

        Self {
            log: ChangeLog::new(),
            routing,
            auto_notify: config.auto_notify,
            ignore_init: config.ignore_init,
            phase: Phase::Tracking,
            initial_state: None,
            live: None,
        }
    }

    /// Add a global observer.
    pub fn with_observer(mut self, observer: ObserverRef) -> Self {
        self.add_observer(observer);
        self
    }

    /// Map an observer to a single attribute.
    pub fn with_attribute_observer(
        mut self,
        attribute: impl Into<String>,
        observer: ObserverRef,
    ) -> Self {
        self.map_observer(attribute, observer);
        self
    }

    /// Capture `entity` as the baseline at construction time.
    pub fn with_initial_state<T: Serialize + ?Sized>(mut self, entity: &T) -> TrackResult<Self> {
        self.set_initial_state(entity)?;
        Ok(self)
    }

    /// Add a global observer.
    pub fn add_observer(&mut self, observer: ObserverRef) {
        self.routing.add_observer(observer);
    }

    /// Restrict global observers to `attribute` (and any others added).
    pub fn observe_attribute(&mut self, attribute: impl Into<String>) {
        self.routing.observe_attribute(attribute);
    }

    /// Map an observer to a single attribute.
    pub fn map_observer(&mut self, attribute: impl Into<String>, observer: ObserverRef) {
        self.routing.map_observer(attribute, observer);
    }

    /// Observer routing for this tracker.
    pub fn routing(&self) -> &ObserverRouting {
        &self.routing
    }

    pub fn auto_notify(&self) -> bool {
        self.auto_notify
    }

    pub fn set_auto_notify(&mut self, enabled: bool) {
        self.auto_notify = enabled;
    }

    pub fn ignore_init(&self) -> bool {
        self.ignore_init
    }

    /// Enter the initialization phase. Writes recorded from now until
    /// [`begin_tracking`](Self::begin_tracking) are dropped when
    /// `ignore_init` is set.
    pub fn begin_initialization(&mut self) {
        self.phase = Phase::Initializing;
    }

    /// Leave the initialization phase.
    pub fn begin_tracking(&mut self) {
        self.phase = Phase::Tracking;
    }

    /// Whether writes are currently being recorded normally.
    pub fn is_tracking(&self) -> bool {
        self.phase == Phase::Tracking
    }

    /// Record one attribute write.
    ///
    /// This is the single write path: the entry is appended to the log, the
    /// live view (if baselined) is updated, then observers are notified when
    /// `auto_notify` is on. Observer failures are returned after the entry
    /// has been recorded and every observer has run.
    pub fn record_change(
        &mut self,
        attribute: &str,
        old: JsonValue,
        new: JsonValue,
    ) -> TrackResult<()> {
        if !self.record(attribute, old, new) || !self.auto_notify {
            return Ok(());
        }
        match self.log.entries().last() {
            Some(entry) => self
                .routing
                .dispatch(entry.attribute(), entry.old_value(), entry.new_value()),
            None => Ok(()),
        }
    }

    /// Update the live view and append to the log without notifying.
    ///
    /// Returns whether an entry was appended.
    pub(crate) fn record(&mut self, attribute: &str, old: JsonValue, new: JsonValue) -> bool {
        if let Some(live) = self.live.as_mut() {
            live.set(attribute, new.clone());
        }

        if self.phase == Phase::Initializing && self.ignore_init {
            trace!(attribute, "write during initialization not recorded");
            return false;
        }

        self.log.push(attribute, old, new);
        true
    }

    /// Observers that a write to `attribute` dispatches to.
    pub fn resolve_observers(&self, attribute: &str) -> &[ObserverRef] {
        self.routing.resolve(attribute)
    }

    /// Notify the resolved observers of a write.
    ///
    /// Called automatically by [`record_change`](Self::record_change) when
    /// `auto_notify` is set; call it manually otherwise.
    pub fn notify(&self, attribute: &str, old: &JsonValue, new: &JsonValue) -> TrackResult<()> {
        self.routing.dispatch(attribute, old, new)
    }

    /// Capture `entity` as the baseline, replacing any earlier one.
    pub fn set_initial_state<T: Serialize + ?Sized>(&mut self, entity: &T) -> TrackResult<()> {
        let snapshot = Snapshot::capture(entity)?;
        debug!(fields = snapshot.len(), "baseline captured");
        self.live = Some(snapshot.clone());
        self.initial_state = Some(snapshot);
        Ok(())
    }

    /// Replace the live view with the entity's actual state. No-op until a
    /// baseline is set.
    pub(crate) fn reset_live(&mut self, snapshot: Snapshot) {
        if self.initial_state.is_some() {
            self.live = Some(snapshot);
        }
    }

    /// The baseline snapshot, if one was captured.
    pub fn initial_state(&self) -> Option<&Snapshot> {
        self.initial_state.as_ref()
    }

    /// The live view of the tracked entity, if baselined.
    pub fn current_state(&self) -> Option<&Snapshot> {
        self.live.as_ref()
    }

    /// Whether `attribute` has changed.
    ///
    /// Compares the live view against the baseline when one is set,
    /// otherwise uses the net change recorded in the log.
    pub fn attribute_changed(&self, attribute: &str) -> bool {
        match (&self.initial_state, &self.live) {
            (Some(baseline), Some(live)) => live.field_differs(baseline, attribute),
            _ => self.log.attribute_changed(attribute),
        }
    }

    /// Whether `attribute` on `entity` differs from the baseline.
    pub fn attribute_changed_against<T: Serialize + ?Sized>(
        &self,
        attribute: &str,
        entity: &T,
    ) -> TrackResult<bool> {
        let baseline = self.baseline()?;
        let other = Snapshot::capture(entity)?;
        Ok(other.field_differs(baseline, attribute))
    }

    /// Whether anything has changed.
    ///
    /// Compares the whole live view against the baseline when one is set,
    /// otherwise reports whether any attribute in the log has a net change.
    pub fn changed(&self) -> bool {
        match (&self.initial_state, &self.live) {
            (Some(baseline), Some(live)) => live != baseline,
            _ => self.log.any_changed(),
        }
    }

    /// Whether `entity` differs from the baseline in any field.
    pub fn changed_against<T: Serialize + ?Sized>(&self, entity: &T) -> TrackResult<bool> {
        let baseline = self.baseline()?;
        Ok(&Snapshot::capture(entity)? != baseline)
    }

    fn baseline(&self) -> TrackResult<&Snapshot> {
        self.initial_state.as_ref().ok_or(TrackError::MissingBaseline)
    }

    /// The change log, for queries.
    pub fn history(&self) -> &ChangeLog {
        &self.log
    }

    /// Mutable access to the change log for `filter`/`exclude`/`flush`.
    pub fn history_mut(&mut self) -> &mut ChangeLog {
        &mut self.log
    }

    /// Number of entries in the log.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("log", &self.log)
            .field("routing", &self.routing)
            .field("auto_notify", &self.auto_notify)
            .field("ignore_init", &self.ignore_init)
            .field("phase", &self.phase)
            .field("initial_state", &self.initial_state)
            .finish()
    }
}

impl fmt::Display for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tracker -> BUFFER {} LOG {}",
            self.log.buffered().len(),
            self.log.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::observer;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> ObserverRef {
        let counter = Arc::clone(counter);
        observer(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert!(config.auto_notify);
        assert!(config.ignore_init);
        assert!(config.observable_attributes.is_empty());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: TrackerConfig =
            serde_json::from_value(json!({"auto_notify": false, "observable_attributes": ["name"]}))
                .unwrap();
        assert!(!config.auto_notify);
        assert!(config.ignore_init);
        assert_eq!(config.observable_attributes, vec!["name"]);

        let tracker = Tracker::with_config(config);
        assert!(tracker.routing().observable_attributes().contains("name"));
    }

    #[test]
    fn test_record_change_logs_and_notifies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tracker = Tracker::new().with_observer(counting(&calls));

        tracker.record_change("name", json!("A"), json!("B")).unwrap();
        tracker.record_change("age", json!(100), json!(20)).unwrap();

        assert_eq!(tracker.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.history_mut().filter("name").count(), 1);
    }

    #[test]
    fn test_auto_notify_off_requires_manual_notify() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tracker = Tracker::with_config(TrackerConfig {
            auto_notify: false,
            ..Default::default()
        })
        .with_observer(counting(&calls));

        tracker.record_change("name", json!("A"), json!("B")).unwrap();
        assert_eq!(tracker.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tracker.notify("name", &json!("A"), &json!("B")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_failure_still_records_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tracker = Tracker::new()
            .with_observer(observer(|_, _, _| anyhow::bail!("nope")))
            .with_observer(counting(&calls));

        let err = tracker
            .record_change("name", json!("A"), json!("B"))
            .unwrap_err();

        assert!(matches!(err, TrackError::ObserverFailed { .. }));
        assert_eq!(tracker.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attribute_map_scopes_dispatch() {
        let global = Arc::new(AtomicUsize::new(0));
        let mapped = Arc::new(AtomicUsize::new(0));
        let mut tracker = Tracker::new()
            .with_observer(counting(&global))
            .with_attribute_observer("x", counting(&mapped));

        tracker.record_change("y", json!(0), json!(1)).unwrap();
        assert_eq!(global.load(Ordering::SeqCst), 0);
        assert_eq!(mapped.load(Ordering::SeqCst), 0);
        assert!(tracker.resolve_observers("y").is_empty());

        tracker.record_change("x", json!(0), json!(1)).unwrap();
        assert_eq!(mapped.load(Ordering::SeqCst), 1);
        assert_eq!(global.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_log_mode_change_detection() {
        let mut tracker = Tracker::new();
        assert!(!tracker.changed());

        tracker.record_change("name", json!("A"), json!("A")).unwrap();
        assert!(!tracker.changed());
        assert!(!tracker.attribute_changed("name"));

        tracker.record_change("name", json!("A"), json!("C")).unwrap();
        assert!(tracker.changed());
        assert!(tracker.attribute_changed("name"));
        assert!(!tracker.attribute_changed("age"));
    }

    #[test]
    fn test_snapshot_mode_uses_live_view() {
        let mut tracker = Tracker::new()
            .with_initial_state(&json!({"name": "A", "age": 100}))
            .unwrap();
        assert!(!tracker.attribute_changed("name"));
        assert!(!tracker.changed());

        tracker.record_change("name", json!("A"), json!("B")).unwrap();
        assert!(tracker.attribute_changed("name"));
        assert!(!tracker.attribute_changed("age"));
        assert!(tracker.changed());

        // Changing back is no change relative to the baseline.
        tracker.record_change("name", json!("B"), json!("A")).unwrap();
        assert!(!tracker.changed());
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_snapshot_mode_new_field_counts_as_change() {
        let mut tracker = Tracker::new()
            .with_initial_state(&json!({"name": "A"}))
            .unwrap();
        tracker.record_change("email", json!(null), json!(null)).unwrap();

        assert!(tracker.attribute_changed("email"));
        assert!(tracker.changed());
    }

    #[test]
    fn test_against_requires_baseline() {
        let tracker = Tracker::new();
        let entity = json!({"name": "A"});

        assert!(matches!(
            tracker.attribute_changed_against("name", &entity),
            Err(TrackError::MissingBaseline)
        ));
        assert!(matches!(
            tracker.changed_against(&entity),
            Err(TrackError::MissingBaseline)
        ));
    }

    #[test]
    fn test_against_compares_entity_with_baseline() {
        let tracker = Tracker::new()
            .with_initial_state(&json!({"name": "A", "age": 100}))
            .unwrap();

        let same = json!({"name": "A", "age": 100});
        let renamed = json!({"name": "B", "age": 100});
        let missing_age = json!({"name": "A"});

        assert!(!tracker.changed_against(&same).unwrap());
        assert!(tracker.changed_against(&renamed).unwrap());
        assert!(tracker.attribute_changed_against("name", &renamed).unwrap());
        assert!(!tracker.attribute_changed_against("age", &renamed).unwrap());
        assert!(tracker.attribute_changed_against("age", &missing_age).unwrap());
        assert!(!tracker.attribute_changed_against("nope", &same).unwrap());
    }

    #[test]
    fn test_rebaselining_replaces_snapshot() {
        let mut tracker = Tracker::new()
            .with_initial_state(&json!({"name": "A"}))
            .unwrap();
        tracker.record_change("name", json!("A"), json!("B")).unwrap();
        assert!(tracker.changed());

        tracker.set_initial_state(&json!({"name": "B"})).unwrap();
        assert!(!tracker.changed());
        assert_eq!(tracker.initial_state().unwrap().get("name"), Some(&json!("B")));
    }

    #[test]
    fn test_initialization_phase_suppresses_logging() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tracker = Tracker::new().with_observer(counting(&calls));

        tracker.begin_initialization();
        assert!(!tracker.is_tracking());
        tracker.record_change("name", json!(null), json!("A")).unwrap();
        tracker.begin_tracking();

        assert!(tracker.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tracker.record_change("name", json!("A"), json!("B")).unwrap();
        assert_eq!(tracker.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initialization_recorded_when_not_ignored() {
        let mut tracker = Tracker::with_config(TrackerConfig {
            ignore_init: false,
            ..Default::default()
        });

        tracker.begin_initialization();
        tracker.record_change("name", json!(null), json!("A")).unwrap();
        tracker.begin_tracking();

        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_reset_live_only_applies_once_baselined() {
        let mut tracker = Tracker::new();
        tracker.reset_live(Snapshot::capture(&json!({"name": "Z"})).unwrap());
        assert!(tracker.current_state().is_none());

        tracker.set_initial_state(&json!({"name": "A"})).unwrap();
        tracker.reset_live(Snapshot::capture(&json!({"name": "Z"})).unwrap());
        assert!(tracker.changed());
        assert!(tracker.attribute_changed("name"));
    }

    #[test]
    fn test_display() {
        let mut tracker = Tracker::new();
        tracker.record_change("name", json!("A"), json!("B")).unwrap();
        tracker.record_change("age", json!(1), json!(2)).unwrap();
        tracker.history_mut().filter("age");

        assert_eq!(tracker.to_string(), "Tracker -> BUFFER 1 LOG 2");
    }
}
