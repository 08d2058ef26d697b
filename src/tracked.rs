/// An entity bundled with its tracker.
///
/// [`Tracked`] is the explicit write path for an entity: instead of
/// intercepting field assignment, every write goes through [`Tracked::set`]
/// or [`Tracked::update`], which apply the write and route it to
/// [`Tracker::record_change`]. The entity itself is only exposed read-only,
/// so the tracker's log and live view cannot drift from it.
///
/// Fields are addressed by their serialized names; the entity must round
/// trip through serde as a JSON object.
///
/// # Example
///
/// ```ignore
/// use serde::{Deserialize, Serialize};
/// use tracklog::{Tracked, Tracker};
///
/// #[derive(Serialize, Deserialize)]
/// struct User { name: String, age: u32 }
///
/// let mut user = Tracked::new(User { name: "A".into(), age: 100 }, Tracker::new());
/// user.set("name", "B")?;
/// user.update(|u| u.age = 20)?;
///
/// assert_eq!(user.tracker().len(), 2);
/// assert!(user.changed());
/// ```
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::changelog::ChangeLog;
use crate::error::{TrackError, TrackResult};
use crate::tracker::Tracker;
use crate::types::Snapshot;

/// An entity whose writes are recorded by a [`Tracker`].
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    entity: T,
    tracker: Tracker,
}

/// Value of `attribute` as written to the log: a field that does not exist
/// reads as null.
///
/// This is the only place where absent and null meet. Adding or removing a
/// field with a non-null value is a change in both detection modes; adding or
/// removing a null field is a change to the baseline (absent vs present) but
/// logs `null -> null`, which the log does not count.
fn field_value(snapshot: &Snapshot, attribute: &str) -> JsonValue {
    snapshot.get(attribute).cloned().unwrap_or(JsonValue::Null)
}

impl<T> Tracked<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Wrap an already-built entity. Tracking starts immediately.
    ///
    /// If `tracker` already holds a baseline, its live view is re-seeded
    /// from `entity`, so baseline queries describe this entity.
    pub fn new(entity: T, mut tracker: Tracker) -> Self {
        tracker.begin_tracking();
        Self::wrap(entity, tracker)
    }

    /// Wrap `entity` and run `init` in the tracker's initialization phase.
    ///
    /// Writes made by `init` are applied to the entity but, when the
    /// tracker's `ignore_init` is set, neither logged nor dispatched.
    /// Tracking begins once `init` returns, whether or not it succeeded.
    pub fn construct<F>(entity: T, mut tracker: Tracker, init: F) -> TrackResult<Self>
    where
        F: FnOnce(&mut Self) -> TrackResult<()>,
    {
        tracker.begin_initialization();
        let mut tracked = Self::wrap(entity, tracker);
        let result = init(&mut tracked);
        tracked.tracker.begin_tracking();
        result.map(|()| tracked)
    }

    fn wrap(entity: T, mut tracker: Tracker) -> Self {
        if tracker.initial_state().is_some() {
            match Snapshot::capture(&entity) {
                Ok(live) => tracker.reset_live(live),
                Err(e) => warn!(error = %e, "cannot capture wrapped entity; live view kept"),
            }
        }
        Self { entity, tracker }
    }

    /// Write one field and record the change.
    ///
    /// The old value is the field's current value (null if it did not exist
    /// yet); the new value is the field as stored after serde's round trip.
    /// On a serde failure the entity is left unchanged and nothing is
    /// recorded.
    pub fn set(&mut self, attribute: &str, value: impl Serialize) -> TrackResult<()> {
        let value = serde_json::to_value(value)?;
        let before = Snapshot::capture(&self.entity)?;
        let old = field_value(&before, attribute);

        let mut fields = before.into_fields();
        fields.insert(attribute.to_string(), value);
        let updated: T = serde_json::from_value(JsonValue::Object(fields)).map_err(|e| {
            TrackError::invalid_data(format!("cannot write field '{attribute}': {e}"))
        })?;

        // Unknown fields are dropped silently by serde; refuse the write.
        let new = Snapshot::capture(&updated)?
            .get(attribute)
            .cloned()
            .ok_or_else(|| {
                TrackError::invalid_data(format!("entity has no writable field '{attribute}'"))
            })?;

        self.entity = updated;
        self.tracker.record_change(attribute, old, new)
    }

    /// Mutate the entity in place and record one change per field that
    /// differs afterwards, in field-name order.
    ///
    /// Added and removed fields follow the same rule as [`set`](Self::set):
    /// the missing side is recorded as null. Observer failures from all
    /// recorded fields are merged into a single [`TrackError::ObserverFailed`].
    pub fn update<F>(&mut self, mutate: F) -> TrackResult<()>
    where
        F: FnOnce(&mut T),
    {
        let before = Snapshot::capture(&self.entity)?;
        mutate(&mut self.entity);
        let after = Snapshot::capture(&self.entity)?;

        let mut failures = Vec::new();
        let mut outcome = Ok(());
        for attribute in before.diff(&after) {
            let old = field_value(&before, &attribute);
            let new = field_value(&after, &attribute);
            match self.tracker.record_change(&attribute, old, new) {
                Ok(()) => {}
                Err(TrackError::ObserverFailed { failures: mut more }) => {
                    failures.append(&mut more)
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        // Removed fields reached the live view as null; mirror the entity.
        self.tracker.reset_live(after);
        outcome?;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TrackError::ObserverFailed { failures })
        }
    }

    /// Capture the entity's current state as the tracker's baseline.
    pub fn set_initial_state(&mut self) -> TrackResult<()> {
        self.tracker.set_initial_state(&self.entity)
    }

    /// Whether anything has changed (see [`Tracker::changed`]).
    pub fn changed(&self) -> bool {
        self.tracker.changed()
    }

    /// Whether `attribute` has changed (see [`Tracker::attribute_changed`]).
    pub fn attribute_changed(&self, attribute: &str) -> bool {
        self.tracker.attribute_changed(attribute)
    }
}

impl<T> Tracked<T> {
    /// Read-only access to the entity.
    pub fn get(&self) -> &T {
        &self.entity
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    /// Shortcut for `tracker().history()`.
    pub fn history(&self) -> &ChangeLog {
        self.tracker.history()
    }

    /// Give back the entity, dropping the tracker.
    pub fn into_inner(self) -> T {
        self.entity
    }

    /// Give back the entity and its tracker.
    pub fn into_parts(self) -> (T, Tracker) {
        (self.entity, self.tracker)
    }
}
