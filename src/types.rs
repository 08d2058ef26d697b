/// Common types used throughout tracklog.
///
/// This module defines the recorded unit of change ([`ChangeEntry`]) and the
/// captured field map used for baseline comparison ([`Snapshot`]). Both are
/// plain values: entries are immutable once created and snapshots are only
/// ever replaced wholesale or updated one field at a time by the tracker.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{TrackError, TrackResult};

/// One recorded attribute write.
///
/// Entries are created exclusively by [`ChangeLog::push`](crate::ChangeLog::push)
/// and never mutated afterwards; the fields are only reachable through
/// accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    seq: u64,
    attribute: String,
    old: JsonValue,
    new: JsonValue,
    timestamp: DateTime<Utc>,
}

impl ChangeEntry {
    pub(crate) fn new(
        seq: u64,
        attribute: String,
        old: JsonValue,
        new: JsonValue,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            seq,
            attribute,
            old,
            new,
            timestamp,
        }
    }

    /// Log-local sequence number; unique and increasing within one log.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Name of the changed attribute.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Value before the write.
    pub fn old_value(&self) -> &JsonValue {
        &self.old
    }

    /// Value after the write.
    pub fn new_value(&self) -> &JsonValue {
        &self.new
    }

    /// When the write was recorded.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this single write changed the value.
    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - Attribute '{}' : '{}' --> '{}'",
            self.timestamp, self.attribute, self.old, self.new
        )
    }
}

/// A captured copy of an entity's named fields.
///
/// The default capture strategy is a serde round trip: anything that
/// serializes to a JSON object can be captured. Field lookup returns `None`
/// for absent fields, so "absent on both sides" compares equal while
/// "present on one side only" does not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    fields: Map<String, JsonValue>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the fields of `entity`.
    ///
    /// Fails with [`TrackError::InvalidData`] if the entity does not
    /// serialize to a JSON object.
    pub fn capture<T: Serialize + ?Sized>(entity: &T) -> TrackResult<Self> {
        match serde_json::to_value(entity)? {
            JsonValue::Object(fields) => Ok(Self { fields }),
            other => Err(TrackError::invalid_data(format!(
                "entity must serialize to an object with named fields, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Build a snapshot from an already captured field map.
    pub fn from_fields(fields: Map<String, JsonValue>) -> Self {
        Self { fields }
    }

    /// Look up a field by name.
    pub fn get(&self, attribute: &str) -> Option<&JsonValue> {
        self.fields.get(attribute)
    }

    /// Overwrite (or add) a single field.
    pub fn set(&mut self, attribute: impl Into<String>, value: JsonValue) {
        self.fields.insert(attribute.into(), value);
    }

    /// Whether `attribute` differs between `self` and `other`.
    pub fn field_differs(&self, other: &Snapshot, attribute: &str) -> bool {
        self.get(attribute) != other.get(attribute)
    }

    /// Names of all fields whose values differ between the two snapshots,
    /// including fields present on one side only. Sorted by name.
    pub fn diff(&self, other: &Snapshot) -> Vec<String> {
        let mut names: Vec<&String> = self
            .fields
            .keys()
            .chain(other.fields.keys().filter(|k| !self.fields.contains_key(*k)))
            .collect();
        names.sort();
        names
            .into_iter()
            .filter(|name| self.field_differs(other, name))
            .cloned()
            .collect()
    }

    /// Borrow the underlying field map.
    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.fields
    }

    /// Consume the snapshot and return the field map.
    pub fn into_fields(self) -> Map<String, JsonValue> {
        self.fields
    }

    /// Number of captured fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields were captured.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
