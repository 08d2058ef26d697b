/// The change log and its query buffer.
///
/// A [`ChangeLog`] keeps two sequences:
///
/// - **log**: the permanent, insertion-ordered store of [`ChangeEntry`]s
/// - **buffer**: the result of the most recent [`filter`](ChangeLog::filter)
///   or [`exclude`](ChangeLog::exclude), a subsequence of the log
///
/// Reads ([`fetch`](ChangeLog::fetch), [`count`](ChangeLog::count)) and
/// [`flush`](ChangeLog::flush) act on the buffer when it is non-empty and on
/// the whole log otherwise. `filter` and `exclude` always recompute from the
/// full log, so chaining them does not narrow: the last call wins.
///
/// # Example
///
/// ```ignore
/// use tracklog::{json, ChangeLog};
///
/// let mut log = ChangeLog::new();
/// log.push("name", json!("A"), json!("B"));
/// log.push("age", json!(100), json!(20));
///
/// assert_eq!(log.filter("name").count(), 1);
/// assert_eq!(log.exclude("name").fetch()[0].attribute(), "age");
///
/// // Drop the buffered "age" entry, keep the rest.
/// log.flush();
/// assert_eq!(log.count(), 1);
/// ```
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::selector::AttributeSelector;
use crate::types::ChangeEntry;

/// Ordered store of change entries plus a transient filtered view.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    log: Vec<ChangeEntry>,
    buffer: Vec<ChangeEntry>,
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ChangeLog {
    /// Create an empty change log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new entry stamped with the current time.
    ///
    /// The buffer is left untouched.
    pub fn push(
        &mut self,
        attribute: impl Into<String>,
        old: JsonValue,
        new: JsonValue,
    ) -> &ChangeEntry {
        // Wall clock can step backwards; keep timestamps non-decreasing.
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);

        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = ChangeEntry::new(seq, attribute.into(), old, new, timestamp);
        trace!(seq, attribute = entry.attribute(), "change recorded");
        self.log.push(entry);
        &self.log[self.log.len() - 1]
    }

    /// Keep entries whose attribute matches `attributes` in the buffer.
    ///
    /// An absent or empty selector keeps every entry.
    pub fn filter(&mut self, attributes: impl Into<AttributeSelector>) -> &mut Self {
        self.select(&attributes.into(), false)
    }

    /// Keep entries whose attribute does **not** match `attributes` in the
    /// buffer.
    ///
    /// An absent or empty selector matches everything, so the buffer ends up
    /// empty and reads fall back to the full log.
    pub fn exclude(&mut self, attributes: impl Into<AttributeSelector>) -> &mut Self {
        self.select(&attributes.into(), true)
    }

    fn select(&mut self, selector: &AttributeSelector, exclude: bool) -> &mut Self {
        self.buffer = self
            .log
            .iter()
            .filter(|entry| selector.matches(entry.attribute()) != exclude)
            .cloned()
            .collect();
        debug!(
            exclude,
            matched = self.buffer.len(),
            total = self.log.len(),
            "change log buffer recomputed"
        );
        self
    }

    /// The buffer if non-empty, else the full log.
    pub fn fetch(&self) -> &[ChangeEntry] {
        if self.buffer.is_empty() {
            &self.log
        } else {
            &self.buffer
        }
    }

    /// Remove the buffered entries from the log, or clear the whole log when
    /// no buffer is active. The buffer is always cleared.
    ///
    /// Returns the number of entries removed from the log.
    pub fn flush(&mut self) -> usize {
        let before = self.log.len();
        if self.buffer.is_empty() {
            self.log.clear();
        } else {
            let buffered: HashSet<u64> = self.buffer.iter().map(ChangeEntry::seq).collect();
            self.log.retain(|entry| !buffered.contains(&entry.seq()));
        }
        self.buffer.clear();

        let removed = before - self.log.len();
        debug!(removed, remaining = self.log.len(), "change log flushed");
        removed
    }

    /// Length of the buffer if non-empty, else length of the log.
    pub fn count(&self) -> usize {
        self.fetch().len()
    }

    /// Drop the current buffer without touching the log.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Every entry in the log, regardless of the buffer.
    pub fn entries(&self) -> &[ChangeEntry] {
        &self.log
    }

    /// The current buffer (may be empty).
    pub fn buffered(&self) -> &[ChangeEntry] {
        &self.buffer
    }

    /// Number of entries in the log.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// The net change recorded for `attribute`: the value before its first
    /// recorded write and the value after its latest one.
    pub fn net_change(&self, attribute: &str) -> Option<(&JsonValue, &JsonValue)> {
        let mut matching = self.log.iter().filter(|e| e.attribute() == attribute);
        let first = matching.next()?;
        let last = matching.last().unwrap_or(first);
        Some((first.old_value(), last.new_value()))
    }

    /// Whether `attribute` has a net change across the recorded history.
    ///
    /// Intermediate values do not matter: `A -> B -> A` is unchanged.
    /// An attribute that was never written is unchanged.
    pub fn attribute_changed(&self, attribute: &str) -> bool {
        self.net_change(attribute)
            .is_some_and(|(first_old, last_new)| first_old != last_new)
    }

    /// Whether any attribute in the log has a net change.
    pub fn any_changed(&self) -> bool {
        let mut seen = HashSet::new();
        self.log
            .iter()
            .filter(|entry| seen.insert(entry.attribute()))
            .any(|entry| self.attribute_changed(entry.attribute()))
    }

    /// Distinct attributes with a net change, in order of first appearance.
    pub fn changed_attributes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.log
            .iter()
            .map(ChangeEntry::attribute)
            .filter(|attribute| seen.insert(*attribute))
            .filter(|attribute| self.attribute_changed(attribute))
            .collect()
    }
}

impl fmt::Display for ChangeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChangeLog -> BUFFER {} LOG {}",
            self.buffer.len(),
            self.log.len()
        )
    }
}
