/// Observers and dispatch routing.
///
/// An observer is a callback invoked with `(attribute, old, new)` every time
/// a tracked attribute is written. Which observers run for a given attribute
/// is decided by [`ObserverRouting`], a three-tier policy:
///
/// 1. **Explicit map**: when any attribute has mapped observers, only the
///    observers mapped to the written attribute run (possibly none).
/// 2. **Allow-list**: otherwise, when observable attributes are configured,
///    an attribute outside the list dispatches to nobody.
/// 3. **Global**: otherwise every global observer runs.
///
/// The tiers are not merged; the first applicable tier decides.
///
/// Dispatch is synchronous and failure-isolated: an observer that returns an
/// error or panics does not stop the remaining observers. Failures are
/// collected and reported once the whole list has run.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::error::{ObserverFailure, TrackError, TrackResult};

/// A callback notified of attribute writes.
pub trait Observer: Send + Sync {
    /// Called with the written attribute and its old and new values.
    fn on_change(&self, attribute: &str, old: &JsonValue, new: &JsonValue) -> anyhow::Result<()>;
}

impl<F> Observer for F
where
    F: Fn(&str, &JsonValue, &JsonValue) -> anyhow::Result<()> + Send + Sync,
{
    fn on_change(&self, attribute: &str, old: &JsonValue, new: &JsonValue) -> anyhow::Result<()> {
        self(attribute, old, new)
    }
}

/// Shared handle to an observer. The tracker does not own observer lifetimes.
pub type ObserverRef = Arc<dyn Observer>;

/// Wrap a closure as an [`ObserverRef`].
///
/// ```ignore
/// let obs = tracklog::observer(|attr, old, new| {
///     println!("{attr}: {old} -> {new}");
///     Ok(())
/// });
/// ```
pub fn observer<F>(f: F) -> ObserverRef
where
    F: Fn(&str, &JsonValue, &JsonValue) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Observer configuration for one tracker.
#[derive(Clone, Default)]
pub struct ObserverRouting {
    observers: Vec<ObserverRef>,
    observable_attributes: HashSet<String>,
    attribute_map: HashMap<String, Vec<ObserverRef>>,
}

impl ObserverRouting {
    /// Create routing with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global observer.
    pub fn add_observer(&mut self, observer: ObserverRef) {
        self.observers.push(observer);
    }

    /// Restrict global observers to the given attribute.
    pub fn observe_attribute(&mut self, attribute: impl Into<String>) {
        self.observable_attributes.insert(attribute.into());
    }

    /// Map an observer to one attribute.
    ///
    /// Once any mapping exists, global observers and the allow-list are
    /// no longer consulted.
    pub fn map_observer(&mut self, attribute: impl Into<String>, observer: ObserverRef) {
        self.attribute_map
            .entry(attribute.into())
            .or_default()
            .push(observer);
    }

    /// Global observers in registration order.
    pub fn observers(&self) -> &[ObserverRef] {
        &self.observers
    }

    /// Attributes eligible for global observers (empty = all).
    pub fn observable_attributes(&self) -> &HashSet<String> {
        &self.observable_attributes
    }

    /// Whether an explicit attribute map is active.
    pub fn has_attribute_map(&self) -> bool {
        !self.attribute_map.is_empty()
    }

    /// The observers that should run for a write to `attribute`.
    pub fn resolve(&self, attribute: &str) -> &[ObserverRef] {
        if !self.attribute_map.is_empty() {
            return self
                .attribute_map
                .get(attribute)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
        }

        if !self.observable_attributes.is_empty()
            && !self.observable_attributes.contains(attribute)
        {
            return &[];
        }

        &self.observers
    }

    /// Invoke every resolved observer in order.
    ///
    /// All observers run even if some fail; failures are returned together
    /// as [`TrackError::ObserverFailed`].
    pub fn dispatch(&self, attribute: &str, old: &JsonValue, new: &JsonValue) -> TrackResult<()> {
        dispatch_to(self.resolve(attribute), attribute, old, new)
    }
}

/// Invoke an already resolved observer list with the same isolation as
/// [`ObserverRouting::dispatch`].
pub(crate) fn dispatch_to(
    observers: &[ObserverRef],
    attribute: &str,
    old: &JsonValue,
    new: &JsonValue,
) -> TrackResult<()> {
    let failures = run_observers(observers, attribute, old, new);
    if failures.is_empty() {
        Ok(())
    } else {
        Err(TrackError::ObserverFailed { failures })
    }
}

impl fmt::Debug for ObserverRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRouting")
            .field("observers", &self.observers.len())
            .field("observable_attributes", &self.observable_attributes)
            .field(
                "attribute_map",
                &self
                    .attribute_map
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}

fn run_observers(
    observers: &[ObserverRef],
    attribute: &str,
    old: &JsonValue,
    new: &JsonValue,
) -> Vec<ObserverFailure> {
    let mut failures = Vec::new();

    for (index, observer) in observers.iter().enumerate() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            observer.on_change(attribute, old, new)
        }));

        let message = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };

        warn!(attribute, observer = index, error = %message, "observer failed");
        failures.push(ObserverFailure {
            attribute: attribute.to_string(),
            observer_index: index,
            message,
        });
    }

    failures
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
