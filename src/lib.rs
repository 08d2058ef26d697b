//! # tracklog — Attribute Change Tracking
//!
//! tracklog records every write to a tracked entity's attributes and answers
//! the question *"has this changed?"*:
//!
//! - **Change log** - Every write is an ordered, immutable entry
//! - **Queries** - Filter, exclude, fetch, count and flush the log
//! - **Net change** - Compare an attribute's first recorded value with its latest
//! - **Baselines** - Compare the entity against a captured snapshot instead
//! - **Observers** - Run callbacks on writes, globally, per allow-list, or per attribute
//!
//! ## Quick Start
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use tracklog::{observer, Tracked, Tracker};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     age: u32,
//! }
//!
//! let tracker = Tracker::new().with_observer(observer(|attr, old, new| {
//!     println!("{attr}: {old} -> {new}");
//!     Ok(())
//! }));
//!
//! let mut user = Tracked::new(User { name: "A".into(), age: 100 }, tracker);
//! user.set("name", "B")?;
//! user.set("age", 20)?;
//!
//! assert!(user.changed());
//!
//! let log = user.tracker_mut().history_mut();
//! assert_eq!(log.count(), 2);
//! assert_eq!(log.filter("name").count(), 1);
//! assert_eq!(log.exclude("name").fetch()[0].attribute(), "age");
//! ```
//!
//! ## Architecture
//!
//! 1. **ChangeLog** (`changelog`) - Ordered entries plus a query buffer
//! 2. **Tracker** (`tracker`) - Observer routing, baseline, change detection
//! 3. **Tracked** (`tracked`) - Explicit write path for a serde entity
//!
//! Hosts that intercept writes themselves can skip [`Tracked`] and call
//! [`Tracker::record_change`] directly with `(attribute, old, new)`.
//!
//! ## Threading
//!
//! [`ChangeLog`] and [`Tracker`] are single-owner structures with no internal
//! locking; observers run inline on the writer's thread. [`TrackerRegistry`]
//! is the thread-safe way to keep many trackers keyed by entity.

mod error;
mod types;

pub mod changelog;
pub mod observers;
pub mod registry;
pub mod selector;
pub mod tracked;
pub mod tracker;

pub use changelog::ChangeLog;
pub use error::{ObserverFailure, TrackError, TrackResult};
pub use observers::{observer, Observer, ObserverRef, ObserverRouting};
pub use registry::TrackerRegistry;
pub use selector::AttributeSelector;
pub use tracked::Tracked;
pub use tracker::{Tracker, TrackerConfig};
pub use types::{ChangeEntry, Snapshot};

// Re-export commonly used external types for convenience
pub use chrono::{DateTime, Utc};
pub use serde_json::{json, Value as JsonValue};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tracklog::prelude::*;
/// ```
pub mod prelude {
    pub use crate::changelog::ChangeLog;
    pub use crate::error::{ObserverFailure, TrackError, TrackResult};
    pub use crate::observers::{observer, Observer, ObserverRef};
    pub use crate::registry::TrackerRegistry;
    pub use crate::selector::AttributeSelector;
    pub use crate::tracked::Tracked;
    pub use crate::tracker::{Tracker, TrackerConfig};
    pub use crate::types::{ChangeEntry, Snapshot};
    pub use serde_json::{json, Value as JsonValue};
}
