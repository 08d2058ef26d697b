/// Integration tests for tracklog.
///
/// These tests drive the public API end to end: writes through a tracked
/// entity, queries against its log, both change-detection modes, and
/// observer routing.
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracklog::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    age: u32,
}

fn user(name: &str, age: u32) -> User {
    User {
        name: name.to_string(),
        age,
    }
}

type Calls = Arc<Mutex<Vec<String>>>;

fn recorder(label: &'static str, calls: &Calls) -> ObserverRef {
    let calls = Arc::clone(calls);
    observer(move |attr, old, new| {
        calls
            .lock()
            .unwrap()
            .push(format!("{label}:{attr}:{old}->{new}"));
        Ok(())
    })
}

#[test]
fn test_user_scenario_queries() {
    let mut tracked = Tracked::new(user("A", 100), Tracker::new());
    tracked.set("name", "B").unwrap();
    tracked.set("age", 20).unwrap();

    let log = tracked.tracker_mut().history_mut();
    assert_eq!(log.count(), 2);
    assert_eq!(log.filter(["name"]).count(), 1);
    assert_eq!(log.exclude(["name"]).fetch()[0].attribute(), "age");
}

#[test]
fn test_net_change_scenarios() {
    let mut tracker = Tracker::new();
    tracker.record_change("name", json!("A"), json!("B")).unwrap();
    tracker.record_change("name", json!("B"), json!("C")).unwrap();
    assert!(tracker.attribute_changed("name"));

    let mut noop = Tracker::new();
    noop.record_change("name", json!("A"), json!("A")).unwrap();
    assert!(!noop.attribute_changed("name"));
    assert!(!noop.changed());
}

#[test]
fn test_flush_after_filter_keeps_other_attributes() {
    let mut tracker = Tracker::new();
    tracker.record_change("name", json!("A"), json!("B")).unwrap();
    tracker.record_change("age", json!(1), json!(2)).unwrap();
    tracker.record_change("name", json!("B"), json!("C")).unwrap();

    let log = tracker.history_mut();
    log.filter("name").flush();
    assert_eq!(log.count(), 1);
    assert_eq!(log.fetch()[0].attribute(), "age");

    // Name history is gone, so the log no longer sees a name change.
    assert!(!tracker.attribute_changed("name"));
    assert!(tracker.attribute_changed("age"));

    tracker.history_mut().flush();
    assert!(tracker.is_empty());
    assert!(!tracker.changed());
}

#[test]
fn test_snapshot_mode_mirrors_all_fields() {
    let mut tracked = Tracked::new(user("A", 100), Tracker::new());
    tracked.set_initial_state().unwrap();
    assert!(!tracked.attribute_changed("name"));
    assert!(!tracked.changed());

    tracked.set("name", "B").unwrap();
    assert!(tracked.attribute_changed("name"));
    assert!(tracked.changed());

    tracked.set("name", "A").unwrap();
    assert!(!tracked.changed());

    tracked.set("age", 101).unwrap();
    assert!(!tracked.attribute_changed("name"));
    assert!(tracked.changed());
}

#[test]
fn test_snapshot_and_log_modes_agree_on_simple_histories() {
    let mut logged = Tracked::new(user("A", 100), Tracker::new());
    let mut baselined = Tracked::new(user("A", 100), Tracker::new());
    baselined.set_initial_state().unwrap();

    for (attr, value) in [("name", json!("B")), ("age", json!(7)), ("name", json!("A"))] {
        logged.set(attr, &value).unwrap();
        baselined.set(attr, &value).unwrap();

        assert_eq!(logged.changed(), baselined.changed());
        for field in ["name", "age"] {
            assert_eq!(
                logged.attribute_changed(field),
                baselined.attribute_changed(field),
                "modes disagree on {field} after writing {attr}"
            );
        }
    }
}

#[test]
fn test_compare_other_entity_against_baseline() {
    let tracker = Tracker::new().with_initial_state(&user("A", 100)).unwrap();

    assert!(!tracker.changed_against(&user("A", 100)).unwrap());
    assert!(tracker.changed_against(&user("A", 99)).unwrap());
    assert!(tracker.attribute_changed_against("age", &user("A", 99)).unwrap());
    assert!(!tracker.attribute_changed_against("name", &user("A", 99)).unwrap());
}

#[test]
fn test_compare_without_baseline_is_an_error() {
    let tracker = Tracker::new();
    let err = tracker
        .attribute_changed_against("name", &user("B", 1))
        .unwrap_err();
    assert!(matches!(err, TrackError::MissingBaseline));
}

#[test]
fn test_observer_routing_precedence() {
    let calls: Calls = Default::default();
    let mut tracker = Tracker::new()
        .with_observer(recorder("global", &calls))
        .with_attribute_observer("x", recorder("x", &calls));

    tracker.record_change("y", json!(0), json!(1)).unwrap();
    assert!(calls.lock().unwrap().is_empty());

    tracker.record_change("x", json!(0), json!(1)).unwrap();
    assert_eq!(*calls.lock().unwrap(), vec!["x:x:0->1"]);
}

#[test]
fn test_allow_list_from_config() {
    let calls: Calls = Default::default();
    let config: TrackerConfig =
        serde_json::from_str(r#"{"observable_attributes": ["name"]}"#).unwrap();
    let mut tracked = Tracked::new(
        user("A", 100),
        Tracker::with_config(config).with_observer(recorder("g", &calls)),
    );

    tracked.set("age", 5).unwrap();
    tracked.set("name", "B").unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![r#"g:name:"A"->"B""#]);
    assert_eq!(tracked.history().len(), 2);
}

#[test]
fn test_observers_run_in_order_despite_failures() {
    let calls: Calls = Default::default();
    let mut tracker = Tracker::new()
        .with_observer(recorder("first", &calls))
        .with_observer(observer(|_, _, _| anyhow::bail!("second failed")))
        .with_observer(recorder("third", &calls));

    let err = tracker.record_change("n", json!(1), json!(2)).unwrap_err();

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["first:n:1->2", "third:n:1->2"]
    );
    assert_eq!(err.observer_failures()[0].observer_index, 1);
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_malformed_selector_from_json() {
    let err = AttributeSelector::try_from(&json!({"attrs": "name"})).unwrap_err();
    assert!(matches!(err, TrackError::InvalidArgument { .. }));

    let mut log = ChangeLog::new();
    log.push("name", json!("A"), json!("B"));
    let selector = AttributeSelector::try_from(&json!(["name"])).unwrap();
    assert_eq!(log.filter(selector).count(), 1);
}

#[test]
fn test_pattern_selector_on_log() {
    let mut log = ChangeLog::new();
    log.push("addr_city", json!("X"), json!("Y"));
    log.push("addr_zip", json!("1"), json!("2"));
    log.push("name", json!("A"), json!("B"));

    let addr = AttributeSelector::pattern("^addr_").unwrap();
    assert_eq!(log.filter(addr.clone()).count(), 2);
    assert_eq!(log.exclude(addr).fetch()[0].attribute(), "name");
}

#[test]
fn test_entries_serialize() {
    let mut log = ChangeLog::new();
    log.push("name", json!("A"), json!("B"));

    let value = serde_json::to_value(&log.entries()[0]).unwrap();
    assert_eq!(value["attribute"], "name");
    assert_eq!(value["old"], "A");
    assert_eq!(value["new"], "B");
    assert!(value["timestamp"].is_string());
}

#[test]
fn test_registry_keeps_entities_apart() {
    let registry = TrackerRegistry::default();
    registry
        .record_change("user:alice", "name", json!("Alice"), json!("Al"))
        .unwrap();

    assert_eq!(registry.get_changed("user:alice"), Some(true));
    assert_eq!(registry.get_changed("user:bob"), None);
    assert!(!registry.with_tracker("user:bob", |t| t.changed()));
}
