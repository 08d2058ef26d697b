//! Audit trail demo.
//!
//! Tracks a user record, prints observer notifications, then queries the
//! change log and compares against a baseline.
//!
//! Run with `RUST_LOG=tracklog=debug cargo run --example audit_trail` to see
//! the library's own tracing output.
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracklog::prelude::*;

#[derive(Debug, Serialize, Deserialize)]
struct User {
    name: String,
    age: u32,
    email: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tracklog=info")),
        )
        .init();

    let tracker = Tracker::new()
        .with_observer(observer(|attr, old, new| {
            println!("  observer: {attr} {old} -> {new}");
            Ok(())
        }))
        .with_observer(observer(|attr, _, new| {
            if attr == "age" && new.as_u64().is_some_and(|age| age > 150) {
                anyhow::bail!("implausible age {new}");
            }
            Ok(())
        }));

    let mut user = Tracked::construct(
        User {
            name: String::new(),
            age: 0,
            email: None,
        },
        tracker,
        |u| {
            u.set("name", "A")?;
            u.set("age", 100)
        },
    )?;
    println!("after construction: {}", user.tracker());

    println!("writes:");
    user.set("name", "B")?;
    user.set("name", "C")?;
    user.update(|u| u.email = Some("c@example.com".to_string()))?;
    if let Err(e) = user.set("age", 200) {
        println!("  write recorded, but: {e}");
    }

    println!("\nfull log ({} entries):", user.history().count());
    for entry in user.history().fetch() {
        println!("  {entry}");
    }

    let log = user.tracker_mut().history_mut();
    println!("\nonly 'name':");
    for entry in log.filter("name").fetch() {
        println!("  {entry}");
    }
    log.clear_buffer();

    println!("\nchanged attributes: {:?}", user.history().changed_attributes());
    println!("name changed: {}", user.attribute_changed("name"));

    user.set_initial_state()?;
    println!("\nbaselined; changed: {}", user.changed());
    user.set("name", "D")?;
    println!("after rename; changed: {}", user.changed());

    let (entity, tracker) = user.into_parts();
    println!("\nfinal entity: {entity:?}");
    println!("{tracker}");
    Ok(())
}
