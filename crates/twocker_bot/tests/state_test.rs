//! Tests for the shared bot state.

use std::sync::Arc;
use twocker_bot::{BotConfig, BotState, ConfigDelta};

fn state() -> BotState {
    let initial = BotConfig::default()
        .apply(
            &ConfigDelta::default()
                .with_channel("somechannel".to_string())
                .with_message("Hello world!".to_string()),
        )
        .expect("valid");
    BotState::new(initial).expect("valid state")
}

#[test]
fn test_rejected_update_leaves_prior_config() {
    let state = state();
    let before = state.snapshot();

    let err = state
        .update(
            &ConfigDelta::default()
                .with_message("Changed".to_string())
                .with_interval_minutes(0),
        )
        .unwrap_err();
    assert_eq!(err.field, "interval_minutes");
    assert_eq!(state.snapshot(), before, "no field of a rejected delta lands");
}

#[test]
fn test_update_reports_change() {
    let state = state();
    let change = state
        .update(&ConfigDelta::default().with_interval_minutes(7))
        .expect("valid");
    assert!(change.changed());
    assert_eq!(*change.previous().interval_minutes(), 5);
    assert_eq!(*change.current().interval_minutes(), 7);

    let same = state
        .update(&ConfigDelta::default().with_interval_minutes(7))
        .expect("valid");
    assert!(!same.changed());
}

#[test]
fn test_initial_config_validated() {
    let invalid = BotConfig::default()
        .apply(&ConfigDelta::default().with_channel("somechannel".to_string()))
        .expect("inactive config may lack a message");
    assert!(BotState::new(invalid.clone()).is_ok());

    let activated = invalid.apply(&ConfigDelta::default().with_active(true));
    assert!(activated.is_err(), "active config needs a message");
}

#[test]
fn test_toggle_flips_active() {
    let state = state();
    assert!(*state.toggle().expect("activate").current().active());
    assert!(!*state.toggle().expect("deactivate").current().active());
}

#[tokio::test]
async fn test_subscribers_see_changes() {
    let state = state();
    let mut rx = state.subscribe();
    state
        .update(&ConfigDelta::default().with_interval_minutes(9))
        .expect("valid");
    rx.changed().await.expect("sender alive");
    assert_eq!(*rx.borrow().interval_minutes(), 9);

    // A rejected update publishes nothing.
    let _ = state.update(&ConfigDelta::default().with_interval_minutes(0));
    assert!(!rx.has_changed().expect("sender alive"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_stay_consistent() {
    let state = Arc::new(state());
    let mut tasks = Vec::new();
    for i in 0..16u64 {
        let state = Arc::clone(&state);
        tasks.push(tokio::spawn(async move {
            let minutes = i % 60 + 1;
            let message = format!("message {}", minutes);
            state
                .update(
                    &ConfigDelta::default()
                        .with_interval_minutes(minutes)
                        .with_message(message),
                )
                .expect("valid");
            let seen = state.snapshot();
            seen.validate().expect("snapshots are always valid");
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }

    // Every delta sets both fields together, so they always agree.
    let last = state.snapshot();
    assert_eq!(
        last.message(),
        &format!("message {}", last.interval_minutes())
    );
}
