//! Recent bot activity for operators.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events kept for late subscribers.
pub const EVENT_HISTORY: usize = 100;

/// Severity of an activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    /// Normal operation
    #[display("INFO")]
    Info,
    /// Degraded but carrying on
    #[display("WARNING")]
    Warning,
    /// Something the operator should act on
    #[display("ERROR")]
    Error,
}

/// One line of activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotEvent {
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: EventLevel,
    /// What happened
    pub message: String,
}

impl std::fmt::Display for BotEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.to_rfc3339(),
            self.level,
            self.message
        )
    }
}

struct Journal {
    recent: VecDeque<BotEvent>,
    live: broadcast::Sender<BotEvent>,
}

/// Bounded history of [`BotEvent`]s plus a live feed.
///
/// Holds the last [`EVENT_HISTORY`] events. Subscribers get the history and
/// a receiver in one step, so nothing recorded in between is lost or
/// delivered twice.
#[derive(Clone)]
pub struct EventLog {
    journal: Arc<Mutex<Journal>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(EVENT_HISTORY);
        Self {
            journal: Arc::new(Mutex::new(Journal {
                recent: VecDeque::with_capacity(EVENT_HISTORY),
                live,
            })),
        }
    }

    /// Append an event, dropping the oldest past [`EVENT_HISTORY`].
    pub fn record(&self, level: EventLevel, message: impl Into<String>) {
        let event = BotEvent {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        let mut journal = self.journal.lock();
        if journal.recent.len() == EVENT_HISTORY {
            journal.recent.pop_front();
        }
        journal.recent.push_back(event.clone());
        // No subscribers is fine.
        let _ = journal.live.send(event);
    }

    /// Record at [`EventLevel::Info`].
    pub fn info(&self, message: impl Into<String>) {
        self.record(EventLevel::Info, message);
    }

    /// Record at [`EventLevel::Warning`].
    pub fn warn(&self, message: impl Into<String>) {
        self.record(EventLevel::Warning, message);
    }

    /// Record at [`EventLevel::Error`].
    pub fn error(&self, message: impl Into<String>) {
        self.record(EventLevel::Error, message);
    }

    /// History, oldest first.
    pub fn recent(&self) -> Vec<BotEvent> {
        self.journal.lock().recent.iter().cloned().collect()
    }

    /// History, oldest first, and a receiver for everything after it.
    pub fn subscribe(&self) -> (Vec<BotEvent>, broadcast::Receiver<BotEvent>) {
        let journal = self.journal.lock();
        let receiver = journal.live.subscribe();
        (journal.recent.iter().cloned().collect(), receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_bounded() {
        let log = EventLog::new();
        for n in 0..(EVENT_HISTORY + 5) {
            log.info(format!("event {}", n));
        }
        let recent = log.recent();
        assert_eq!(recent.len(), EVENT_HISTORY);
        assert_eq!(recent[0].message, "event 5");
        assert_eq!(recent[EVENT_HISTORY - 1].message, "event 104");
    }

    #[tokio::test]
    async fn test_subscriber_sees_history_then_live() {
        let log = EventLog::new();
        log.info("Bot activated");
        let (history, mut live) = log.subscribe();
        log.error("Cannot activate: banned from somechannel");

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].level, EventLevel::Info);
        let next = live.recv().await.expect("live event");
        assert_eq!(next.level, EventLevel::Error);
        assert!(next.to_string().contains("[ERROR] Cannot activate"));
    }
}
