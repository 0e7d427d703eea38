#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::Rc;

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: usize,
    pub consumer: String,
    pub event: String,
}

impl LogEntry {
    /// `consumer:event`, the short form used in assertions.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}", self.consumer, self.event)
    }
}

/// Shared ordered event log. Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Rc<RefCell<Vec<LogEntry>>>,
}

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, consumer: &str, event: &str) {
        let mut entries = self.entries.borrow_mut();
        let seq = entries.len();
        entries.push(LogEntry {
            seq,
            consumer: consumer.to_owned(),
            event: event.to_owned(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    /// Every entry as `consumer:event`.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.entries.borrow().iter().map(LogEntry::label).collect()
    }

    /// Labels for one kind of event only.
    #[must_use]
    pub fn labels_for(&self, event: &str) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.event == event)
            .map(LogEntry::label)
            .collect()
    }

    /// Position of the first `consumer:event`, if recorded.
    #[must_use]
    pub fn position(&self, consumer: &str, event: &str) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|entry| entry.consumer == consumer && entry.event == event)
    }

    #[must_use]
    pub fn count(&self, consumer: &str, event: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.consumer == consumer && entry.event == event)
            .count()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// One JSON object per line.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        self.entries
            .borrow()
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "seq": entry.seq,
                    "consumer": entry.consumer,
                    "event": entry.event,
                })
                .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
