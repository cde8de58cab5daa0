//! Bounded in-process error journal.
//!
//! Handler failures are recorded here before the user-visible reply is
//! composed, so an operator can inspect recent failures without scraping
//! chat history.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::SystemTime;

const JOURNAL_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub module: String,
    pub detail: String,
    pub at: SystemTime,
}

#[derive(Default)]
pub struct ErrorJournal {
    entries: Mutex<VecDeque<ErrorEntry>>,
}

impl ErrorJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, module: &str, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::error!(module, %detail, "module failure recorded");
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(ErrorEntry {
                module: module.to_string(),
                detail,
                at: SystemTime::now(),
            });
            while entries.len() > JOURNAL_CAPACITY {
                entries.pop_front();
            }
        }
    }

    pub fn snapshot(&self) -> Vec<ErrorEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}
