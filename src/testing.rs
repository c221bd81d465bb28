//! Shared test doubles

use std::sync::Mutex;

use crate::cache::{BestEffortOp, DiagnosticSink};
use crate::error::CacheError;

/// Sink that remembers every reported failure
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(BestEffortOp, String)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(BestEffortOp, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<BestEffortOp> {
        self.events().into_iter().map(|(op, _)| op).collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn best_effort_failed(&self, op: BestEffortOp, error: &CacheError) {
        self.events.lock().unwrap().push((op, error.to_string()));
    }
}
