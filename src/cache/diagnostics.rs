//! Reporting for best-effort operations
//!
//! Listing persistence and "clear everything" conveniences never fail their
//! caller. Their errors go to an injected sink so tests can observe them.

use tracing::warn;

use crate::error::CacheError;

/// Operations whose failures are reported but not propagated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestEffortOp {
    ListingSave,
    ListingLoad,
    ListingClear,
    ClearAll,
}

pub trait DiagnosticSink: Send + Sync {
    fn best_effort_failed(&self, op: BestEffortOp, error: &CacheError);
}

/// Default sink: log through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn best_effort_failed(&self, op: BestEffortOp, error: &CacheError) {
        warn!(operation = ?op, error = %error, "Best-effort cache operation failed");
    }
}
