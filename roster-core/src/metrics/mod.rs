//! Metrics for access-control decisions and membership changes
//!
//! Recording goes through the `metrics` facade; installing an exporter is
//! the embedding application's job. Without one, recording is a no-op.

use crate::core_access::permission::ActionKind;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const DECISIONS_ALLOWED: &str = "access.decisions.allowed";
pub const DECISIONS_DENIED: &str = "access.decisions.denied";
pub const JOIN_SUCCEEDED: &str = "access.join.succeeded";
pub const JOIN_REJECTED: &str = "access.join.rejected";
pub const MEMBERSHIP_CHANGES: &str = "access.membership.changes";
pub const LINKS_GENERATED: &str = "access.links.generated";
pub const SAVE_CONFLICTS: &str = "access.store.version_conflicts";
pub const OPERATION_DURATION: &str = "access.operation.duration_ms";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(DECISIONS_ALLOWED, "Permission checks that allowed the action");
    describe_counter!(DECISIONS_DENIED, "Permission checks that denied the action");
    describe_counter!(JOIN_SUCCEEDED, "Successful join link consumptions");
    describe_counter!(JOIN_REJECTED, "Join attempts refused (unknown, expired or exhausted link)");
    describe_counter!(MEMBERSHIP_CHANGES, "Participant add/invite/remove/role transitions");
    describe_counter!(LINKS_GENERATED, "Join links generated");
    describe_counter!(SAVE_CONFLICTS, "Saves rejected because of a stale version");
    describe_histogram!(OPERATION_DURATION, "Access operation duration in milliseconds");
}

/// Record the outcome of a permission check
pub fn record_decision(action: ActionKind, allowed: bool) {
    let name = if allowed { DECISIONS_ALLOWED } else { DECISIONS_DENIED };
    counter!(name, "action" => action.as_str()).increment(1);
}

/// Record a join attempt; `reason` is set for refusals
pub fn record_join(reason: Option<&'static str>) {
    match reason {
        None => counter!(JOIN_SUCCEEDED).increment(1),
        Some(reason) => counter!(JOIN_REJECTED, "reason" => reason).increment(1),
    }
}

/// Record a membership transition
///
/// One of `added`, `invited`, `accepted`, `removed`, `role_updated` or `joined`.
pub fn record_membership_change(change: &'static str) {
    counter!(MEMBERSHIP_CHANGES, "change" => change).increment(1);
}

pub fn record_link_generated() {
    counter!(LINKS_GENERATED).increment(1);
}

pub fn record_save_conflict() {
    counter!(SAVE_CONFLICTS).increment(1);
}

/// Records the elapsed time of an operation when dropped
pub struct Timer {
    operation: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        histogram!(OPERATION_DURATION, "operation" => self.operation)
            .record(elapsed.as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        // No recorder installed; must not panic
        init_metrics();
        record_decision(ActionKind::AddParticipant, true);
        record_join(Some("expired"));
        record_membership_change("added");
    }

    #[test]
    fn test_timer() {
        // Records on drop
        drop(Timer::new("add_participant"));
    }
}
