//! Store metrics.
//!
//! Counter names for record store operations. These complement the
//! structured logging approach already in place.

use metrics::{counter, describe_counter};

/// Records pushed counter.
pub const STORE_PUSH_TOTAL: &str = "cairn_store_push_total";

/// Records pulled counter.
pub const STORE_PULL_TOTAL: &str = "cairn_store_pull_total";

/// Records deleted counter.
pub const STORE_DELETE_TOTAL: &str = "cairn_store_delete_total";

/// Discovery tag application failures counter.
pub const STORE_TAG_FAILURES_TOTAL: &str = "cairn_store_tag_failures_total";

/// Registers descriptions for all store metrics.
///
/// Call once at startup after installing a metrics recorder.
pub fn describe() {
    describe_counter!(STORE_PUSH_TOTAL, "Records pushed into the store");
    describe_counter!(STORE_PULL_TOTAL, "Records pulled from the store");
    describe_counter!(STORE_DELETE_TOTAL, "Records deleted from the store");
    describe_counter!(
        STORE_TAG_FAILURES_TOTAL,
        "Discovery tags that failed to apply"
    );
}

pub(crate) fn record_push() {
    counter!(STORE_PUSH_TOTAL).increment(1);
}

pub(crate) fn record_pull() {
    counter!(STORE_PULL_TOTAL).increment(1);
}

pub(crate) fn record_delete() {
    counter!(STORE_DELETE_TOTAL).increment(1);
}

pub(crate) fn record_tag_failures(count: u64) {
    if count > 0 {
        counter!(STORE_TAG_FAILURES_TOTAL).increment(count);
    }
}
