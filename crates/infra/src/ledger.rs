//! In-process donation history ledger.
//!
//! Append-only: entries are pushed in approval order and never changed or
//! removed. There is no update or delete API.

use std::collections::HashSet;

use bloodline_core::{DonationRequestId, UserId};
use bloodline_inventory::DonationHistoryEntry;

#[derive(Debug, Default)]
pub struct DonationLedger {
    entries: Vec<DonationHistoryEntry>,
    requests: HashSet<DonationRequestId>,
}

impl DonationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed donation.
    ///
    /// One entry per request rests on `decide_approval` refusing anything not
    /// `pending`, applied under the record lock; the assertion only catches a
    /// store that skips that check.
    pub fn append(&mut self, entry: DonationHistoryEntry) {
        debug_assert!(
            !self.requests.contains(&entry.request_id),
            "request {} already has a ledger entry",
            entry.request_id
        );
        self.requests.insert(entry.request_id);
        self.entries.push(entry);
    }

    #[cfg(test)]
    pub(crate) fn contains_request(&self, request_id: DonationRequestId) -> bool {
        self.requests.contains(&request_id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries newest first, optionally restricted to one donor.
    pub fn newest_first(&self, donor: Option<UserId>) -> Vec<DonationHistoryEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| donor.is_none_or(|d| e.donor == d))
            .cloned()
            .collect()
    }
}
