use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bloodline_core::{BloodBankId, DonationRequestId, Entity, HistoryEntryId, UserId};

use crate::BloodGroup;

/// Ledger entry for one fulfilled donation request (immutable fact).
///
/// Created exactly once per approved request, in the same unit of work as the
/// stock decrement. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationHistoryEntry {
    pub id: HistoryEntryId,
    pub request_id: DonationRequestId,
    pub donor: UserId,
    pub blood_group: BloodGroup,
    pub units: u32,
    pub blood_bank_id: BloodBankId,
    pub donated_at: DateTime<Utc>,
}

impl Entity for DonationHistoryEntry {
    type Id = HistoryEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
