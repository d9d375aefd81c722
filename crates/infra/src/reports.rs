//! Read-only queries for dashboards and reporting.
//!
//! Plain reads over the store; nothing here takes a record lock, so figures
//! may lag an approval that is committing at the same moment.

use std::collections::BTreeMap;

use serde::Serialize;

use bloodline_core::UserId;
use bloodline_inventory::{BloodGroup, DonationHistoryEntry, RequestStatus};

use crate::store::{BloodBankStore, StoreError};

/// Total units per blood group across all banks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub by_group: BTreeMap<BloodGroup, u64>,
    pub total_units: u64,
}

/// Every blood group appears, with 0 where no bank holds it.
pub async fn inventory_by_group<S>(store: &S) -> Result<InventorySummary, StoreError>
where
    S: BloodBankStore + ?Sized,
{
    let mut by_group: BTreeMap<BloodGroup, u64> =
        BloodGroup::ALL.iter().map(|g| (*g, 0)).collect();

    for record in store.list_records().await? {
        *by_group.entry(record.blood_group).or_default() += u64::from(record.units());
    }

    let total_units = by_group.values().sum();
    Ok(InventorySummary {
        by_group,
        total_units,
    })
}

pub async fn pending_request_count<S>(store: &S) -> Result<u64, StoreError>
where
    S: BloodBankStore + ?Sized,
{
    store.count_requests(RequestStatus::Pending).await
}

/// One donor's ledger entries, newest first.
pub async fn donor_history<S>(
    store: &S,
    donor: UserId,
) -> Result<Vec<DonationHistoryEntry>, StoreError>
where
    S: BloodBankStore + ?Sized,
{
    store.history(Some(donor)).await
}
