use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use bloodline_core::{BloodBankId, DonationRequestId, HistoryEntryId, InventoryRecordId, UserId};
use bloodline_inventory::{
    BloodBank, BloodGroup, DonationHistoryEntry, DonationRequest, InventoryRecord, RequestStatus,
};

use crate::reservation::{ApproveError, RejectError};

/// Storage failure (infrastructure, not business rules).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result of a get-or-create on the {bank, blood group} key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub record: InventoryRecord,
    /// `false` when the record already existed and was left untouched.
    pub created: bool,
}

/// Persistence boundary for banks, stock, requests and the donation ledger.
///
/// ## Locking contract
///
/// - `commit_approval` is one atomic unit: it takes an exclusive lock on the
///   request and on the selected inventory record, evaluates the approval with
///   [`bloodline_inventory::decide_approval`], and writes the record, the
///   request and the ledger entry together or not at all.
/// - `set_units` takes the same per-record lock, so it serializes with approvals
///   on that record.
/// - `commit_rejection` only guards its own row ("still pending" precondition).
///
/// ## Record selection
///
/// Approvals draw from the first record of the request's blood group ordered by
/// bank name, then bank id.
///
/// ## Listing order
///
/// - records: bank name, bank id, blood group
/// - requests and history: newest first
#[async_trait]
pub trait BloodBankStore: Send + Sync {
    async fn insert_bank(&self, bank: BloodBank) -> Result<(), StoreError>;

    async fn bank(&self, id: BloodBankId) -> Result<Option<BloodBank>, StoreError>;

    /// Create the {bank, group} record with `default_units` unless it exists.
    async fn get_or_create_record(
        &self,
        bank_id: BloodBankId,
        blood_group: BloodGroup,
        default_units: u32,
    ) -> Result<Provisioned, StoreError>;

    async fn record(&self, id: InventoryRecordId) -> Result<Option<InventoryRecord>, StoreError>;

    async fn list_records(&self) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Overwrite a record's units under its lock. `None` if the record is unknown.
    async fn set_units(
        &self,
        id: InventoryRecordId,
        units: u32,
    ) -> Result<Option<InventoryRecord>, StoreError>;

    async fn insert_request(&self, request: DonationRequest) -> Result<(), StoreError>;

    async fn request(&self, id: DonationRequestId) -> Result<Option<DonationRequest>, StoreError>;

    /// All requests, or only those of `requester`.
    async fn list_requests(
        &self,
        requester: Option<UserId>,
    ) -> Result<Vec<DonationRequest>, StoreError>;

    async fn count_requests(&self, status: RequestStatus) -> Result<u64, StoreError>;

    async fn commit_approval(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
        entry_id: HistoryEntryId,
        approved_at: DateTime<Utc>,
    ) -> Result<DonationHistoryEntry, ApproveError>;

    async fn commit_rejection(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
    ) -> Result<DonationRequest, RejectError>;

    /// Ledger entries, or only those of `donor`.
    async fn history(&self, donor: Option<UserId>) -> Result<Vec<DonationHistoryEntry>, StoreError>;
}

#[async_trait]
impl<S> BloodBankStore for Arc<S>
where
    S: BloodBankStore + ?Sized,
{
    async fn insert_bank(&self, bank: BloodBank) -> Result<(), StoreError> {
        (**self).insert_bank(bank).await
    }

    async fn bank(&self, id: BloodBankId) -> Result<Option<BloodBank>, StoreError> {
        (**self).bank(id).await
    }

    async fn get_or_create_record(
        &self,
        bank_id: BloodBankId,
        blood_group: BloodGroup,
        default_units: u32,
    ) -> Result<Provisioned, StoreError> {
        (**self)
            .get_or_create_record(bank_id, blood_group, default_units)
            .await
    }

    async fn record(&self, id: InventoryRecordId) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).record(id).await
    }

    async fn list_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).list_records().await
    }

    async fn set_units(
        &self,
        id: InventoryRecordId,
        units: u32,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).set_units(id, units).await
    }

    async fn insert_request(&self, request: DonationRequest) -> Result<(), StoreError> {
        (**self).insert_request(request).await
    }

    async fn request(&self, id: DonationRequestId) -> Result<Option<DonationRequest>, StoreError> {
        (**self).request(id).await
    }

    async fn list_requests(
        &self,
        requester: Option<UserId>,
    ) -> Result<Vec<DonationRequest>, StoreError> {
        (**self).list_requests(requester).await
    }

    async fn count_requests(&self, status: RequestStatus) -> Result<u64, StoreError> {
        (**self).count_requests(status).await
    }

    async fn commit_approval(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
        entry_id: HistoryEntryId,
        approved_at: DateTime<Utc>,
    ) -> Result<DonationHistoryEntry, ApproveError> {
        (**self)
            .commit_approval(request_id, approver, entry_id, approved_at)
            .await
    }

    async fn commit_rejection(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
    ) -> Result<DonationRequest, RejectError> {
        (**self).commit_rejection(request_id, approver).await
    }

    async fn history(&self, donor: Option<UserId>) -> Result<Vec<DonationHistoryEntry>, StoreError> {
        (**self).history(donor).await
    }
}
