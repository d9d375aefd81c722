//! Inventory reservation service (application-level orchestration).
//!
//! The service is the only entry point that changes stock or request status:
//!
//! ```text
//! approve(request, approver)
//!   ↓
//! 1. Stamp: history entry id + time from the injected clock
//!   ↓
//! 2. Commit: store locks request + first matching record, decides, writes
//!    record / request / ledger entry as one unit
//!   ↓
//! 3. Report: typed error or the new ledger entry
//! ```
//!
//! Nothing is retried here. Insufficient stock and lost races surface to the
//! caller, which decides whether to try again.

use thiserror::Error;
use tracing::{info, instrument, warn};

use bloodline_core::{
    Clock, DomainError, DonationRequestId, HistoryEntryId, InventoryRecordId, SystemClock, UserId,
};
use bloodline_inventory::{
    ApprovalError, BloodGroup, DonationHistoryEntry, DonationRequest, InventoryRecord,
    NewDonationRequest, RequestStatus, StockError, TransitionError,
};

use crate::store::{BloodBankStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApproveError {
    #[error("donation request not found")]
    NotFound,

    #[error("request already processed (status: {0})")]
    AlreadyProcessed(RequestStatus),

    #[error("no inventory available for blood group {0}")]
    NoInventory(BloodGroup),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ApprovalError> for ApproveError {
    fn from(value: ApprovalError) -> Self {
        match value {
            ApprovalError::AlreadyProcessed(status) => ApproveError::AlreadyProcessed(status),
            ApprovalError::NoInventory(group) => ApproveError::NoInventory(group),
            ApprovalError::Stock(StockError::Insufficient {
                requested,
                available,
            }) => ApproveError::InsufficientStock {
                requested,
                available,
            },
        }
    }
}

impl From<TransitionError> for ApproveError {
    fn from(value: TransitionError) -> Self {
        ApprovalError::from(value).into()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectError {
    #[error("donation request not found")]
    NotFound,

    #[error("request already processed (status: {0})")]
    AlreadyProcessed(RequestStatus),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TransitionError> for RejectError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::AlreadyProcessed(status) => RejectError::AlreadyProcessed(status),
        }
    }
}

/// Errors from the non-reservation operations (submission, provisioning,
/// stock corrections, reads).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn not_found() -> Self {
        Self::Domain(DomainError::NotFound)
    }
}

/// Owns every state transition on stock and donation requests.
#[derive(Debug)]
pub struct ReservationService<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S> ReservationService<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> ReservationService<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, C> ReservationService<S, C>
where
    S: BloodBankStore,
    C: Clock,
{
    /// Approve a pending request, reserving its units from the first bank that
    /// stocks the blood group and appending the donation to the ledger.
    #[instrument(skip(self), fields(request_id = %request_id, approver = %approver), err)]
    pub async fn approve(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
    ) -> Result<DonationHistoryEntry, ApproveError> {
        let entry = self
            .store
            .commit_approval(request_id, approver, HistoryEntryId::new(), self.clock.now())
            .await
            .inspect_err(|e| match e {
                ApproveError::Store(_) => {}
                refused => warn!(reason = %refused, "approval refused"),
            })?;

        info!(
            blood_group = %entry.blood_group,
            units = entry.units,
            blood_bank_id = %entry.blood_bank_id,
            "request approved"
        );
        Ok(entry)
    }

    #[instrument(skip(self), fields(request_id = %request_id, approver = %approver), err)]
    pub async fn reject(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
    ) -> Result<DonationRequest, RejectError> {
        let request = self.store.commit_rejection(request_id, approver).await?;
        info!("request rejected");
        Ok(request)
    }

    /// Create a pending request. Non-positive units fail with `InvalidUnits`.
    #[instrument(
        skip(self, new),
        fields(requester = %new.requester, blood_group = %new.blood_group, units = new.units),
        err
    )]
    pub async fn submit_request(
        &self,
        new: NewDonationRequest,
    ) -> Result<DonationRequest, ServiceError> {
        let request = DonationRequest::submit(DonationRequestId::new(), new, self.clock.now())?;
        self.store.insert_request(request.clone()).await?;
        info!(request_id = %request.id, "request submitted");
        Ok(request)
    }

    /// Staff stock correction. Serializes with approvals on the same record.
    #[instrument(skip(self), fields(record_id = %record_id), err)]
    pub async fn set_units(
        &self,
        record_id: InventoryRecordId,
        units: u32,
    ) -> Result<InventoryRecord, ServiceError> {
        let record = self
            .store
            .set_units(record_id, units)
            .await?
            .ok_or_else(ServiceError::not_found)?;
        info!(blood_group = %record.blood_group, units, "stock level set");
        Ok(record)
    }
}
