//! Approval decision (pure).
//!
//! `decide_approval` works on copies and returns every row an approval touches.
//! Storage adapters hold the request and record locks while calling it and then
//! write the returned `Approval` as one unit; if it returns an error nothing
//! has changed.

use chrono::{DateTime, Utc};
use thiserror::Error;

use bloodline_core::{HistoryEntryId, UserId};

use crate::{
    BloodGroup, DonationHistoryEntry, DonationRequest, InventoryRecord, RequestStatus, StockError,
    TransitionError,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("request already processed (status: {0})")]
    AlreadyProcessed(RequestStatus),

    #[error("no inventory available for blood group {0}")]
    NoInventory(BloodGroup),

    #[error(transparent)]
    Stock(#[from] StockError),
}

impl From<TransitionError> for ApprovalError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::AlreadyProcessed(status) => ApprovalError::AlreadyProcessed(status),
        }
    }
}

/// The three rows written by a successful approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub request: DonationRequest,
    pub record: InventoryRecord,
    pub entry: DonationHistoryEntry,
}

/// Decide whether `request` can be fulfilled from `record`.
///
/// `record` is the stock row selected for the request's blood group, or `None`
/// when no bank holds that group.
pub fn decide_approval(
    request: &DonationRequest,
    record: Option<&InventoryRecord>,
    approver: UserId,
    entry_id: HistoryEntryId,
    approved_at: DateTime<Utc>,
) -> Result<Approval, ApprovalError> {
    request.ensure_pending()?;

    let record = record.ok_or(ApprovalError::NoInventory(request.blood_group))?;

    let mut record = record.clone();
    record.reserve(request.units())?;

    let mut request = request.clone();
    request.mark_approved(approver)?;

    let entry = DonationHistoryEntry {
        id: entry_id,
        request_id: request.id,
        donor: request.requester,
        blood_group: request.blood_group,
        units: request.units(),
        blood_bank_id: record.blood_bank_id,
        donated_at: approved_at,
    };

    Ok(Approval {
        request,
        record,
        entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodline_core::{BloodBankId, DonationRequestId, InventoryRecordId};
    use proptest::prelude::*;

    use crate::NewDonationRequest;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn request(group: BloodGroup, units: i64) -> DonationRequest {
        DonationRequest::submit(
            DonationRequestId::new(),
            NewDonationRequest {
                requester: UserId::new(),
                blood_group: group,
                units,
                city: String::new(),
                hospital_name: String::new(),
            },
            test_time(),
        )
        .unwrap()
    }

    fn record(group: BloodGroup, units: u32) -> InventoryRecord {
        InventoryRecord::new(InventoryRecordId::new(), BloodBankId::new(), group, units)
    }

    #[test]
    fn approval_decrements_and_records_history() {
        let req = request(BloodGroup::ONegative, 3);
        let rec = record(BloodGroup::ONegative, 5);
        let staff = UserId::new();
        let at = test_time();

        let approval = decide_approval(&req, Some(&rec), staff, HistoryEntryId::new(), at).unwrap();

        assert_eq!(approval.record.units(), 2);
        assert_eq!(approval.request.status(), RequestStatus::Approved);
        assert_eq!(approval.request.approved_by(), Some(staff));
        assert_eq!(approval.entry.units, 3);
        assert_eq!(approval.entry.donor, req.requester);
        assert_eq!(approval.entry.request_id, req.id);
        assert_eq!(approval.entry.blood_bank_id, rec.blood_bank_id);
        assert_eq!(approval.entry.donated_at, at);

        // Inputs are untouched; the caller decides whether to persist.
        assert_eq!(rec.units(), 5);
        assert!(req.is_pending());
    }

    #[test]
    fn missing_record_is_no_inventory() {
        let req = request(BloodGroup::AbNegative, 1);
        let err = decide_approval(&req, None, UserId::new(), HistoryEntryId::new(), test_time())
            .unwrap_err();
        assert_eq!(err, ApprovalError::NoInventory(BloodGroup::AbNegative));
    }

    #[test]
    fn insufficient_stock_is_reported_with_amounts() {
        let req = request(BloodGroup::ONegative, 4);
        let rec = record(BloodGroup::ONegative, 2);
        let err = decide_approval(&req, Some(&rec), UserId::new(), HistoryEntryId::new(), test_time())
            .unwrap_err();
        assert_eq!(
            err,
            ApprovalError::Stock(StockError::Insufficient {
                requested: 4,
                available: 2
            })
        );
    }

    #[test]
    fn status_is_checked_before_stock() {
        let mut req = request(BloodGroup::BPositive, 1);
        req.reject(UserId::new()).unwrap();
        let err = decide_approval(&req, None, UserId::new(), HistoryEntryId::new(), test_time())
            .unwrap_err();
        assert_eq!(err, ApprovalError::AlreadyProcessed(RequestStatus::Rejected));
    }

    proptest! {
        /// Property: an approval either takes exactly the requested units or
        /// fails because they exceed the stock.
        #[test]
        fn approval_is_exact_or_refused(stock in 0u32..200, wanted in 1i64..200) {
            let req = request(BloodGroup::APositive, wanted);
            let rec = record(BloodGroup::APositive, stock);

            match decide_approval(&req, Some(&rec), UserId::new(), HistoryEntryId::new(), test_time()) {
                Ok(a) => {
                    prop_assert!(wanted <= i64::from(stock));
                    prop_assert_eq!(i64::from(a.record.units()), i64::from(stock) - wanted);
                    prop_assert_eq!(i64::from(a.entry.units), wanted);
                }
                Err(ApprovalError::Stock(_)) => prop_assert!(wanted > i64::from(stock)),
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }
    }
}
