use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bloodline_core::{DomainError, DomainResult, DonationRequestId, Entity, UserId};

use crate::BloodGroup;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(DomainError::validation(format!("unknown request status '{other}'"))),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("request already processed (status: {0})")]
    AlreadyProcessed(RequestStatus),
}

/// Input for submitting a request. `units` is signed so that non-positive
/// values coming from callers can be reported as `InvalidUnits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDonationRequest {
    pub requester: UserId,
    pub blood_group: BloodGroup,
    pub units: i64,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub hospital_name: String,
}

/// A request for blood units.
///
/// Status moves pending → approved or pending → rejected, once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRequest {
    pub id: DonationRequestId,
    pub requester: UserId,
    pub blood_group: BloodGroup,
    units: u32,
    pub city: String,
    pub hospital_name: String,
    status: RequestStatus,
    approved_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl DonationRequest {
    pub fn submit(
        id: DonationRequestId,
        new: NewDonationRequest,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if new.units <= 0 {
            return Err(DomainError::InvalidUnits(new.units));
        }
        let units = u32::try_from(new.units)
            .map_err(|_| DomainError::validation(format!("units too large: {}", new.units)))?;

        Ok(Self {
            id,
            requester: new.requester,
            blood_group: new.blood_group,
            units,
            city: new.city.trim().to_string(),
            hospital_name: new.hospital_name.trim().to_string(),
            status: RequestStatus::Pending,
            approved_by: None,
            created_at,
        })
    }

    /// Rebuild a request from persisted columns (storage adapters only).
    #[allow(clippy::too_many_arguments)]
    pub fn rehydrate(
        id: DonationRequestId,
        requester: UserId,
        blood_group: BloodGroup,
        units: u32,
        city: String,
        hospital_name: String,
        status: RequestStatus,
        approved_by: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            requester,
            blood_group,
            units,
            city,
            hospital_name,
            status,
            approved_by,
            created_at,
        }
    }

    pub fn units(&self) -> u32 {
        self.units
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn ensure_pending(&self) -> Result<(), TransitionError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(TransitionError::AlreadyProcessed(self.status))
        }
    }

    pub fn mark_approved(&mut self, approver: UserId) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        self.status = RequestStatus::Approved;
        self.approved_by = Some(approver);
        Ok(())
    }

    pub fn reject(&mut self, approver: UserId) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        self.status = RequestStatus::Rejected;
        self.approved_by = Some(approver);
        Ok(())
    }
}

impl Entity for DonationRequest {
    type Id = DonationRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request(units: i64) -> NewDonationRequest {
        NewDonationRequest {
            requester: UserId::new(),
            blood_group: BloodGroup::APositive,
            units,
            city: " Lahore ".to_string(),
            hospital_name: "General".to_string(),
        }
    }

    fn pending(units: i64) -> DonationRequest {
        DonationRequest::submit(DonationRequestId::new(), new_request(units), Utc::now()).unwrap()
    }

    #[test]
    fn submit_starts_pending_without_approver() {
        let req = pending(2);
        assert_eq!(req.status(), RequestStatus::Pending);
        assert_eq!(req.approved_by(), None);
        assert_eq!(req.units(), 2);
        assert_eq!(req.city, "Lahore");
    }

    #[test]
    fn non_positive_units_are_invalid() {
        for units in [0, -3] {
            let err = DonationRequest::submit(DonationRequestId::new(), new_request(units), Utc::now())
                .unwrap_err();
            assert_eq!(err, DomainError::InvalidUnits(units));
        }
    }

    #[test]
    fn reject_records_the_approver() {
        let staff = UserId::new();
        let mut req = pending(1);
        req.reject(staff).unwrap();
        assert_eq!(req.status(), RequestStatus::Rejected);
        assert_eq!(req.approved_by(), Some(staff));
    }

    #[test]
    fn processed_requests_never_transition_again() {
        let mut approved = pending(1);
        approved.mark_approved(UserId::new()).unwrap();
        assert_eq!(
            approved.reject(UserId::new()),
            Err(TransitionError::AlreadyProcessed(RequestStatus::Approved))
        );
        assert_eq!(approved.status(), RequestStatus::Approved);

        let mut rejected = pending(1);
        rejected.reject(UserId::new()).unwrap();
        assert_eq!(
            rejected.mark_approved(UserId::new()),
            Err(TransitionError::AlreadyProcessed(RequestStatus::Rejected))
        );
    }

    #[test]
    fn status_text_round_trips() {
        for status in [RequestStatus::Pending, RequestStatus::Approved, RequestStatus::Rejected] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("done".parse::<RequestStatus>().is_err());
    }
}
