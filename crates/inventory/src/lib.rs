//! Blood-bank inventory domain module.
//!
//! This crate contains the business rules for stock, donation requests and the
//! donation ledger, implemented purely as deterministic domain logic (no IO,
//! no HTTP, no storage, no locking).

pub mod approval;
pub mod bank;
pub mod blood_group;
pub mod history;
pub mod record;
pub mod request;

pub use approval::{Approval, ApprovalError, decide_approval};
pub use bank::{BloodBank, NewBloodBank};
pub use blood_group::BloodGroup;
pub use history::DonationHistoryEntry;
pub use record::{InventoryRecord, StockError};
pub use request::{DonationRequest, NewDonationRequest, RequestStatus, TransitionError};

/// Starting stock for every blood group of a newly registered bank.
pub const DEFAULT_BANK_UNITS: u32 = 10;
