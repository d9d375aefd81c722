//! Infrastructure layer: storage backends and the application services that
//! run on top of them (reservation, provisioning, reporting).

pub mod ledger;
pub mod provisioning;
pub mod reports;
pub mod reservation;
pub mod store;

pub use provisioning::{provision_bank, register_bank};
pub use reservation::{ApproveError, RejectError, ReservationService, ServiceError};
pub use store::{BloodBankStore, InMemoryStore, Provisioned, StoreError};
