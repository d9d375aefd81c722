use serde::{Deserialize, Serialize};

use bloodline_core::{BloodBankId, DomainError, InventoryRecordId, UserId};
use bloodline_infra::Provisioned;
use bloodline_inventory::{BloodBank, BloodGroup, InventoryRecord, NewBloodBank};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterBankRequest {
    pub name: String,
    pub city: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact: String,
}

impl From<RegisterBankRequest> for NewBloodBank {
    fn from(body: RegisterBankRequest) -> Self {
        NewBloodBank {
            name: body.name,
            city: body.city,
            address: body.address,
            contact: body.contact,
        }
    }
}

/// Body of `POST /banks/:id/provision`. Omitted fields mean "all groups" and
/// the configured default.
#[derive(Debug, Default, Deserialize)]
pub struct ProvisionRequest {
    pub blood_groups: Option<Vec<String>>,
    pub default_units: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SetUnitsRequest {
    pub units: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequestRequest {
    pub blood_group: String,
    pub units: i64,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub hospital_name: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: InventoryRecordId,
    pub blood_bank_id: BloodBankId,
    pub blood_group: BloodGroup,
    pub units: u32,
}

impl From<InventoryRecord> for RecordResponse {
    fn from(record: InventoryRecord) -> Self {
        Self {
            id: record.id,
            blood_bank_id: record.blood_bank_id,
            blood_group: record.blood_group,
            units: record.units(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvisionedResponse {
    #[serde(flatten)]
    pub record: RecordResponse,
    pub created: bool,
}

impl From<Provisioned> for ProvisionedResponse {
    fn from(p: Provisioned) -> Self {
        Self {
            record: p.record.into(),
            created: p.created,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisteredBankResponse {
    pub bank: BloodBank,
    pub records: Vec<ProvisionedResponse>,
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub user_id: UserId,
    pub roles: Vec<String>,
    pub is_staff: bool,
}

// -------------------------
// Mapping helpers
// -------------------------

pub fn parse_blood_group(raw: &str) -> Result<BloodGroup, axum::response::Response> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub fn parse_blood_groups(raw: &[String]) -> Result<Vec<BloodGroup>, axum::response::Response> {
    raw.iter().map(|g| parse_blood_group(g)).collect()
}

/// Stock levels are never negative.
pub fn parse_stock_units(units: i64) -> Result<u32, axum::response::Response> {
    u32::try_from(units).map_err(|_| {
        errors::domain_error_to_response(DomainError::validation(format!(
            "units must be between 0 and {}, got {units}",
            u32::MAX
        )))
    })
}
