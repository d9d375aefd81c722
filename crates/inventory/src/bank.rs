use serde::{Deserialize, Serialize};

use bloodline_core::{BloodBankId, DomainError, DomainResult, Entity};

/// Input for registering a bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBloodBank {
    pub name: String,
    pub city: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact: String,
}

/// A blood bank. Stock is held in per-group `InventoryRecord`s keyed by this id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodBank {
    pub id: BloodBankId,
    pub name: String,
    pub city: Option<String>,
    pub address: String,
    pub contact: String,
}

impl BloodBank {
    pub fn register(id: BloodBankId, new: NewBloodBank) -> DomainResult<Self> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("bank name cannot be empty"));
        }

        let city = new
            .city
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Self {
            id,
            name: name.to_string(),
            city,
            address: new.address,
            contact: new.contact,
        })
    }
}

impl Entity for BloodBank {
    type Id = BloodBankId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
