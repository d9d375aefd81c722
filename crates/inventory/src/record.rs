use serde::{Deserialize, Serialize};
use thiserror::Error;

use bloodline_core::{BloodBankId, Entity, InventoryRecordId};

use crate::BloodGroup;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StockError {
    #[error("insufficient stock: requested {requested}, available {available}")]
    Insufficient { requested: u32, available: u32 },
}

/// Units of one blood group held by one bank.
///
/// At most one record exists per {bank, blood group}. `units` is unsigned and
/// only changes through `reserve` (checked) or `set_units`, so it can never go
/// negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: InventoryRecordId,
    pub blood_bank_id: BloodBankId,
    pub blood_group: BloodGroup,
    units: u32,
}

impl InventoryRecord {
    pub fn new(
        id: InventoryRecordId,
        blood_bank_id: BloodBankId,
        blood_group: BloodGroup,
        units: u32,
    ) -> Self {
        Self {
            id,
            blood_bank_id,
            blood_group,
            units,
        }
    }

    pub fn units(&self) -> u32 {
        self.units
    }

    /// Take `units` out of stock. Leaves the record untouched on failure.
    pub fn reserve(&mut self, units: u32) -> Result<(), StockError> {
        let remaining = self
            .units
            .checked_sub(units)
            .ok_or(StockError::Insufficient {
                requested: units,
                available: self.units,
            })?;
        self.units = remaining;
        Ok(())
    }

    /// Overwrite the stock level (staff correction / restock).
    pub fn set_units(&mut self, units: u32) {
        self.units = units;
    }
}

impl Entity for InventoryRecord {
    type Id = InventoryRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(units: u32) -> InventoryRecord {
        InventoryRecord::new(
            InventoryRecordId::new(),
            BloodBankId::new(),
            BloodGroup::ONegative,
            units,
        )
    }

    #[test]
    fn reserve_exact_stock_leaves_zero() {
        let mut r = record(5);
        r.reserve(5).unwrap();
        assert_eq!(r.units(), 0);
    }

    #[test]
    fn over_reservation_is_refused_without_mutation() {
        let mut r = record(5);
        let err = r.reserve(6).unwrap_err();
        assert_eq!(
            err,
            StockError::Insufficient {
                requested: 6,
                available: 5
            }
        );
        assert_eq!(r.units(), 5);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: across any sequence of reservations the record never
        /// underflows, and the units taken equal the successful requests.
        #[test]
        fn reservations_conserve_units(
            start in 0u32..500,
            requests in prop::collection::vec(1u32..100, 0..30)
        ) {
            let mut r = record(start);
            let mut taken: u64 = 0;

            for want in requests {
                let before = r.units();
                match r.reserve(want) {
                    Ok(()) => {
                        prop_assert!(want <= before);
                        prop_assert_eq!(r.units(), before - want);
                        taken += u64::from(want);
                    }
                    Err(StockError::Insufficient { requested, available }) => {
                        prop_assert!(want > before);
                        prop_assert_eq!(requested, want);
                        prop_assert_eq!(available, before);
                        prop_assert_eq!(r.units(), before);
                    }
                }
            }

            prop_assert_eq!(u64::from(r.units()) + taken, u64::from(start));
        }
    }
}
