//! Auto-provisioning of stock records for blood banks.
//!
//! Bank registration calls `provision_bank` directly; there is no save hook.
//! Provisioning is idempotent: it relies on the store's get-or-create on the
//! {bank, blood group} key, so re-running it never duplicates a record or
//! resets an existing stock level.

use tracing::{info, instrument};

use bloodline_core::{BloodBankId, DomainError};
use bloodline_inventory::{BloodBank, BloodGroup, NewBloodBank};

use crate::reservation::ServiceError;
use crate::store::{BloodBankStore, Provisioned};

/// Ensure `bank_id` has a record for each of `blood_groups`, creating missing
/// ones with `default_units`.
///
/// Returns one entry per distinct requested group, in the order given.
#[instrument(skip(store, blood_groups), fields(bank_id = %bank_id, groups = blood_groups.len()), err)]
pub async fn provision_bank<S>(
    store: &S,
    bank_id: BloodBankId,
    blood_groups: &[BloodGroup],
    default_units: u32,
) -> Result<Vec<Provisioned>, ServiceError>
where
    S: BloodBankStore + ?Sized,
{
    if store.bank(bank_id).await?.is_none() {
        return Err(DomainError::not_found().into());
    }

    let mut seen = Vec::with_capacity(blood_groups.len());
    let mut out = Vec::with_capacity(blood_groups.len());
    for &group in blood_groups {
        if seen.contains(&group) {
            continue;
        }
        seen.push(group);
        out.push(store.get_or_create_record(bank_id, group, default_units).await?);
    }

    let created = out.iter().filter(|p| p.created).count();
    info!(created, existing = out.len() - created, "bank provisioned");
    Ok(out)
}

/// Register a bank and provision every blood group with `default_units`.
///
/// The bank insert and the per-group provisioning are separate store calls.
/// If provisioning fails partway the bank is kept with the records created so
/// far; calling [`provision_bank`] again for all groups completes it without
/// touching existing stock.
#[instrument(skip(store, new), fields(name = %new.name), err)]
pub async fn register_bank<S>(
    store: &S,
    new: NewBloodBank,
    default_units: u32,
) -> Result<(BloodBank, Vec<Provisioned>), ServiceError>
where
    S: BloodBankStore + ?Sized,
{
    let bank = BloodBank::register(BloodBankId::new(), new)?;
    store.insert_bank(bank.clone()).await?;
    let records = provision_bank(store, bank.id, &BloodGroup::ALL, default_units).await?;
    Ok((bank, records))
}
