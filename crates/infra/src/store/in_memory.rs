use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bloodline_core::{
    BloodBankId, DonationRequestId, Entity, HistoryEntryId, InventoryRecordId, UserId,
};
use bloodline_inventory::{
    BloodBank, BloodGroup, DonationHistoryEntry, DonationRequest, InventoryRecord, RequestStatus,
    decide_approval,
};

use super::r#trait::{BloodBankStore, Provisioned, StoreError};
use crate::ledger::DonationLedger;
use crate::reservation::{ApproveError, RejectError};

type RecordSlot = Arc<Mutex<InventoryRecord>>;

#[derive(Debug, Default)]
struct RecordTable {
    slots: HashMap<InventoryRecordId, RecordSlot>,
    by_key: HashMap<(BloodBankId, BloodGroup), InventoryRecordId>,
}

/// In-memory store for a single process.
///
/// Every inventory record sits behind its own `Mutex`: that mutex is the
/// row lock. Lock order is always record → requests → ledger; table-level
/// locks (`banks`, `records`) are only held briefly and never while waiting on
/// a record.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    banks: RwLock<HashMap<BloodBankId, BloodBank>>,
    records: RwLock<RecordTable>,
    requests: RwLock<HashMap<DonationRequestId, DonationRequest>>,
    ledger: Mutex<DonationLedger>,
}

fn poisoned<T>(what: &'static str) -> impl FnOnce(std::sync::PoisonError<T>) -> StoreError {
    move |_| StoreError::Poisoned(what)
}

/// Insert `entity` under its id unless that id is taken.
fn insert_new<E: Entity>(
    table: &mut HashMap<E::Id, E>,
    entity: E,
    what: &str,
) -> Result<(), StoreError> {
    match table.entry(*entity.id()) {
        Entry::Occupied(slot) => Err(StoreError::Duplicate(format!("{what} {:?}", slot.key()))),
        Entry::Vacant(slot) => {
            slot.insert(entity);
            Ok(())
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bank_names(&self) -> Result<HashMap<BloodBankId, String>, StoreError> {
        let banks = self.banks.read().map_err(poisoned("banks"))?;
        Ok(banks.iter().map(|(id, b)| (*id, b.name.clone())).collect())
    }

    fn slot(&self, id: InventoryRecordId) -> Result<Option<RecordSlot>, StoreError> {
        let records = self.records.read().map_err(poisoned("records"))?;
        Ok(records.slots.get(&id).cloned())
    }

    /// First record holding `blood_group`, by bank name then bank id.
    fn first_slot_for(&self, blood_group: BloodGroup) -> Result<Option<RecordSlot>, StoreError> {
        let names = self.bank_names()?;
        let records = self.records.read().map_err(poisoned("records"))?;

        let chosen = records
            .by_key
            .iter()
            .filter(|((_, group), _)| *group == blood_group)
            .min_by(|((a, _), _), ((b, _), _)| {
                let name_a = names.get(a).map(String::as_str).unwrap_or_default();
                let name_b = names.get(b).map(String::as_str).unwrap_or_default();
                name_a.cmp(name_b).then_with(|| a.cmp(b))
            })
            .and_then(|(_, id)| records.slots.get(id).cloned());

        Ok(chosen)
    }

    fn insert_bank_sync(&self, bank: BloodBank) -> Result<(), StoreError> {
        let mut banks = self.banks.write().map_err(poisoned("banks"))?;
        insert_new(&mut *banks, bank, "blood bank")
    }

    fn get_or_create_record_sync(
        &self,
        bank_id: BloodBankId,
        blood_group: BloodGroup,
        default_units: u32,
    ) -> Result<Provisioned, StoreError> {
        let mut records = self.records.write().map_err(poisoned("records"))?;

        if let Some(id) = records.by_key.get(&(bank_id, blood_group)).copied() {
            let slot = records
                .slots
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::Corrupt(format!("record index points at missing {id}")))?;
            // Release the table before waiting on the row.
            drop(records);
            let record = slot.lock().map_err(poisoned("inventory record"))?.clone();
            return Ok(Provisioned {
                record,
                created: false,
            });
        }

        let record = InventoryRecord::new(InventoryRecordId::new(), bank_id, blood_group, default_units);
        records.by_key.insert((bank_id, blood_group), record.id);
        records
            .slots
            .insert(record.id, Arc::new(Mutex::new(record.clone())));

        Ok(Provisioned {
            record,
            created: true,
        })
    }

    fn list_records_sync(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let names = self.bank_names()?;
        let slots: Vec<RecordSlot> = {
            let records = self.records.read().map_err(poisoned("records"))?;
            records.slots.values().cloned().collect()
        };

        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.lock().map_err(poisoned("inventory record"))?.clone());
        }

        out.sort_by(|a, b| {
            let name_a = names.get(&a.blood_bank_id).map(String::as_str).unwrap_or_default();
            let name_b = names.get(&b.blood_bank_id).map(String::as_str).unwrap_or_default();
            name_a
                .cmp(name_b)
                .then_with(|| a.blood_bank_id.cmp(&b.blood_bank_id))
                .then_with(|| a.blood_group.cmp(&b.blood_group))
        });
        Ok(out)
    }

    fn set_units_sync(
        &self,
        id: InventoryRecordId,
        units: u32,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let mut record = slot.lock().map_err(poisoned("inventory record"))?;
        record.set_units(units);
        Ok(Some(record.clone()))
    }

    fn insert_request_sync(&self, request: DonationRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().map_err(poisoned("requests"))?;
        insert_new(&mut *requests, request, "donation request")
    }

    fn list_requests_sync(&self, requester: Option<UserId>) -> Result<Vec<DonationRequest>, StoreError> {
        let requests = self.requests.read().map_err(poisoned("requests"))?;
        let mut out: Vec<DonationRequest> = requests
            .values()
            .filter(|r| requester.is_none_or(|u| r.requester == u))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(out)
    }

    /// The approval unit.
    ///
    /// All fallible steps (lookups, lock acquisition, the domain decision) run
    /// before the first write; the three writes that follow cannot fail, so an
    /// approval lands completely or not at all.
    fn commit_approval_sync(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
        entry_id: HistoryEntryId,
        approved_at: DateTime<Utc>,
    ) -> Result<DonationHistoryEntry, ApproveError> {
        let blood_group = {
            let requests = self.requests.read().map_err(poisoned("requests"))?;
            let request = requests.get(&request_id).ok_or(ApproveError::NotFound)?;
            request.ensure_pending()?;
            request.blood_group
        };

        let slot = self.first_slot_for(blood_group)?;
        let mut record = match &slot {
            Some(slot) => Some(slot.lock().map_err(poisoned("inventory record"))?),
            None => None,
        };

        let mut requests = self.requests.write().map_err(poisoned("requests"))?;
        let mut ledger = self.ledger.lock().map_err(poisoned("ledger"))?;

        // Re-read under the locks: another approver may have won the race.
        let request = requests.get(&request_id).ok_or(ApproveError::NotFound)?;
        let approval = decide_approval(request, record.as_deref(), approver, entry_id, approved_at)?;

        if let Some(record) = record.as_mut() {
            **record = approval.record;
        }
        requests.insert(request_id, approval.request);
        ledger.append(approval.entry.clone());

        Ok(approval.entry)
    }

    fn commit_rejection_sync(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
    ) -> Result<DonationRequest, RejectError> {
        let mut requests = self.requests.write().map_err(poisoned("requests"))?;
        let request = requests.get_mut(&request_id).ok_or(RejectError::NotFound)?;
        request.reject(approver)?;
        Ok(request.clone())
    }
}

#[async_trait]
impl BloodBankStore for InMemoryStore {
    async fn insert_bank(&self, bank: BloodBank) -> Result<(), StoreError> {
        self.insert_bank_sync(bank)
    }

    async fn bank(&self, id: BloodBankId) -> Result<Option<BloodBank>, StoreError> {
        let banks = self.banks.read().map_err(poisoned("banks"))?;
        Ok(banks.get(&id).cloned())
    }

    async fn get_or_create_record(
        &self,
        bank_id: BloodBankId,
        blood_group: BloodGroup,
        default_units: u32,
    ) -> Result<Provisioned, StoreError> {
        self.get_or_create_record_sync(bank_id, blood_group, default_units)
    }

    async fn record(&self, id: InventoryRecordId) -> Result<Option<InventoryRecord>, StoreError> {
        match self.slot(id)? {
            Some(slot) => Ok(Some(slot.lock().map_err(poisoned("inventory record"))?.clone())),
            None => Ok(None),
        }
    }

    async fn list_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        self.list_records_sync()
    }

    async fn set_units(
        &self,
        id: InventoryRecordId,
        units: u32,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        self.set_units_sync(id, units)
    }

    async fn insert_request(&self, request: DonationRequest) -> Result<(), StoreError> {
        self.insert_request_sync(request)
    }

    async fn request(&self, id: DonationRequestId) -> Result<Option<DonationRequest>, StoreError> {
        let requests = self.requests.read().map_err(poisoned("requests"))?;
        Ok(requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        requester: Option<UserId>,
    ) -> Result<Vec<DonationRequest>, StoreError> {
        self.list_requests_sync(requester)
    }

    async fn count_requests(&self, status: RequestStatus) -> Result<u64, StoreError> {
        let requests = self.requests.read().map_err(poisoned("requests"))?;
        Ok(requests.values().filter(|r| r.status() == status).count() as u64)
    }

    async fn commit_approval(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
        entry_id: HistoryEntryId,
        approved_at: DateTime<Utc>,
    ) -> Result<DonationHistoryEntry, ApproveError> {
        self.commit_approval_sync(request_id, approver, entry_id, approved_at)
    }

    async fn commit_rejection(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
    ) -> Result<DonationRequest, RejectError> {
        self.commit_rejection_sync(request_id, approver)
    }

    async fn history(&self, donor: Option<UserId>) -> Result<Vec<DonationHistoryEntry>, StoreError> {
        let ledger = self.ledger.lock().map_err(poisoned("ledger"))?;
        Ok(ledger.newest_first(donor))
    }
}
