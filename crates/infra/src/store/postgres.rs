//! Postgres-backed store.
//!
//! Row locking is delegated to the database: an approval runs in one
//! transaction that takes `FOR UPDATE` locks on the request row and on the
//! selected inventory row, so a second approver blocks until the first commits
//! and then reads the decremented units. Dropping the transaction on any error
//! path rolls it back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! Rows that fail to decode into domain values (unknown blood group text,
//! out-of-range units) surface as `Corrupt`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use bloodline_core::{BloodBankId, DonationRequestId, HistoryEntryId, InventoryRecordId, UserId};
use bloodline_inventory::{
    BloodBank, BloodGroup, DonationHistoryEntry, DonationRequest, InventoryRecord, RequestStatus,
    decide_approval,
};

use super::r#trait::{BloodBankStore, Provisioned, StoreError};
use crate::reservation::{ApproveError, RejectError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS blood_banks (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL CHECK (name <> ''),
        city TEXT,
        address TEXT NOT NULL DEFAULT '',
        contact TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS blood_inventory (
        id UUID PRIMARY KEY,
        blood_bank_id UUID NOT NULL REFERENCES blood_banks (id),
        blood_group TEXT NOT NULL,
        units BIGINT NOT NULL CHECK (units >= 0),
        UNIQUE (blood_bank_id, blood_group)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS donation_requests (
        id UUID PRIMARY KEY,
        requester UUID NOT NULL,
        blood_group TEXT NOT NULL,
        units BIGINT NOT NULL CHECK (units > 0),
        city TEXT NOT NULL DEFAULT '',
        hospital_name TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'pending',
        approved_by UUID,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS donation_history (
        id UUID PRIMARY KEY,
        request_id UUID NOT NULL UNIQUE REFERENCES donation_requests (id),
        donor UUID NOT NULL,
        blood_group TEXT NOT NULL,
        units BIGINT NOT NULL CHECK (units > 0),
        blood_bank_id UUID NOT NULL REFERENCES blood_banks (id),
        donated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

const REQUEST_COLUMNS: &str =
    "id, requester, blood_group, units, city, hospital_name, status, approved_by, created_at";

/// Postgres implementation of [`BloodBankStore`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        info!("schema ready");
        Ok(())
    }
}

#[async_trait]
impl BloodBankStore for PostgresStore {
    #[instrument(skip(self, bank), fields(bank_id = %bank.id), err)]
    async fn insert_bank(&self, bank: BloodBank) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO blood_banks (id, name, city, address, contact)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*bank.id.as_uuid())
        .bind(&bank.name)
        .bind(&bank.city)
        .bind(&bank.address)
        .bind(&bank.contact)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_bank", e))?;
        Ok(())
    }

    async fn bank(&self, id: BloodBankId) -> Result<Option<BloodBank>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, city, address, contact FROM blood_banks WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("bank", e))?;

        row.map(|row| decode::<BankRow>(&row).map(BloodBank::from))
            .transpose()
    }

    #[instrument(skip(self), fields(bank_id = %bank_id, blood_group = %blood_group), err)]
    async fn get_or_create_record(
        &self,
        bank_id: BloodBankId,
        blood_group: BloodGroup,
        default_units: u32,
    ) -> Result<Provisioned, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO blood_inventory (id, blood_bank_id, blood_group, units)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (blood_bank_id, blood_group) DO NOTHING
            RETURNING id, blood_bank_id, blood_group, units
            "#,
        )
        .bind(*InventoryRecordId::new().as_uuid())
        .bind(*bank_id.as_uuid())
        .bind(blood_group.as_str())
        .bind(i64::from(default_units))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_or_create_record", e))?;

        if let Some(row) = inserted {
            return Ok(Provisioned {
                record: InventoryRecord::try_from(decode::<RecordRow>(&row)?)?,
                created: true,
            });
        }

        let row = sqlx::query(
            r#"
            SELECT id, blood_bank_id, blood_group, units
            FROM blood_inventory
            WHERE blood_bank_id = $1 AND blood_group = $2
            "#,
        )
        .bind(*bank_id.as_uuid())
        .bind(blood_group.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_or_create_record", e))?;

        Ok(Provisioned {
            record: InventoryRecord::try_from(decode::<RecordRow>(&row)?)?,
            created: false,
        })
    }

    async fn record(&self, id: InventoryRecordId) -> Result<Option<InventoryRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, blood_bank_id, blood_group, units FROM blood_inventory WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record", e))?;

        row.map(|row| InventoryRecord::try_from(decode::<RecordRow>(&row)?))
            .transpose()
    }

    async fn list_records(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.blood_bank_id, i.blood_group, i.units, b.name AS bank_name
            FROM blood_inventory i
            JOIN blood_banks b ON b.id = i.blood_bank_id
            ORDER BY b.name, b.id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_records", e))?;

        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let bank_name: String = row
                .try_get("bank_name")
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let record: InventoryRecord = InventoryRecord::try_from(decode::<RecordRow>(&row)?)?;
            keyed.push((bank_name, record));
        }
        // Group text does not sort in enum order, so finish the ordering here.
        keyed.sort_by(|(na, a), (nb, b)| {
            na.cmp(nb)
                .then_with(|| a.blood_bank_id.cmp(&b.blood_bank_id))
                .then_with(|| a.blood_group.cmp(&b.blood_group))
        });
        Ok(keyed.into_iter().map(|(_, r)| r).collect())
    }

    #[instrument(skip(self), fields(record_id = %id, units), err)]
    async fn set_units(
        &self,
        id: InventoryRecordId,
        units: u32,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        // The row lock taken by UPDATE serializes this with in-flight approvals.
        let row = sqlx::query(
            r#"
            UPDATE blood_inventory SET units = $2 WHERE id = $1
            RETURNING id, blood_bank_id, blood_group, units
            "#,
        )
        .bind(*id.as_uuid())
        .bind(i64::from(units))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_units", e))?;

        row.map(|row| InventoryRecord::try_from(decode::<RecordRow>(&row)?))
            .transpose()
    }

    #[instrument(skip(self, request), fields(request_id = %request.id), err)]
    async fn insert_request(&self, request: DonationRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO donation_requests
                (id, requester, blood_group, units, city, hospital_name, status, approved_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*request.id.as_uuid())
        .bind(*request.requester.as_uuid())
        .bind(request.blood_group.as_str())
        .bind(i64::from(request.units()))
        .bind(&request.city)
        .bind(&request.hospital_name)
        .bind(request.status().as_str())
        .bind(request.approved_by().map(Uuid::from))
        .bind(request.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;
        Ok(())
    }

    async fn request(&self, id: DonationRequestId) -> Result<Option<DonationRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM donation_requests WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("request", e))?;

        row.map(|row| DonationRequest::try_from(decode::<RequestRow>(&row)?))
            .transpose()
    }

    async fn list_requests(
        &self,
        requester: Option<UserId>,
    ) -> Result<Vec<DonationRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM donation_requests
            WHERE $1::uuid IS NULL OR requester = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(requester.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_requests", e))?;

        rows.iter()
            .map(|row| DonationRequest::try_from(decode::<RequestRow>(row)?))
            .collect()
    }

    async fn count_requests(&self, status: RequestStatus) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM donation_requests WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_requests", e))?;

        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count {count}")))
    }

    #[instrument(skip(self), fields(request_id = %request_id, approver = %approver), err)]
    async fn commit_approval(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
        entry_id: HistoryEntryId,
        approved_at: DateTime<Utc>,
    ) -> Result<DonationHistoryEntry, ApproveError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let request = lock_request(&mut tx, request_id)
            .await?
            .ok_or(ApproveError::NotFound)?;
        request.ensure_pending()?;

        let record = lock_first_record(&mut tx, request.blood_group).await?;
        let approval = decide_approval(&request, record.as_ref(), approver, entry_id, approved_at)?;

        sqlx::query("UPDATE blood_inventory SET units = $2 WHERE id = $1")
            .bind(*approval.record.id.as_uuid())
            .bind(i64::from(approval.record.units()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("decrement_units", e))?;

        sqlx::query("UPDATE donation_requests SET status = $2, approved_by = $3 WHERE id = $1")
            .bind(*request_id.as_uuid())
            .bind(approval.request.status().as_str())
            .bind(*approver.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("mark_approved", e))?;

        let entry = approval.entry;
        sqlx::query(
            r#"
            INSERT INTO donation_history
                (id, request_id, donor, blood_group, units, blood_bank_id, donated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.request_id.as_uuid())
        .bind(*entry.donor.as_uuid())
        .bind(entry.blood_group.as_str())
        .bind(i64::from(entry.units))
        .bind(*entry.blood_bank_id.as_uuid())
        .bind(entry.donated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_history", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(entry)
    }

    #[instrument(skip(self), fields(request_id = %request_id, approver = %approver), err)]
    async fn commit_rejection(
        &self,
        request_id: DonationRequestId,
        approver: UserId,
    ) -> Result<DonationRequest, RejectError> {
        let updated = sqlx::query(&format!(
            r#"
            UPDATE donation_requests
            SET status = 'rejected', approved_by = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(*request_id.as_uuid())
        .bind(*approver.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reject", e))?;

        if let Some(row) = updated {
            return Ok(DonationRequest::try_from(decode::<RequestRow>(&row)?)?);
        }

        // No row changed: either the id is unknown or the request is settled.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM donation_requests WHERE id = $1")
                .bind(*request_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("reject", e))?;

        match status {
            None => Err(RejectError::NotFound),
            Some(text) => Err(RejectError::AlreadyProcessed(parse_status(&text)?)),
        }
    }

    async fn history(&self, donor: Option<UserId>) -> Result<Vec<DonationHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, donor, blood_group, units, blood_bank_id, donated_at
            FROM donation_history
            WHERE $1::uuid IS NULL OR donor = $1
            ORDER BY donated_at DESC, id DESC
            "#,
        )
        .bind(donor.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter()
            .map(|row| DonationHistoryEntry::try_from(decode::<HistoryRow>(row)?))
            .collect()
    }
}

async fn lock_request(
    tx: &mut Transaction<'_, Postgres>,
    id: DonationRequestId,
) -> Result<Option<DonationRequest>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS} FROM donation_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(*id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_request", e))?;

    row.map(|row| DonationRequest::try_from(decode::<RequestRow>(&row)?))
        .transpose()
}

/// Lock the first record of `blood_group` by bank name, then bank id.
async fn lock_first_record(
    tx: &mut Transaction<'_, Postgres>,
    blood_group: BloodGroup,
) -> Result<Option<InventoryRecord>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT i.id, i.blood_bank_id, i.blood_group, i.units
        FROM blood_inventory i
        JOIN blood_banks b ON b.id = i.blood_bank_id
        WHERE i.blood_group = $1
        ORDER BY b.name, b.id
        LIMIT 1
        FOR UPDATE OF i
        "#,
    )
    .bind(blood_group.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_record", e))?;

    row.map(|row| InventoryRecord::try_from(decode::<RecordRow>(&row)?))
        .transpose()
}

fn decode<'r, T: FromRow<'r, PgRow>>(row: &'r PgRow) -> Result<T, StoreError> {
    T::from_row(row).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn parse_group(text: &str) -> Result<BloodGroup, StoreError> {
    text.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown blood group {text:?}")))
}

fn parse_status(text: &str) -> Result<RequestStatus, StoreError> {
    text.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown request status {text:?}")))
}

fn parse_units(units: i64) -> Result<u32, StoreError> {
    u32::try_from(units).map_err(|_| StoreError::Corrupt(format!("units out of range: {units}")))
}

struct BankRow {
    id: Uuid,
    name: String,
    city: Option<String>,
    address: String,
    contact: String,
}

impl<'r> FromRow<'r, PgRow> for BankRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BankRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            city: row.try_get("city")?,
            address: row.try_get("address")?,
            contact: row.try_get("contact")?,
        })
    }
}

impl From<BankRow> for BloodBank {
    fn from(row: BankRow) -> Self {
        BloodBank {
            id: BloodBankId::from_uuid(row.id),
            name: row.name,
            city: row.city,
            address: row.address,
            contact: row.contact,
        }
    }
}

struct RecordRow {
    id: Uuid,
    blood_bank_id: Uuid,
    blood_group: String,
    units: i64,
}

impl<'r> FromRow<'r, PgRow> for RecordRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RecordRow {
            id: row.try_get("id")?,
            blood_bank_id: row.try_get("blood_bank_id")?,
            blood_group: row.try_get("blood_group")?,
            units: row.try_get("units")?,
        })
    }
}

impl TryFrom<RecordRow> for InventoryRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(InventoryRecord::new(
            InventoryRecordId::from_uuid(row.id),
            BloodBankId::from_uuid(row.blood_bank_id),
            parse_group(&row.blood_group)?,
            parse_units(row.units)?,
        ))
    }
}

struct RequestRow {
    id: Uuid,
    requester: Uuid,
    blood_group: String,
    units: i64,
    city: String,
    hospital_name: String,
    status: String,
    approved_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RequestRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RequestRow {
            id: row.try_get("id")?,
            requester: row.try_get("requester")?,
            blood_group: row.try_get("blood_group")?,
            units: row.try_get("units")?,
            city: row.try_get("city")?,
            hospital_name: row.try_get("hospital_name")?,
            status: row.try_get("status")?,
            approved_by: row.try_get("approved_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<RequestRow> for DonationRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(DonationRequest::rehydrate(
            DonationRequestId::from_uuid(row.id),
            UserId::from_uuid(row.requester),
            parse_group(&row.blood_group)?,
            parse_units(row.units)?,
            row.city,
            row.hospital_name,
            parse_status(&row.status)?,
            row.approved_by.map(UserId::from_uuid),
            row.created_at,
        ))
    }
}

struct HistoryRow {
    id: Uuid,
    request_id: Uuid,
    donor: Uuid,
    blood_group: String,
    units: i64,
    blood_bank_id: Uuid,
    donated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for HistoryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(HistoryRow {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            donor: row.try_get("donor")?,
            blood_group: row.try_get("blood_group")?,
            units: row.try_get("units")?,
            blood_bank_id: row.try_get("blood_bank_id")?,
            donated_at: row.try_get("donated_at")?,
        })
    }
}

impl TryFrom<HistoryRow> for DonationHistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(DonationHistoryEntry {
            id: HistoryEntryId::from_uuid(row.id),
            request_id: DonationRequestId::from_uuid(row.request_id),
            donor: UserId::from_uuid(row.donor),
            blood_group: parse_group(&row.blood_group)?,
            units: parse_units(row.units)?,
            blood_bank_id: BloodBankId::from_uuid(row.blood_bank_id),
            donated_at: row.donated_at,
        })
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
