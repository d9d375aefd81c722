use std::sync::Arc;

use sqlx::PgPool;

use bloodline_infra::store::PostgresStore;
use bloodline_infra::{BloodBankStore, InMemoryStore, ReservationService, StoreError};

pub type DynStore = Arc<dyn BloodBankStore>;

/// Shared handles for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppServices {
    pub store: DynStore,
    pub reservation: Arc<ReservationService<DynStore>>,
    /// Units given to each blood group of a newly provisioned bank.
    pub default_units: u32,
}

impl AppServices {
    pub fn new(store: DynStore, default_units: u32) -> Self {
        Self {
            reservation: Arc::new(ReservationService::new(store.clone())),
            store,
            default_units,
        }
    }

    /// Single-process store; state is lost on restart.
    pub fn in_memory(default_units: u32) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), default_units)
    }

    /// Connect to Postgres and create the schema if needed.
    pub async fn postgres(database_url: &str, default_units: u32) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("connect: {e}")))?;

        let store = PostgresStore::new(pool);
        store.ensure_schema().await?;
        tracing::info!("using Postgres store");

        Ok(Self::new(Arc::new(store), default_units))
    }
}
