use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use bloodline_core::InventoryRecordId;
use bloodline_infra::{reports, BloodBankStore};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_inventory))
        .route("/summary", get(summary))
        .route("/:id", put(set_units))
}

/// Every stock record, ordered by bank name then blood group.
pub async fn list_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = principal.require_staff() {
        return errors::forbidden(e);
    }

    match services.store.list_records().await {
        Ok(records) => Json(
            records
                .into_iter()
                .map(dto::RecordResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Units per blood group across all banks.
pub async fn summary(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match reports::inventory_by_group(&*services.store).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn set_units(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetUnitsRequest>,
) -> axum::response::Response {
    if let Err(e) = principal.require_staff() {
        return errors::forbidden(e);
    }

    let record_id: InventoryRecordId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let units = match dto::parse_stock_units(body.units) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.reservation.set_units(record_id, units).await {
        Ok(record) => Json(dto::RecordResponse::from(record)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
