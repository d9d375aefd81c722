use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use bloodline_core::BloodBankId;
use bloodline_infra::{provision_bank, register_bank};
use bloodline_inventory::BloodGroup;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_bank))
        .route("/:id/provision", post(provision))
}

/// Register a bank and provision every blood group with the default units.
pub async fn create_bank(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterBankRequest>,
) -> axum::response::Response {
    if let Err(e) = principal.require_staff() {
        return errors::forbidden(e);
    }

    match register_bank(&*services.store, body.into(), services.default_units).await {
        Ok((bank, records)) => (
            StatusCode::CREATED,
            Json(dto::RegisteredBankResponse {
                bank,
                records: records.into_iter().map(Into::into).collect(),
            }),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn provision(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::ProvisionRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(e) = principal.require_staff() {
        return errors::forbidden(e);
    }

    let bank_id: BloodBankId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // No body at all means "all groups, configured default"; anything else must parse.
    let body = match body {
        Ok(Json(b)) => b,
        Err(JsonRejection::MissingJsonContentType(_)) => dto::ProvisionRequest::default(),
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let groups = match &body.blood_groups {
        Some(raw) => match dto::parse_blood_groups(raw) {
            Ok(v) => v,
            Err(resp) => return resp,
        },
        None => BloodGroup::ALL.to_vec(),
    };
    let default_units = body.default_units.unwrap_or(services.default_units);

    match provision_bank(&*services.store, bank_id, &groups, default_units).await {
        Ok(records) => Json(serde_json::json!({
            "bank_id": bank_id,
            "records": records
                .into_iter()
                .map(dto::ProvisionedResponse::from)
                .collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
