use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use bloodline_core::DonationRequestId;
use bloodline_infra::{reports, BloodBankStore};
use bloodline_inventory::NewDonationRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit).get(list))
        .route("/pending/count", get(pending_count))
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
}

/// Submit a request on behalf of the caller.
pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::SubmitRequestRequest>,
) -> axum::response::Response {
    let blood_group = match dto::parse_blood_group(&body.blood_group) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let new = NewDonationRequest {
        requester: principal.user_id(),
        blood_group,
        units: body.units,
        city: body.city,
        hospital_name: body.hospital_name,
    };

    match services.reservation.submit_request(new).await {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Staff see every request; everyone else only their own. Newest first.
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let filter = (!principal.is_staff()).then(|| principal.user_id());

    match services.store.list_requests(filter).await {
        Ok(requests) => Json(requests).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn pending_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = principal.require_staff() {
        return errors::forbidden(e);
    }

    match reports::pending_request_count(&*services.store).await {
        Ok(pending) => Json(serde_json::json!({ "pending": pending })).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn approve(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = principal.require_staff() {
        return errors::forbidden(e);
    }

    let request_id: DonationRequestId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.reservation.approve(request_id, principal.user_id()).await {
        Ok(entry) => Json(entry).into_response(),
        Err(e) => errors::approve_error_to_response(e),
    }
}

pub async fn reject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = principal.require_staff() {
        return errors::forbidden(e);
    }

    let request_id: DonationRequestId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.reservation.reject(request_id, principal.user_id()).await {
        Ok(request) => Json(request).into_response(),
        Err(e) => errors::reject_error_to_response(e),
    }
}
