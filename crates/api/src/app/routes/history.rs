use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    Json,
};

use bloodline_core::UserId;
use bloodline_infra::{reports, BloodBankStore};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Staff see the whole ledger; everyone else only their own donations.
pub async fn list_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let donor = (!principal.is_staff()).then(|| principal.user_id());

    match services.store.history(donor).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn donor_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let donor: UserId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = principal.require_self_or_staff(donor) {
        return errors::forbidden(e);
    }

    match reports::donor_history(&*services.store, donor).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
