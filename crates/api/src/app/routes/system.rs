use axum::{extract::Extension, http::StatusCode, Json};

use crate::app::dto::WhoAmIResponse;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        user_id: principal.user_id(),
        roles: principal.roles().iter().map(|r| r.to_string()).collect(),
        is_staff: principal.is_staff(),
    })
}
