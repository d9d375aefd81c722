use axum::{routing::get, Router};

pub mod banks;
pub mod history;
pub mod inventory;
pub mod requests;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/history", get(history::list_history))
        .route("/donors/:id/history", get(history::donor_history))
        .nest("/banks", banks::router())
        .nest("/inventory", inventory::router())
        .nest("/requests", requests::router())
}
