use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::admin_handlers;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/conversions", get(admin_handlers::list_conversions))
        .route("/conversions/:id/retry", post(admin_handlers::retry_conversion))
        .route("/conversions/:id/cancel", post(admin_handlers::cancel_conversion))
}
