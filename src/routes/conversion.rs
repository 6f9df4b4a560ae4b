use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::conversion_handlers;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(conversion_handlers::create_conversion))
        .route("/status/:reference", get(conversion_handlers::get_conversion_status))
}
