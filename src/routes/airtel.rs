use axum::{routing::post, Router};

use crate::handlers::airtel_handlers;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/callback", post(airtel_handlers::airtel_callback))
}
