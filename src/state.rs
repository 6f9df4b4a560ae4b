use std::sync::Arc;

use mongodb::Database;

use crate::engine::ConversionEngine;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<ConversionEngine>,
    pub admin_token: String,
}

impl AppState {
    pub fn new(db: Database, engine: Arc<ConversionEngine>, admin_token: String) -> Self {
        AppState {
            db,
            engine,
            admin_token,
        }
    }
}
