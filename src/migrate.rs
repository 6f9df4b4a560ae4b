// src/migrate.rs
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use crate::errors::Result;
use crate::models::conversion::ConversionRequest;
use crate::models::ledger::LedgerEntry;
use crate::store::mongo::{SystemSetting, LEDGER_COLLECTION, REQUESTS_COLLECTION, SETTINGS_COLLECTION};

/// Unique indexes the engine's atomicity rests on: the reference code and
/// the ledger dedup key. Without these, `record` degrades to read-then-write.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let requests: Collection<ConversionRequest> = db.collection(REQUESTS_COLLECTION);
    requests
        .create_index(
            IndexModel::builder()
                .keys(doc! { "reference_code": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    let ledger: Collection<LedgerEntry> = db.collection(LEDGER_COLLECTION);
    ledger
        .create_index(
            IndexModel::builder()
                .keys(doc! { "provider": 1, "transaction_kind": 1, "external_transaction_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    let settings: Collection<SystemSetting> = db.collection(SETTINGS_COLLECTION);
    settings
        .create_index(
            IndexModel::builder()
                .keys(doc! { "setting_key": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    tracing::info!("✅ Indexes ensured on {}, {}, {}", REQUESTS_COLLECTION, LEDGER_COLLECTION, SETTINGS_COLLECTION);
    Ok(())
}

const DEFAULT_SETTINGS: [(&str, &str, &str); 4] = [
    ("default_conversion_rate", "0.75", "Rate we pay for Safaricom airtime (75%)"),
    ("airtel_conversion_rate", "0.70", "Rate we pay for Airtel airtime (70%)"),
    ("airtime_receive_number", "+254700000000", "Number receiving Safaricom airtime from users"),
    ("airtel_receive_number", "+254730000000", "Number receiving Airtel airtime from users"),
];

/// Insert-if-absent seed so a fresh database serves quotes immediately.
/// Operator-tuned values are never overwritten.
pub async fn seed_default_settings(db: &Database) -> Result<()> {
    let settings: Collection<SystemSetting> = db.collection(SETTINGS_COLLECTION);

    for (key, value, description) in DEFAULT_SETTINGS {
        settings
            .update_one(
                doc! { "setting_key": key },
                doc! { "$setOnInsert": {
                    "setting_key": key,
                    "setting_value": value,
                    "description": description,
                }},
            )
            .upsert(true)
            .await?;
    }

    tracing::info!("✅ Default system settings seeded");
    Ok(())
}
