pub mod conversion;
pub mod ledger;
pub mod webhooks;
