pub mod admin_handlers;
pub mod airtel_handlers;
pub mod conversion_handlers;
pub mod mpesa_handlers;
