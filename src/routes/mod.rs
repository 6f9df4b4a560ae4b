pub mod admin;
pub mod airtel;
pub mod conversion;
pub mod mpesa;
