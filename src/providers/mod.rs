pub mod airtel;
pub mod mpesa;
