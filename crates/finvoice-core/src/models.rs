//! Domain models for the invoice-financing backend.
//!
//! These are the core types shared across all crates.

pub mod account;
pub mod audit;
pub mod invoice;
pub mod kyc;
pub mod ledger;
