//! SurrealDB repository implementations.

mod audit;
mod invoice;
mod kv;
mod kyc;
mod ledger;
mod staff;
mod user;

pub use audit::SurrealAuditLogRepository;
pub use invoice::SurrealInvoiceRepository;
pub use kv::SurrealKeyValueStore;
pub use kyc::SurrealKycRepository;
pub use ledger::SurrealLedgerRepository;
pub use staff::SurrealStaffRepository;
pub use user::SurrealUserRepository;
