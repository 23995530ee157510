//! Finvoice Core — domain models, persistence traits and the contracts
//! of every external collaborator the workflow engine talks to.

pub mod effects;
pub mod error;
pub mod external;
pub mod models;
pub mod repository;

pub use effects::SideEffects;
pub use error::{FinvoiceError, FinvoiceResult};
