//! Finvoice Workflow — the KYC approval gate and the invoice lifecycle
//! state machine, with the ledger posting and notifications each
//! transition produces.

pub mod config;
pub mod error;
pub mod invoice;
pub mod kyc;
pub mod transition;

pub use config::EventRoutes;
pub use error::{WorkflowError, WorkflowResult};
pub use invoice::{
    ExtractedInvoiceData, InvoiceService, InvoiceUpload, StatusUpdate, UploadedFile,
};
pub use kyc::{KycDecision, KycService};
