//! Exchange and routing keys used for workflow notifications.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRoutes {
    pub exchange: String,
    pub user_registered: String,
    pub invoice_uploaded: String,
    pub invoice_status_updated: String,
    pub kyc_status_updated: String,
}

impl Default for EventRoutes {
    fn default() -> Self {
        Self {
            exchange: "invoice_events_exchange".into(),
            user_registered: "user.registered".into(),
            invoice_uploaded: "invoice.uploaded".into(),
            invoice_status_updated: "invoice.status.updated".into(),
            kyc_status_updated: "kyc.status.updated".into(),
        }
    }
}
