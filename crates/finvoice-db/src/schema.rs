//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Business users
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD first_name ON TABLE user TYPE string;
DEFINE FIELD last_name ON TABLE user TYPE string;
DEFINE FIELD company_name ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD is_active ON TABLE user TYPE bool DEFAULT true;
DEFINE FIELD two_factor_enabled ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;

-- =======================================================================
-- Back-office staff
-- =======================================================================
DEFINE TABLE staff SCHEMAFULL;
DEFINE FIELD email ON TABLE staff TYPE string;
DEFINE FIELD first_name ON TABLE staff TYPE string;
DEFINE FIELD last_name ON TABLE staff TYPE string;
DEFINE FIELD password_hash ON TABLE staff TYPE string;
DEFINE FIELD position ON TABLE staff TYPE string;
DEFINE FIELD is_active ON TABLE staff TYPE bool DEFAULT true;
DEFINE FIELD last_login_at ON TABLE staff TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE staff TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE staff TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_staff_email ON TABLE staff COLUMNS email UNIQUE;

-- =======================================================================
-- KYC records (record key = owner id, one per user)
-- =======================================================================
DEFINE TABLE kyc_record SCHEMAFULL;
DEFINE FIELD kyc_id ON TABLE kyc_record TYPE string;
DEFINE FIELD owner_id ON TABLE kyc_record TYPE string;
DEFINE FIELD status ON TABLE kyc_record TYPE string \
    ASSERT $value IN ['pending', 'approved', 'rejected', \
    'resubmit_required'];
DEFINE FIELD submitted_at ON TABLE kyc_record TYPE option<datetime>;
DEFINE FIELD reviewed_at ON TABLE kyc_record TYPE option<datetime>;
DEFINE FIELD reviewer_id ON TABLE kyc_record TYPE option<string>;
DEFINE FIELD rejection_reason ON TABLE kyc_record TYPE option<string>;
DEFINE FIELD documents_info ON TABLE kyc_record TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD created_at ON TABLE kyc_record TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE kyc_record TYPE datetime \
    DEFAULT time::now();

-- =======================================================================
-- Invoices (decimals stored as canonical strings)
-- =======================================================================
DEFINE TABLE invoice SCHEMAFULL;
DEFINE FIELD owner_id ON TABLE invoice TYPE string;
DEFINE FIELD status ON TABLE invoice TYPE string \
    ASSERT $value IN ['pending_review', 'approved', 'rejected', \
    'disbursed', 'repayment_pending', 'repaid'];
DEFINE FIELD invoice_number ON TABLE invoice TYPE option<string>;
DEFINE FIELD amount ON TABLE invoice TYPE string;
DEFINE FIELD currency ON TABLE invoice TYPE string;
DEFINE FIELD due_date ON TABLE invoice TYPE option<string>;
DEFINE FIELD debtor_name ON TABLE invoice TYPE option<string>;
DEFINE FIELD issuer_name ON TABLE invoice TYPE option<string>;
DEFINE FIELD original_file_path ON TABLE invoice TYPE string;
DEFINE FIELD financing_fee_percentage ON TABLE invoice \
    TYPE option<string>;
DEFINE FIELD financed_amount ON TABLE invoice TYPE option<string>;
DEFINE FIELD approved_by_id ON TABLE invoice TYPE option<string>;
DEFINE FIELD approved_at ON TABLE invoice TYPE option<datetime>;
DEFINE FIELD disbursed_by_id ON TABLE invoice TYPE option<string>;
DEFINE FIELD disbursed_at ON TABLE invoice TYPE option<datetime>;
DEFINE FIELD receipt_path ON TABLE invoice TYPE option<string>;
DEFINE FIELD rejection_reason ON TABLE invoice TYPE option<string>;
DEFINE FIELD uploaded_at ON TABLE invoice TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE invoice TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD version ON TABLE invoice TYPE int DEFAULT 0;
DEFINE INDEX idx_invoice_owner ON TABLE invoice COLUMNS owner_id;
DEFINE INDEX idx_invoice_status ON TABLE invoice COLUMNS status;

-- =======================================================================
-- Ledger (append-only)
-- =======================================================================
DEFINE TABLE ledger_transaction SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD invoice_id ON TABLE ledger_transaction TYPE string;
DEFINE FIELD kind ON TABLE ledger_transaction TYPE string \
    ASSERT $value IN ['disbursement', 'repayment'];
DEFINE FIELD amount ON TABLE ledger_transaction TYPE string;
DEFINE FIELD occurred_at ON TABLE ledger_transaction TYPE datetime;
DEFINE FIELD reference_id ON TABLE ledger_transaction \
    TYPE option<string>;
DEFINE INDEX idx_ledger_invoice ON TABLE ledger_transaction \
    COLUMNS invoice_id;

-- =======================================================================
-- Audit Log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD actor_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD subject_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD details ON TABLE audit_log TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD source_ip ON TABLE audit_log TYPE option<string>;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_time ON TABLE audit_log COLUMNS timestamp;
DEFINE INDEX idx_audit_actor ON TABLE audit_log COLUMNS actor_id;
DEFINE INDEX idx_audit_subject ON TABLE audit_log COLUMNS subject_id;

-- =======================================================================
-- Key-value entries with expiry (record key = entry key)
-- =======================================================================
DEFINE TABLE kv_entry SCHEMAFULL;
DEFINE FIELD value ON TABLE kv_entry TYPE string;
DEFINE FIELD expires_at ON TABLE kv_entry TYPE datetime;
DEFINE INDEX idx_kv_expires ON TABLE kv_entry COLUMNS expires_at;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
