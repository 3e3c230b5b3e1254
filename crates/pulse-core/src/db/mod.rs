//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `organizations` - Organizations and the audit log
//! - `money` - Accounts, movements and budget lines
//! - `sales` - Customers, invoices and quotes
//! - `people` - Team members, leave requests and payroll runs
//! - `inventory` - Stock items
//! - `states` - Per-organization state and the transactional cycle commit
//! - `insights` - Insight listing, lifecycle and retention
//! - `predictions` - Forecast records and accuracy backfill
//! - `actions` - Action records, status compare-and-set, learned patterns
//!
//! Every query is scoped by `organization_id`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod actions;
mod insights;
mod inventory;
mod money;
mod organizations;
mod people;
mod predictions;
mod sales;
mod states;

pub use actions::ActionUpdate;
pub use money::{movement_hash, MovementFilter, MovementInsert, PeriodTotals};
pub use sales::{InvoiceSummary, NewInvoice};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

type CycleLocks = Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "PULSE_DB_KEY";

/// Milliseconds a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"pulse-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a `YYYY-MM-DD` column
pub(crate) fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a text column holding a string-backed enum
pub(crate) fn parse_text<T: std::str::FromStr<Err = String>>(
    idx: usize,
    s: &str,
) -> rusqlite::Result<T> {
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Parse a JSON text column, tolerating legacy empty values
pub(crate) fn parse_json<T: serde::de::DeserializeOwned + Default>(s: Option<String>) -> T {
    s.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Per-organization cycle locks, shared by every clone
    cycle_locks: CycleLocks,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `PULSE_DB_KEY` environment variable to be set. The database is
    /// encrypted using SQLCipher with a key derived from the passphrase via Argon2.
    ///
    /// Returns an error if `PULSE_DB_KEY` is not set. Use `new_unencrypted()`
    /// for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = passphrase
            .map(derive_key)
            .transpose()?
            .map(|key| format!("PRAGMA key = 'x\"{}\"';", key));

        // Key first (SQLCipher requires it before any other statement), then lock waits
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
            cycle_locks: CycleLocks::default(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "pulse_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Lock serializing decision cycles for one organization
    pub fn cycle_lock(&self, organization_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.cycle_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(organization_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the cycle writer
            PRAGMA journal_mode = WAL;
            PRAGMA cache_size = 2000;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Organizations (personalization preferences)
            CREATE TABLE IF NOT EXISTS organizations (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                currency TEXT NOT NULL DEFAULT 'USD',
                tone TEXT NOT NULL DEFAULT 'friendly',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- ===== Money =====
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                balance REAL NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_org ON accounts(organization_id);

            CREATE TABLE IF NOT EXISTS movements (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                account_id INTEGER REFERENCES accounts(id),
                date DATE NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL,                    -- always positive
                direction TEXT NOT NULL CHECK (direction IN ('income', 'expense')),
                category TEXT,                           -- NULL = uncategorized
                import_hash TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(organization_id, import_hash)
            );
            CREATE INDEX IF NOT EXISTS idx_movements_org_date ON movements(organization_id, date);
            CREATE INDEX IF NOT EXISTS idx_movements_org_category ON movements(organization_id, category);

            CREATE TABLE IF NOT EXISTS budget_lines (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                period_start DATE NOT NULL,
                period_end DATE NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_budget_lines_org ON budget_lines(organization_id);

            -- ===== Sales =====
            CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                name TEXT NOT NULL COLLATE NOCASE,
                email TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(organization_id, name)
            );

            CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                number TEXT NOT NULL,
                description TEXT,
                amount REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',    -- draft, sent, paid, cancelled
                issue_date DATE NOT NULL,
                due_date DATE NOT NULL,
                paid_date DATE,
                reminders_sent INTEGER NOT NULL DEFAULT 0,
                last_reminder_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_invoices_org_status ON invoices(organization_id, status);

            CREATE TABLE IF NOT EXISTS quotes (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                amount REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',     -- open, accepted, declined
                issued_date DATE NOT NULL,
                follow_ups INTEGER NOT NULL DEFAULT 0,
                last_follow_up_at DATETIME
            );
            CREATE INDEX IF NOT EXISTS idx_quotes_org_status ON quotes(organization_id, status);

            -- ===== People =====
            CREATE TABLE IF NOT EXISTS team_members (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                role TEXT,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS leave_requests (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                member_id INTEGER NOT NULL REFERENCES team_members(id),
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'   -- pending, approved, rejected
            );
            CREATE INDEX IF NOT EXISTS idx_leave_org_status ON leave_requests(organization_id, status);

            CREATE TABLE IF NOT EXISTS payroll_runs (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                pay_date DATE NOT NULL,
                amount REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'scheduled' -- scheduled, paid
            );
            CREATE INDEX IF NOT EXISTS idx_payroll_org_date ON payroll_runs(organization_id, pay_date);

            -- ===== Inventory =====
            CREATE TABLE IF NOT EXISTS stock_items (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                sku TEXT,
                quantity REAL NOT NULL DEFAULT 0,
                reorder_level REAL NOT NULL DEFAULT 0,
                unit_cost REAL NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_stock_org ON stock_items(organization_id);

            -- ===== Engine =====

            -- One current state per organization
            CREATE TABLE IF NOT EXISTS states (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL UNIQUE,
                focus_area TEXT NOT NULL DEFAULT 'overview',
                urgency REAL NOT NULL DEFAULT 0,
                context TEXT NOT NULL DEFAULT '',
                mood TEXT NOT NULL DEFAULT 'neutral',
                priorities TEXT NOT NULL DEFAULT '[]',   -- JSON array
                perception_data TEXT NOT NULL DEFAULT '{}', -- JSON snapshot
                last_cycle_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS insights (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                source_state_id INTEGER REFERENCES states(id),
                insight_type TEXT NOT NULL,              -- warning, opportunity, correlation, info
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                priority REAL NOT NULL,
                is_actionable INTEGER NOT NULL DEFAULT 0,
                suggested_actions TEXT NOT NULL DEFAULT '[]', -- JSON array
                action_url TEXT,
                status TEXT NOT NULL DEFAULT 'active',   -- active, dismissed, completed, expired
                expires_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_insights_org_status ON insights(organization_id, status);
            CREATE INDEX IF NOT EXISTS idx_insights_org_updated ON insights(organization_id, updated_at);
            -- Upsert identity is unique among active insights only
            CREATE UNIQUE INDEX IF NOT EXISTS idx_insights_active_identity
                ON insights(organization_id, category, title) WHERE status = 'active';

            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                prediction_type TEXT NOT NULL,
                category TEXT NOT NULL,
                prediction_date DATETIME NOT NULL,       -- identifies the generation run
                target_date DATE NOT NULL,
                predicted_value REAL NOT NULL,
                confidence REAL NOT NULL,
                factors TEXT NOT NULL DEFAULT '{}',
                metadata TEXT NOT NULL DEFAULT '{}',
                actual_value REAL,
                accuracy REAL,
                UNIQUE(organization_id, prediction_type, category, target_date, prediction_date)
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_org_date ON predictions(organization_id, prediction_date);
            CREATE INDEX IF NOT EXISTS idx_predictions_org_type ON predictions(organization_id, prediction_type);

            CREATE TABLE IF NOT EXISTS actions (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                action_type TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                parameters TEXT NOT NULL,                -- JSON, typed per action type
                preview TEXT NOT NULL,                   -- JSON
                result TEXT,                             -- JSON
                error_message TEXT,
                was_successful INTEGER,
                rating INTEGER,
                created_at DATETIME NOT NULL,
                confirmed_at DATETIME,
                executed_at DATETIME,
                cancelled_at DATETIME
            );
            CREATE INDEX IF NOT EXISTS idx_actions_org_status ON actions(organization_id, status);
            CREATE INDEX IF NOT EXISTS idx_actions_org_created ON actions(organization_id, created_at);

            CREATE TABLE IF NOT EXISTS action_patterns (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                action_type TEXT NOT NULL,
                times_suggested INTEGER NOT NULL DEFAULT 0,
                times_confirmed INTEGER NOT NULL DEFAULT 0,
                times_rejected INTEGER NOT NULL DEFAULT 0,
                times_successful INTEGER NOT NULL DEFAULT 0,
                successful_contexts TEXT NOT NULL DEFAULT '[]', -- JSON, newest 10
                failed_contexts TEXT NOT NULL DEFAULT '[]',     -- JSON, newest 10
                avg_rating REAL,
                ratings_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                UNIQUE(organization_id, user_id, action_type)
            );

            -- Who did what, for server mutations and action transitions
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                user_id INTEGER,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id INTEGER,
                details TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_audit_org_created ON audit_log(organization_id, created_at);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
