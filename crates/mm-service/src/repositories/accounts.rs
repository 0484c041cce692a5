//! Account directory collaborator.
//!
//! The matchmaker core only needs one capability from account management:
//! resolve a company code to an account status. That seam is the
//! [`AccountDirectory`] trait so tests can substitute a fake; the
//! production implementation reads the local `accounts` table.

use crate::errors::MmError;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Billing status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    /// Active paying account; bypasses the free-mode gate entirely.
    Paid,
    /// Known account without an active subscription.
    Free,
    /// Administratively suspended.
    Suspended,
}

impl AccountStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AccountStatus::Paid => "paid",
            AccountStatus::Free => "free",
            AccountStatus::Suspended => "suspended",
        }
    }

    /// Unknown status strings are treated as non-paying.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "paid" => AccountStatus::Paid,
            "suspended" => AccountStatus::Suspended,
            _ => AccountStatus::Free,
        }
    }
}

/// Resolve a company/account code to its status.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn lookup(&self, account_code: &str) -> Result<Option<AccountStatus>, MmError>;
}

/// Account directory backed by the `accounts` table.
pub struct SqlAccountDirectory {
    pool: SqlitePool,
}

impl SqlAccountDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        SqlAccountDirectory { pool }
    }
}

#[async_trait]
impl AccountDirectory for SqlAccountDirectory {
    async fn lookup(&self, account_code: &str) -> Result<Option<AccountStatus>, MmError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM accounts WHERE account_code = ?1")
                .bind(account_code)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(status,)| AccountStatus::from_db_str(&status)))
    }
}
