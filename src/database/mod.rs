/// Storage layer
///
/// Two narrow traits sit between the auth flows and the database: one for
/// user accounts and one for refresh-token digests. Each has a PostgreSQL
/// implementation and an in-process one with the same semantics.

mod memory;
mod postgres;

pub use memory::{InMemoryLedgerStore, InMemoryUserStore};
pub use postgres::{PgLedgerStore, PgUserStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{DatabaseError, LedgerError};

/// A registered account
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// One whitelisted refresh token, stored by digest only
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    /// Create an account and return its id.
    ///
    /// Fails with `UniqueConstraintViolation` if the email is taken.
    async fn insert(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Uuid, DatabaseError>;
}

/// Raw digest storage behind [`crate::auth::RefreshTokenLedger`]
///
/// Methods report row counts; deciding what counts as success is up to the
/// ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert(&self, entry: &LedgerEntry) -> Result<u64, LedgerError>;

    async fn find_by_digest(&self, token_hash: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Replace `old_hash` with `new_hash` only if exactly one entry holds
    /// `old_hash`; otherwise change nothing. Returns how many entries held
    /// `old_hash`.
    async fn replace_digest(&self, old_hash: &str, new_hash: &str) -> Result<u64, LedgerError>;

    async fn delete_by_digest(&self, token_hash: &str) -> Result<u64, LedgerError>;

    async fn delete_by_user(&self, user_id: Uuid) -> Result<u64, LedgerError>;
}
