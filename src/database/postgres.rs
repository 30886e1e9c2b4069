use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{LedgerEntry, LedgerStore, User, UserStore};
use crate::error::{DatabaseError, LedgerError};

type UserRow = (Uuid, String, String, String, DateTime<Utc>);
type LedgerRow = (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>);

fn user_from_row((id, name, email, password_hash, created_at): UserRow) -> User {
    User {
        id,
        name,
        email,
        password_hash,
        created_at,
    }
}

fn entry_from_row((id, user_id, token_hash, created_at, updated_at): LedgerRow) -> LedgerEntry {
    LedgerEntry {
        id,
        user_id,
        token_hash,
        created_at,
        updated_at,
    }
}

/// `users` table
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn insert(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Uuid, DatabaseError> {
        let user_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(user_id)
    }
}

/// `refresh_tokens` table
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert(&self, entry: &LedgerEntry) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.token_hash)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_by_digest(&self, token_hash: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, user_id, token_hash, created_at, updated_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(entry_from_row).collect())
    }

    async fn replace_digest(&self, old_hash: &str, new_hash: &str) -> Result<u64, LedgerError> {
        // A concurrent UPDATE of the same row blocks on the row lock, then
        // re-checks the WHERE clause against the committed digest and matches
        // nothing.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token_hash = $1, updated_at = $2
            WHERE token_hash = $3
            "#,
        )
        .bind(new_hash)
        .bind(Utc::now())
        .bind(old_hash)
        .execute(&mut tx)
        .await?;

        let rows_affected = result.rows_affected();
        if rows_affected == 1 {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }

        Ok(rows_affected)
    }

    async fn delete_by_digest(&self, token_hash: &str) -> Result<u64, LedgerError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_by_user(&self, user_id: Uuid) -> Result<u64, LedgerError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
