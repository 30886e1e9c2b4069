/// Refresh Token Ledger
///
/// Every refresh token handed out is whitelisted here by digest. A refresh
/// token is only honoured while its digest is present; rotation swaps the
/// old digest for the new one in place, so a rotated-out token is rejected
/// exactly like one that was never issued.
///
/// - Digests are SHA-256 hex (fast and deterministic; the input is already a
///   high-entropy signed token, so no salt or work factor)
/// - Plaintext tokens are never stored or logged
/// - Entries are matched by digest, never by user, so parallel sessions of
///   one user rotate independently

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::database::{LedgerEntry, LedgerStore};
use crate::error::LedgerError;

/// SHA-256 digest of a refresh token, lowercase hex (64 chars)
pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct RefreshTokenLedger {
    store: Arc<dyn LedgerStore>,
}

impl RefreshTokenLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Whitelist a freshly issued refresh token for `user_id`.
    ///
    /// # Errors
    /// `WriteNotApplied` if the insert did not land; the caller must not hand
    /// the token out.
    pub async fn record(&self, user_id: Uuid, token: &str) -> Result<(), LedgerError> {
        let now = Utc::now();
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id,
            token_hash: digest_token(token),
            created_at: now,
            updated_at: now,
        };

        let rows_affected = self.store.insert(&entry).await?;
        if rows_affected != 1 {
            return Err(LedgerError::WriteNotApplied {
                operation: "record",
                rows_affected,
            });
        }

        tracing::debug!(user_id = %user_id, entry_id = %entry.id, "Refresh token whitelisted");
        Ok(())
    }

    /// Find the entry for a presented refresh token.
    ///
    /// Zero matches and ambiguous matches are both `NotFound`.
    pub async fn lookup(&self, token: &str) -> Result<LedgerEntry, LedgerError> {
        let mut matches = self.store.find_by_digest(&digest_token(token)).await?;

        if matches.len() != 1 {
            if matches.len() > 1 {
                tracing::error!(count = matches.len(), "Refresh token digest is ambiguous");
            }
            return Err(LedgerError::NotFound);
        }

        Ok(matches.remove(0))
    }

    /// Replace the entry for `old_token` with `new_token` in one step.
    ///
    /// # Errors
    /// `WriteNotApplied` unless exactly one entry held the old digest. This is
    /// what a concurrent rotation of the same token observes.
    pub async fn rotate(&self, old_token: &str, new_token: &str) -> Result<(), LedgerError> {
        let rows_affected = self
            .store
            .replace_digest(&digest_token(old_token), &digest_token(new_token))
            .await?;

        if rows_affected != 1 {
            return Err(LedgerError::WriteNotApplied {
                operation: "rotate",
                rows_affected,
            });
        }

        Ok(())
    }

    /// Drop a single refresh token. Returns whether it was present.
    pub async fn revoke(&self, token: &str) -> Result<bool, LedgerError> {
        let rows_affected = self.store.delete_by_digest(&digest_token(token)).await?;
        Ok(rows_affected > 0)
    }

    /// Drop every refresh token belonging to `user_id`.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, LedgerError> {
        let rows_affected = self.store.delete_by_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked = rows_affected, "Refresh tokens revoked for user");
        Ok(rows_affected)
    }
}
