use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{LedgerEntry, LedgerStore, User, UserStore};
use crate::error::{DatabaseError, LedgerError};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, DatabaseError> {
    mutex
        .lock()
        .map_err(|_| DatabaseError::UnexpectedError("in-memory store lock poisoned".to_string()))
}

/// Users held in process memory
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let users = lock(&self.users)?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let users = lock(&self.users)?;
        Ok(users.get(&id).cloned())
    }

    async fn insert(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Uuid, DatabaseError> {
        let mut users = lock(&self.users)?;
        if users.values().any(|u| u.email == email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "A user already exists with this e-mail address".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        let id = user.id;
        users.insert(id, user);
        Ok(id)
    }
}

/// Refresh-token digests held in process memory.
///
/// Each operation runs under one lock, which gives `replace_digest` the same
/// single-winner behaviour as the row-locked SQL update.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    entries: Mutex<Vec<LedgerEntry>>,
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(&self, entry: &LedgerEntry) -> Result<u64, LedgerError> {
        lock(&self.entries)?.push(entry.clone());
        Ok(1)
    }

    async fn find_by_digest(&self, token_hash: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = lock(&self.entries)?;
        Ok(entries
            .iter()
            .filter(|e| e.token_hash == token_hash)
            .cloned()
            .collect())
    }

    async fn replace_digest(&self, old_hash: &str, new_hash: &str) -> Result<u64, LedgerError> {
        let mut entries = lock(&self.entries)?;
        let matching: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.token_hash == old_hash)
            .map(|(i, _)| i)
            .collect();

        if let [index] = matching[..] {
            let entry = &mut entries[index];
            entry.token_hash = new_hash.to_string();
            entry.updated_at = Utc::now();
        }

        Ok(matching.len() as u64)
    }

    async fn delete_by_digest(&self, token_hash: &str) -> Result<u64, LedgerError> {
        let mut entries = lock(&self.entries)?;
        let before = entries.len();
        entries.retain(|e| e.token_hash != token_hash);
        Ok((before - entries.len()) as u64)
    }

    async fn delete_by_user(&self, user_id: Uuid) -> Result<u64, LedgerError> {
        let mut entries = lock(&self.entries)?;
        let before = entries.len();
        entries.retain(|e| e.user_id != user_id);
        Ok((before - entries.len()) as u64)
    }
}
