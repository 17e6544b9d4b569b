//! In-memory stores
//!
//! Same semantics as the Postgres stores, including the unique email and
//! unique token constraints and the compare-and-swap revoke.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::{
    token_fingerprint, RefreshTokenLedger, RefreshTokenRecord, StoreResult, UserRecord, UserStore,
};
use crate::error::DatabaseError;

#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    by_email: Arc<DashMap<String, UserRecord>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user without a password hash, as an external identity
    /// provider would.
    pub fn insert_federated(&self, email: &str) -> UserRecord {
        let record = UserRecord {
            id: self.allocate_id(),
            email: email.to_string(),
            password_hash: None,
            created_at: Utc::now(),
        };
        self.by_email.insert(email.to_lowercase(), record.clone());
        record
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self
            .by_email
            .get(&email.to_lowercase())
            .map(|r| r.value().clone()))
    }

    async fn create(&self, email: &str, password_hash: &str) -> StoreResult<UserRecord> {
        match self.by_email.entry(email.to_lowercase()) {
            Entry::Occupied(_) => Err(DatabaseError::UniqueConstraintViolation(
                "users_email_key".to_string(),
            )),
            Entry::Vacant(slot) => {
                let record = UserRecord {
                    id: self.allocate_id(),
                    email: email.to_string(),
                    password_hash: Some(password_hash.to_string()),
                    created_at: Utc::now(),
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryLedger {
    rows: Arc<DashMap<i64, (String, RefreshTokenRecord)>>,
    by_hash: Arc<DashMap<String, i64>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks a row up by token regardless of its liveness.
    pub fn get_by_token(&self, token: &str) -> Option<RefreshTokenRecord> {
        let id = *self.by_hash.get(&token_fingerprint(token))?;
        self.rows.get(&id).map(|r| r.value().1.clone())
    }

    /// Every row owned by `user_id`, in insertion order.
    pub fn rows_for_user(&self, user_id: i64) -> Vec<RefreshTokenRecord> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .filter(|r| r.value().1.user_id == user_id)
            .map(|r| r.value().1.clone())
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }
}

#[async_trait]
impl RefreshTokenLedger for InMemoryLedger {
    async fn insert(
        &self,
        user_id: i64,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord> {
        let hash = token_fingerprint(token);
        let id = match self.by_hash.entry(hash.clone()) {
            Entry::Occupied(_) => {
                return Err(DatabaseError::UniqueConstraintViolation(
                    "refresh_tokens_token_hash_key".to_string(),
                ))
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(id);
                id
            }
        };

        let record = RefreshTokenRecord {
            id,
            user_id,
            expires_at,
            revoked: false,
            created_at: issued_at,
        };
        self.rows.insert(id, (hash, record.clone()));
        Ok(record)
    }

    async fn find_usable(
        &self,
        token: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self
            .get_by_token(token)
            .filter(|record| record.user_id == user_id && record.is_usable(now)))
    }

    async fn revoke(&self, id: i64) -> StoreResult<bool> {
        match self.rows.get_mut(&id) {
            Some(mut row) if !row.1.revoked => {
                row.1.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_by_token(&self, token: &str) -> StoreResult<u64> {
        let id = match self.by_hash.get(&token_fingerprint(token)) {
            Some(id) => *id,
            None => return Ok(0),
        };
        Ok(u64::from(self.revoke(id).await?))
    }

    async fn revoke_all_for_user(&self, user_id: i64) -> StoreResult<u64> {
        let mut revoked = 0;
        for mut row in self.rows.iter_mut() {
            let record = &mut row.value_mut().1;
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn sweep(&self, now: DateTime<Utc>, revoked_before: DateTime<Utc>) -> StoreResult<u64> {
        let doomed: Vec<(i64, String)> = self
            .rows
            .iter()
            .filter(|r| {
                let record = &r.value().1;
                record.expires_at < now || (record.revoked && record.created_at < revoked_before)
            })
            .map(|r| (*r.key(), r.value().0.clone()))
            .collect();

        for (id, hash) in &doomed {
            self.rows.remove(id);
            self.by_hash.remove(hash);
        }

        Ok(doomed.len() as u64)
    }
}
