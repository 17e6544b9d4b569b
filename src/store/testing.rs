//! Ledger that fails on demand, for exercising error paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{InMemoryLedger, RefreshTokenLedger, RefreshTokenRecord, StoreResult};
use crate::error::DatabaseError;

/// Delegates to an [`InMemoryLedger`] unless a failure switch is on.
#[derive(Clone, Default)]
pub struct FaultyLedger {
    pub inner: InMemoryLedger,
    fail_inserts: Arc<AtomicBool>,
    fail_sweeps: Arc<AtomicBool>,
    sweep_calls: Arc<AtomicUsize>,
}

impl FaultyLedger {
    pub fn new(inner: InMemoryLedger) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sweeps(&self, fail: bool) {
        self.fail_sweeps.store(fail, Ordering::SeqCst);
    }

    /// Sweeps attempted so far, failed ones included.
    pub fn sweep_calls(&self) -> usize {
        self.sweep_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshTokenLedger for FaultyLedger {
    async fn insert(
        &self,
        user_id: i64,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionPool("pool timed out".to_string()));
        }
        self.inner.insert(user_id, token, issued_at, expires_at).await
    }

    async fn find_usable(
        &self,
        token: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        self.inner.find_usable(token, user_id, now).await
    }

    async fn revoke(&self, id: i64) -> StoreResult<bool> {
        self.inner.revoke(id).await
    }

    async fn revoke_by_token(&self, token: &str) -> StoreResult<u64> {
        self.inner.revoke_by_token(token).await
    }

    async fn revoke_all_for_user(&self, user_id: i64) -> StoreResult<u64> {
        self.inner.revoke_all_for_user(user_id).await
    }

    async fn sweep(&self, now: DateTime<Utc>, revoked_before: DateTime<Utc>) -> StoreResult<u64> {
        self.sweep_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sweeps.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryExecution("relation is locked".to_string()));
        }
        self.inner.sweep(now, revoked_before).await
    }
}
