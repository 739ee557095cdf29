use super::amendment::Amendment;
use super::identity::OwnerId;
use super::lock::{DraftPatch, Lock, LockStatus, Stake};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage port for commitment records and their amendments.
///
/// Implementations arbitrate concurrent transitions: every conditional method
/// re-checks the expected prior status and the stored owner inside its own
/// atomic section and distinguishes `NotFound` (no such record), `Forbidden`
/// (owner mismatch) and `Conflict` (status mismatch or duplicate outcome).
/// A failed call must leave no partial writes behind.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn insert_lock(&self, lock: Lock) -> Result<()>;

    async fn fetch_lock(&self, id: Uuid) -> Result<Option<Lock>>;

    /// Public records, newest-first.
    async fn list_public(&self) -> Result<Vec<Lock>>;

    /// All records owned by `owner`, drafts included, newest-first.
    async fn list_owned(&self, owner: &OwnerId) -> Result<Vec<Lock>>;

    /// Applies a content patch while the record is still a draft.
    async fn update_draft(&self, id: Uuid, owner: &OwnerId, patch: DraftPatch) -> Result<Lock>;

    /// Conditional `draft -> locked` transition; re-validates the content
    /// length bounds inside the atomic section.
    async fn seal_lock(
        &self,
        id: Uuid,
        owner: &OwnerId,
        stake: Option<Stake>,
        sealed_at: DateTime<Utc>,
    ) -> Result<Lock>;

    /// Conditional `draft -> dropped` transition plus its drop amendment.
    async fn drop_draft(
        &self,
        id: Uuid,
        owner: &OwnerId,
        dropped_at: DateTime<Utc>,
        amendment: Amendment,
    ) -> Result<Lock>;

    /// Conditional `locked -> completed|broken` transition plus the outcome
    /// amendment, all-or-nothing. At most one outcome row may ever exist per
    /// record; a second finalize attempt reports `Conflict`.
    async fn finalize_lock(
        &self,
        id: Uuid,
        owner: &OwnerId,
        outcome: LockStatus,
        resolved_at: DateTime<Utc>,
        amendment: Amendment,
    ) -> Result<Lock>;

    /// Appends a non-finalizing amendment to a sealed record.
    async fn append_amendment(
        &self,
        id: Uuid,
        owner: &OwnerId,
        amendment: Amendment,
    ) -> Result<Amendment>;

    /// Amendments for a record, newest-first.
    async fn amendments_for(&self, id: Uuid) -> Result<Vec<Amendment>>;
}

pub type RegistryStoreBox = Box<dyn RegistryStore>;
