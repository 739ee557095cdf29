use crate::domain::amendment::{Amendment, AmendmentKind};
use crate::domain::identity::OwnerId;
use crate::domain::lock::{DraftPatch, Lock, LockStatus, Stake};
use crate::domain::ports::RegistryStore;
use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory registry.
///
/// One `RwLock` guards both tables, so transitions that touch a record and
/// its amendments run under a single exclusive write guard. That guard is the
/// atomicity unit: concurrent finalize attempts serialize against it, and the
/// loser observes the already-flipped status as `Conflict`.
///
/// Ideal for tests and ephemeral deployments where persistence is not
/// required.
#[derive(Default, Clone)]
pub struct InMemoryRegistry {
    state: Arc<RwLock<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    locks: HashMap<Uuid, Lock>,
    amendments: HashMap<Uuid, Vec<Amendment>>,
}

impl InMemoryRegistry {
    /// Creates a new, empty in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }
}

fn owned_lock<'a>(
    locks: &'a mut HashMap<Uuid, Lock>,
    id: Uuid,
    owner: &OwnerId,
) -> Result<&'a mut Lock> {
    let lock = locks
        .get_mut(&id)
        .ok_or_else(|| RegistryError::NotFound(format!("lock {id} not found")))?;
    if lock.owner != *owner {
        return Err(RegistryError::Forbidden(
            "caller does not own this lock".to_string(),
        ));
    }
    Ok(lock)
}

fn newest_first(mut locks: Vec<Lock>) -> Vec<Lock> {
    locks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    locks
}

#[async_trait]
impl RegistryStore for InMemoryRegistry {
    async fn insert_lock(&self, lock: Lock) -> Result<()> {
        let mut state = self.state.write().await;
        if state.locks.contains_key(&lock.id) {
            return Err(RegistryError::Conflict(format!(
                "lock {} already exists",
                lock.id
            )));
        }
        state.locks.insert(lock.id, lock);
        Ok(())
    }

    async fn fetch_lock(&self, id: Uuid) -> Result<Option<Lock>> {
        let state = self.state.read().await;
        Ok(state.locks.get(&id).cloned())
    }

    async fn list_public(&self) -> Result<Vec<Lock>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .locks
                .values()
                .filter(|lock| lock.status.is_public())
                .cloned()
                .collect(),
        ))
    }

    async fn list_owned(&self, owner: &OwnerId) -> Result<Vec<Lock>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .locks
                .values()
                .filter(|lock| lock.owner == *owner)
                .cloned()
                .collect(),
        ))
    }

    async fn update_draft(&self, id: Uuid, owner: &OwnerId, patch: DraftPatch) -> Result<Lock> {
        let mut state = self.state.write().await;
        let lock = owned_lock(&mut state.locks, id, owner)?;
        lock.apply_patch(patch)?;
        Ok(lock.clone())
    }

    async fn seal_lock(
        &self,
        id: Uuid,
        owner: &OwnerId,
        stake: Option<Stake>,
        sealed_at: DateTime<Utc>,
    ) -> Result<Lock> {
        let mut state = self.state.write().await;
        let lock = owned_lock(&mut state.locks, id, owner)?;
        lock.seal(stake, sealed_at)?;
        Ok(lock.clone())
    }

    async fn drop_draft(
        &self,
        id: Uuid,
        owner: &OwnerId,
        dropped_at: DateTime<Utc>,
        amendment: Amendment,
    ) -> Result<Lock> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let lock = owned_lock(&mut state.locks, id, owner)?;
        lock.drop_draft(dropped_at)?;
        let snapshot = lock.clone();
        state.amendments.entry(id).or_default().push(amendment);
        Ok(snapshot)
    }

    async fn finalize_lock(
        &self,
        id: Uuid,
        owner: &OwnerId,
        outcome: LockStatus,
        resolved_at: DateTime<Utc>,
        amendment: Amendment,
    ) -> Result<Lock> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let lock = owned_lock(&mut state.locks, id, owner)?;
        // at most one outcome row per lock
        if state
            .amendments
            .get(&id)
            .is_some_and(|list| list.iter().any(|a| a.kind == AmendmentKind::Outcome))
        {
            return Err(RegistryError::Conflict(
                "outcome already recorded".to_string(),
            ));
        }
        lock.finalize(outcome, resolved_at)?;
        let snapshot = lock.clone();
        state.amendments.entry(id).or_default().push(amendment);
        Ok(snapshot)
    }

    async fn append_amendment(
        &self,
        id: Uuid,
        owner: &OwnerId,
        amendment: Amendment,
    ) -> Result<Amendment> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let lock = owned_lock(&mut state.locks, id, owner)?;
        if lock.status != LockStatus::Locked {
            return Err(RegistryError::Conflict(
                "amendments attach to sealed records only".to_string(),
            ));
        }
        state
            .amendments
            .entry(id)
            .or_default()
            .push(amendment.clone());
        Ok(amendment)
    }

    async fn amendments_for(&self, id: Uuid) -> Result<Vec<Amendment>> {
        let state = self.state.read().await;
        // insertion order is chronological; reverse for newest-first
        Ok(state
            .amendments
            .get(&id)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}
