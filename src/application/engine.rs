use crate::domain::amendment::{Amendment, AmendmentKind};
use crate::domain::identity::OwnerId;
use crate::domain::lock::{DraftPatch, Lock, NewDraft, OutcomeResult, SEAL_CONFIRMATION, Stake};
use crate::domain::ports::RegistryStoreBox;
use crate::error::{RegistryError, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The main entry point for commitment lifecycle operations.
///
/// `LifecycleEngine` validates requests before any write, then delegates each
/// transition to the store as a single conditional operation. The store, not
/// the engine, arbitrates races: two concurrent finalize attempts resolve to
/// one winner and one `Conflict` inside the store's atomic section.
pub struct LifecycleEngine {
    store: RegistryStoreBox,
}

impl LifecycleEngine {
    pub fn new(store: RegistryStoreBox) -> Self {
        Self { store }
    }

    /// Opens a new private draft owned by `owner`.
    pub async fn create_draft(&self, owner: OwnerId, draft: NewDraft) -> Result<Lock> {
        let lock = Lock::draft(owner, draft, Utc::now())?;
        self.store.insert_lock(lock.clone()).await?;
        info!(lock_id = %lock.id, owner = %lock.owner, "draft created");
        Ok(lock)
    }

    /// Applies a content patch to a draft owned by the caller.
    pub async fn edit_draft(&self, owner: &OwnerId, id: Uuid, patch: DraftPatch) -> Result<Lock> {
        let lock = self.store.update_draft(id, owner, patch).await?;
        debug!(lock_id = %lock.id, "draft edited");
        Ok(lock)
    }

    /// Abandons a draft. The record stays private forever.
    pub async fn drop_draft(&self, owner: &OwnerId, id: Uuid) -> Result<Lock> {
        let now = Utc::now();
        let amendment = Amendment::dropped(id, now);
        let lock = self.store.drop_draft(id, owner, now, amendment).await?;
        info!(lock_id = %lock.id, "draft dropped");
        Ok(lock)
    }

    /// Seals a draft into the public, immutable `locked` state.
    ///
    /// Requires the explicit confirmation token so a stray call cannot make a
    /// record irreversible by accident.
    pub async fn seal(
        &self,
        owner: &OwnerId,
        id: Uuid,
        confirmation: &str,
        stake: Option<Stake>,
    ) -> Result<Lock> {
        if confirmation != SEAL_CONFIRMATION {
            return Err(RegistryError::InvalidInput(format!(
                "sealing requires the confirmation token '{SEAL_CONFIRMATION}'"
            )));
        }
        let lock = self.store.seal_lock(id, owner, stake, Utc::now()).await?;
        info!(lock_id = %lock.id, "lock sealed");
        Ok(lock)
    }

    /// Finalizes a sealed record with its declared outcome, exactly once.
    ///
    /// The amendment insert and the status flip happen in one atomic store
    /// operation; on a race exactly one caller wins and the rest observe
    /// `Conflict`.
    pub async fn record_outcome(
        &self,
        owner: &OwnerId,
        id: Uuid,
        result: OutcomeResult,
        proof_text: Option<&str>,
        proof_url: Option<&str>,
    ) -> Result<Lock> {
        let now = Utc::now();
        let amendment = Amendment::outcome(id, result, proof_text, proof_url, now);
        match self
            .store
            .finalize_lock(id, owner, result.final_status(), now, amendment)
            .await
        {
            Ok(lock) => {
                info!(lock_id = %lock.id, status = lock.status.as_str(), "outcome recorded");
                Ok(lock)
            }
            Err(err @ RegistryError::Conflict(_)) => {
                warn!(lock_id = %id, "conflicting outcome rejected");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Appends a milestone or note to a sealed record the caller owns.
    pub async fn add_amendment(
        &self,
        owner: &OwnerId,
        id: Uuid,
        kind: AmendmentKind,
        body: &str,
    ) -> Result<Amendment> {
        if matches!(kind, AmendmentKind::Outcome | AmendmentKind::Drop) {
            return Err(RegistryError::InvalidInput(
                "only milestone and note amendments can be appended directly".to_string(),
            ));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(RegistryError::InvalidInput(
                "amendment body must not be empty".to_string(),
            ));
        }
        let amendment = Amendment::new(id, kind, body, Utc::now());
        let stored = self.store.append_amendment(id, owner, amendment).await?;
        debug!(lock_id = %id, kind = stored.kind.as_str(), "amendment appended");
        Ok(stored)
    }

    /// Record plus its amendments, newest-first, filtered by visibility.
    ///
    /// Records the viewer may not see read as missing, so private drafts do
    /// not leak their existence.
    pub async fn view(&self, viewer: Option<&OwnerId>, id: Uuid) -> Result<(Lock, Vec<Amendment>)> {
        let Some(lock) = self.store.fetch_lock(id).await? else {
            return Err(RegistryError::NotFound(format!("lock {id} not found")));
        };
        if !lock.visible_to(viewer) {
            return Err(RegistryError::NotFound(format!("lock {id} not found")));
        }
        let amendments = self.store.amendments_for(id).await?;
        Ok((lock, amendments))
    }

    /// All public records, newest-first.
    pub async fn list_public(&self) -> Result<Vec<Lock>> {
        self.store.list_public().await
    }

    /// All records owned by the caller, drafts included, newest-first.
    pub async fn list_owned(&self, owner: &OwnerId) -> Result<Vec<Lock>> {
        self.store.list_owned(owner).await
    }
}
