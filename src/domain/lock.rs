use crate::domain::identity::OwnerId;
use crate::error::RegistryError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum title length (in characters) required to seal a draft.
pub const MIN_TITLE_CHARS: usize = 3;
/// Minimum commitment-statement length (in characters) required to seal.
pub const MIN_COMMITMENT_CHARS: usize = 8;
/// Confirmation token a caller must supply to seal a draft.
pub const SEAL_CONFIRMATION: &str = "seal";
/// Upper bound on the free-text classification field.
pub const MAX_KIND_CHARS: usize = 64;

const DUE_SOON_DAYS: i64 = 7;

/// Lifecycle state of a commitment record.
///
/// `active` and `failed` are accepted as input aliases for `locked` and
/// `broken`; output is always canonical.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    Draft,
    #[serde(alias = "active")]
    Locked,
    Completed,
    #[serde(alias = "failed")]
    Broken,
    Dropped,
}

impl LockStatus {
    /// Whether anyone other than the owner may read the record.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Locked | Self::Completed | Self::Broken)
    }

    /// Whether any further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Broken | Self::Dropped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Locked => "locked",
            Self::Completed => "completed",
            Self::Broken => "broken",
            Self::Dropped => "dropped",
        }
    }
}

/// Declared result of a sealed commitment.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeResult {
    #[serde(alias = "completed")]
    Success,
    #[serde(alias = "failed", alias = "broken")]
    Fail,
}

impl OutcomeResult {
    /// The terminal status this result finalizes a record into.
    pub fn final_status(&self) -> LockStatus {
        match self {
            Self::Success => LockStatus::Completed,
            Self::Fail => LockStatus::Broken,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

/// Self-declared stake attached when a draft is sealed.
///
/// Informational only: the amount is never settled or escrowed, and it cannot
/// change once the record is sealed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stake {
    amount: Decimal,
    currency: String,
}

impl Stake {
    pub fn new(amount: Decimal, currency: &str) -> Result<Self, RegistryError> {
        if amount <= Decimal::ZERO {
            return Err(RegistryError::InvalidInput(
                "stake amount must be positive".to_string(),
            ));
        }
        let currency = currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RegistryError::InvalidInput(
                "stake currency must be a 3-letter code".to_string(),
            ));
        }
        Ok(Self { amount, currency })
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}

/// Advisory deadline indicator derived at read time.
///
/// Never feeds the state machine: a record can be finalized before, on, or
/// after its deadline.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineState {
    Upcoming,
    DueSoon,
    Overdue,
}

impl DeadlineState {
    /// `DueSoon` within seven days of the deadline, `Overdue` once it passed.
    pub fn evaluate(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if deadline < now {
            Self::Overdue
        } else if deadline - now <= Duration::days(DUE_SOON_DAYS) {
            Self::DueSoon
        } else {
            Self::Upcoming
        }
    }
}

/// Fields a caller supplies to open a new draft.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDraft {
    pub title: String,
    pub commitment: String,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Partial update applied to a draft's content fields.
///
/// `None` leaves a field untouched; supplied values replace the stored ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub commitment: Option<String>,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// A commitment record and its lifecycle state.
///
/// Content fields are mutable only while `status` is `Draft`. Sealing freezes
/// them; from then on the only further change is the single finalizing status
/// transition, and all detail is appended as amendments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lock {
    pub id: Uuid,
    pub owner: OwnerId,
    pub title: String,
    pub commitment: String,
    pub criteria: Option<String>,
    pub reason: Option<String>,
    pub kind: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub stake: Option<Stake>,
    pub status: LockStatus,
    pub created_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub dropped_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Lock {
    /// Opens a new draft owned by `owner`.
    pub fn draft(
        owner: OwnerId,
        new: NewDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, RegistryError> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(RegistryError::InvalidInput(
                "title must not be empty".to_string(),
            ));
        }
        let commitment = new.commitment.trim().to_string();
        if commitment.is_empty() {
            return Err(RegistryError::InvalidInput(
                "commitment must not be empty".to_string(),
            ));
        }
        let kind = normalize_kind(new.kind)?;

        Ok(Self {
            id: Uuid::new_v4(),
            owner,
            title,
            commitment,
            criteria: normalize_text(new.criteria),
            reason: normalize_text(new.reason),
            kind,
            deadline: new.deadline,
            stake: None,
            status: LockStatus::Draft,
            created_at: now,
            locked_at: None,
            dropped_at: None,
            resolved_at: None,
        })
    }

    /// Applies a content patch. Validates the whole patch before touching any
    /// field, so a rejected patch leaves the record unchanged.
    pub fn apply_patch(&mut self, patch: DraftPatch) -> Result<(), RegistryError> {
        if self.status != LockStatus::Draft {
            return Err(RegistryError::Conflict(
                "only drafts can be edited".to_string(),
            ));
        }

        let title = match patch.title {
            Some(value) => {
                let value = value.trim().to_string();
                if value.is_empty() {
                    return Err(RegistryError::InvalidInput(
                        "title must not be empty".to_string(),
                    ));
                }
                Some(value)
            }
            None => None,
        };
        let commitment = match patch.commitment {
            Some(value) => {
                let value = value.trim().to_string();
                if value.is_empty() {
                    return Err(RegistryError::InvalidInput(
                        "commitment must not be empty".to_string(),
                    ));
                }
                Some(value)
            }
            None => None,
        };
        let kind = match patch.kind {
            Some(value) => normalize_kind(Some(value))?,
            None => None,
        };

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(commitment) = commitment {
            self.commitment = commitment;
        }
        if let Some(criteria) = normalize_text(patch.criteria) {
            self.criteria = Some(criteria);
        }
        if let Some(reason) = normalize_text(patch.reason) {
            self.reason = Some(reason);
        }
        if let Some(kind) = kind {
            self.kind = Some(kind);
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = Some(deadline);
        }
        Ok(())
    }

    /// Checks the seal preconditions without mutating the record.
    pub fn check_sealable(&self) -> Result<(), RegistryError> {
        match self.status {
            LockStatus::Draft => {}
            LockStatus::Dropped => {
                return Err(RegistryError::Conflict(
                    "record was dropped and can no longer be sealed".to_string(),
                ));
            }
            _ => {
                return Err(RegistryError::Conflict(
                    "record already left draft".to_string(),
                ));
            }
        }
        if self.title.chars().count() < MIN_TITLE_CHARS {
            return Err(RegistryError::InvalidInput(format!(
                "title must be at least {MIN_TITLE_CHARS} characters to seal"
            )));
        }
        if self.commitment.chars().count() < MIN_COMMITMENT_CHARS {
            return Err(RegistryError::InvalidInput(format!(
                "commitment must be at least {MIN_COMMITMENT_CHARS} characters to seal"
            )));
        }
        Ok(())
    }

    /// Seals the draft: content freezes, the record becomes public, and the
    /// optional stake rides along. Irreversible.
    pub fn seal(
        &mut self,
        stake: Option<Stake>,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        self.check_sealable()?;
        self.status = LockStatus::Locked;
        self.locked_at = Some(now);
        self.stake = stake;
        Ok(())
    }

    /// Abandons a draft. Terminal; the record stays private forever.
    pub fn drop_draft(&mut self, now: DateTime<Utc>) -> Result<(), RegistryError> {
        if self.status != LockStatus::Draft {
            return Err(RegistryError::Conflict(
                "only drafts can be dropped".to_string(),
            ));
        }
        self.status = LockStatus::Dropped;
        self.dropped_at = Some(now);
        Ok(())
    }

    /// Moves a sealed record into its terminal outcome status, exactly once.
    pub fn finalize(
        &mut self,
        outcome: LockStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        if !matches!(outcome, LockStatus::Completed | LockStatus::Broken) {
            return Err(RegistryError::InvalidInput(
                "outcome must finalize to completed or broken".to_string(),
            ));
        }
        match self.status {
            LockStatus::Locked => {
                self.status = outcome;
                self.resolved_at = Some(now);
                Ok(())
            }
            LockStatus::Draft => Err(RegistryError::InvalidInput(
                "record is not sealed; only sealed records take an outcome".to_string(),
            )),
            LockStatus::Completed | LockStatus::Broken => Err(RegistryError::Conflict(
                "outcome already recorded".to_string(),
            )),
            LockStatus::Dropped => Err(RegistryError::Conflict(
                "record was dropped".to_string(),
            )),
        }
    }

    /// Whether `viewer` may read this record. Anonymous viewers pass `None`.
    pub fn visible_to(&self, viewer: Option<&OwnerId>) -> bool {
        self.status.is_public() || viewer == Some(&self.owner)
    }

    /// Advisory deadline indicator, `None` when no deadline was set.
    pub fn deadline_state(&self, now: DateTime<Utc>) -> Option<DeadlineState> {
        self.deadline
            .map(|deadline| DeadlineState::evaluate(deadline, now))
    }
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_kind(value: Option<String>) -> Result<Option<String>, RegistryError> {
    match normalize_text(value) {
        Some(kind) if kind.chars().count() > MAX_KIND_CHARS => Err(
            RegistryError::InvalidInput(format!(
                "kind must be at most {MAX_KIND_CHARS} characters"
            )),
        ),
        other => Ok(other),
    }
}
