use crate::domain::lock::OutcomeResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of note appended to a commitment record.
///
/// `Outcome` and `Drop` rows are written by the corresponding lifecycle
/// transitions; callers can only append `Milestone` and `Note` directly.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AmendmentKind {
    Milestone,
    Outcome,
    Note,
    Drop,
}

impl AmendmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Milestone => "milestone",
            Self::Outcome => "outcome",
            Self::Note => "note",
            Self::Drop => "drop",
        }
    }
}

/// An immutable note appended to a commitment record.
///
/// Rows never change after insert; display order is newest-first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amendment {
    pub id: Uuid,
    pub lock_id: Uuid,
    pub kind: AmendmentKind,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Amendment {
    pub fn new(
        lock_id: Uuid,
        kind: AmendmentKind,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lock_id,
            kind,
            body: body.into(),
            created_at: now,
        }
    }

    /// Builds the outcome row for a finalizing transition. The declared
    /// result and any proof are folded into the body as a small JSON document.
    pub fn outcome(
        lock_id: Uuid,
        result: OutcomeResult,
        proof_text: Option<&str>,
        proof_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let body = serde_json::json!({
            "result": result.as_str(),
            "proof_text": proof_text,
            "proof_url": proof_url,
        });
        Self::new(lock_id, AmendmentKind::Outcome, body.to_string(), now)
    }

    /// Builds the row recording a draft abandonment.
    pub fn dropped(lock_id: Uuid, now: DateTime<Utc>) -> Self {
        Self::new(lock_id, AmendmentKind::Drop, "draft dropped by owner", now)
    }
}
