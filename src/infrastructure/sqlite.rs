use crate::domain::amendment::{Amendment, AmendmentKind};
use crate::domain::identity::OwnerId;
use crate::domain::lock::{
    DraftPatch, Lock, LockStatus, MIN_COMMITMENT_CHARS, MIN_TITLE_CHARS, Stake,
};
use crate::domain::ports::RegistryStore;
use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use std::str::FromStr;
use uuid::Uuid;

const LOCK_COLUMNS: &str = "id, owner_id, title, commitment, criteria, reason, kind, deadline, \
     stake_amount, stake_currency, status, created_at, locked_at, dropped_at, resolved_at";

/// sqlx-backed registry store.
///
/// The database arbitrates every race: transitions are conditional
/// `UPDATE ... WHERE status = ?` statements checked via `rows_affected`,
/// finalize wraps its two writes in one transaction, and a partial unique
/// index allows at most one outcome row per lock. When a conditional update
/// matches no row, a classification read inside the same transaction turns
/// the miss into `NotFound`, `Forbidden`, `InvalidInput` or `Conflict`.
#[derive(Debug, Clone)]
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    /// Connects to `database_url` (e.g. `sqlite:lockpoint.db`), creating the
    /// file and schema when missing.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| RegistryError::Storage(format!("invalid sqlite url: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| RegistryError::Storage(format!("sqlite connect failed: {e}")))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locks (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                commitment TEXT NOT NULL,
                criteria TEXT NULL,
                reason TEXT NULL,
                kind TEXT NULL,
                deadline TEXT NULL,
                stake_amount TEXT NULL,
                stake_currency TEXT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                locked_at TEXT NULL,
                dropped_at TEXT NULL,
                resolved_at TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS amendments (
                id TEXT PRIMARY KEY,
                lock_id TEXT NOT NULL REFERENCES locks (id),
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        // at most one outcome row per lock
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_amendments_single_outcome \
             ON amendments (lock_id) WHERE kind = 'outcome'",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_locks_owner ON locks (owner_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_amendments_lock ON amendments (lock_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}

fn db_err(err: sqlx::Error) -> RegistryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RegistryError::Conflict("conflicting write".to_string())
        }
        _ => RegistryError::Storage(err.to_string()),
    }
}

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| RegistryError::Storage(format!("invalid uuid in sqlite: {e}")))
}

fn parse_status(value: &str) -> Result<LockStatus> {
    match value {
        "draft" => Ok(LockStatus::Draft),
        "locked" => Ok(LockStatus::Locked),
        "completed" => Ok(LockStatus::Completed),
        "broken" => Ok(LockStatus::Broken),
        "dropped" => Ok(LockStatus::Dropped),
        other => Err(RegistryError::Storage(format!(
            "unknown status '{other}' in sqlite"
        ))),
    }
}

fn parse_kind(value: &str) -> Result<AmendmentKind> {
    match value {
        "milestone" => Ok(AmendmentKind::Milestone),
        "outcome" => Ok(AmendmentKind::Outcome),
        "note" => Ok(AmendmentKind::Note),
        "drop" => Ok(AmendmentKind::Drop),
        other => Err(RegistryError::Storage(format!(
            "unknown amendment kind '{other}' in sqlite"
        ))),
    }
}

fn lock_from_row(row: &SqliteRow) -> Result<Lock> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let owner: String = row.try_get("owner_id").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let stake_amount: Option<String> = row.try_get("stake_amount").map_err(db_err)?;
    let stake_currency: Option<String> = row.try_get("stake_currency").map_err(db_err)?;
    let stake = match (stake_amount, stake_currency) {
        (Some(amount), Some(currency)) => {
            let amount = Decimal::from_str(&amount).map_err(|e| {
                RegistryError::Storage(format!("invalid stake amount in sqlite: {e}"))
            })?;
            let stake = Stake::new(amount, &currency)
                .map_err(|e| RegistryError::Storage(format!("invalid stake in sqlite: {e}")))?;
            Some(stake)
        }
        _ => None,
    };

    Ok(Lock {
        id: parse_id(&id)?,
        owner: OwnerId::new(owner),
        title: row.try_get("title").map_err(db_err)?,
        commitment: row.try_get("commitment").map_err(db_err)?,
        criteria: row.try_get("criteria").map_err(db_err)?,
        reason: row.try_get("reason").map_err(db_err)?,
        kind: row.try_get("kind").map_err(db_err)?,
        deadline: row.try_get("deadline").map_err(db_err)?,
        stake,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        locked_at: row.try_get("locked_at").map_err(db_err)?,
        dropped_at: row.try_get("dropped_at").map_err(db_err)?,
        resolved_at: row.try_get("resolved_at").map_err(db_err)?,
    })
}

fn amendment_from_row(row: &SqliteRow) -> Result<Amendment> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let lock_id: String = row.try_get("lock_id").map_err(db_err)?;
    let kind: String = row.try_get("kind").map_err(db_err)?;
    Ok(Amendment {
        id: parse_id(&id)?,
        lock_id: parse_id(&lock_id)?,
        kind: parse_kind(&kind)?,
        body: row.try_get("body").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

async fn fetch_row<'e, E>(executor: E, id: Uuid) -> Result<Option<SqliteRow>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(&format!("SELECT {LOCK_COLUMNS} FROM locks WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .map_err(db_err)
}

async fn insert_amendment(conn: &mut SqliteConnection, amendment: &Amendment) -> Result<()> {
    sqlx::query(
        "INSERT INTO amendments (id, lock_id, kind, body, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(amendment.id.to_string())
    .bind(amendment.lock_id.to_string())
    .bind(amendment.kind.as_str())
    .bind(&amendment.body)
    .bind(amendment.created_at)
    .execute(conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Explains why a conditional update matched no row by replaying the domain
/// transition against the row as it stands inside this transaction.
async fn classify_zero_rows<F>(
    conn: &mut SqliteConnection,
    id: Uuid,
    owner: &OwnerId,
    transition: F,
) -> RegistryError
where
    F: FnOnce(&mut Lock) -> Result<()>,
{
    let row = match fetch_row(&mut *conn, id).await {
        Ok(row) => row,
        Err(err) => return err,
    };
    let Some(row) = row else {
        return RegistryError::NotFound(format!("lock {id} not found"));
    };
    let mut lock = match lock_from_row(&row) {
        Ok(lock) => lock,
        Err(err) => return err,
    };
    if lock.owner != *owner {
        return RegistryError::Forbidden("caller does not own this lock".to_string());
    }
    match transition(&mut lock) {
        Ok(()) => RegistryError::Storage("conditional update affected no rows".to_string()),
        Err(err) => err,
    }
}

#[async_trait]
impl RegistryStore for SqliteRegistry {
    async fn insert_lock(&self, lock: Lock) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO locks ({LOCK_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ))
        .bind(lock.id.to_string())
        .bind(lock.owner.as_str())
        .bind(&lock.title)
        .bind(&lock.commitment)
        .bind(&lock.criteria)
        .bind(&lock.reason)
        .bind(&lock.kind)
        .bind(lock.deadline)
        .bind(lock.stake.as_ref().map(|s| s.amount().to_string()))
        .bind(lock.stake.as_ref().map(|s| s.currency().to_string()))
        .bind(lock.status.as_str())
        .bind(lock.created_at)
        .bind(lock.locked_at)
        .bind(lock.dropped_at)
        .bind(lock.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn fetch_lock(&self, id: Uuid) -> Result<Option<Lock>> {
        let row = fetch_row(&self.pool, id).await?;
        row.as_ref().map(lock_from_row).transpose()
    }

    async fn list_public(&self) -> Result<Vec<Lock>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOCK_COLUMNS} FROM locks \
             WHERE status IN ('locked', 'completed', 'broken') \
             ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(lock_from_row).collect()
    }

    async fn list_owned(&self, owner: &OwnerId) -> Result<Vec<Lock>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOCK_COLUMNS} FROM locks WHERE owner_id = ?1 \
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(lock_from_row).collect()
    }

    async fn update_draft(&self, id: Uuid, owner: &OwnerId, patch: DraftPatch) -> Result<Lock> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let Some(row) = fetch_row(&mut *tx, id).await? else {
            return Err(RegistryError::NotFound(format!("lock {id} not found")));
        };
        let mut lock = lock_from_row(&row)?;
        if lock.owner != *owner {
            return Err(RegistryError::Forbidden(
                "caller does not own this lock".to_string(),
            ));
        }
        lock.apply_patch(patch)?;

        let updated = sqlx::query(
            "UPDATE locks SET title = ?1, commitment = ?2, criteria = ?3, reason = ?4, \
             kind = ?5, deadline = ?6 \
             WHERE id = ?7 AND owner_id = ?8 AND status = 'draft'",
        )
        .bind(&lock.title)
        .bind(&lock.commitment)
        .bind(&lock.criteria)
        .bind(&lock.reason)
        .bind(&lock.kind)
        .bind(lock.deadline)
        .bind(id.to_string())
        .bind(owner.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            return Err(RegistryError::Storage(
                "draft update affected no rows".to_string(),
            ));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(lock)
    }

    async fn seal_lock(
        &self,
        id: Uuid,
        owner: &OwnerId,
        stake: Option<Stake>,
        sealed_at: DateTime<Utc>,
    ) -> Result<Lock> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // length() counts characters for TEXT, matching the domain bounds
        let updated = sqlx::query(
            "UPDATE locks SET status = 'locked', locked_at = ?1, \
             stake_amount = ?2, stake_currency = ?3 \
             WHERE id = ?4 AND owner_id = ?5 AND status = 'draft' \
             AND length(title) >= ?6 AND length(commitment) >= ?7",
        )
        .bind(sealed_at)
        .bind(stake.as_ref().map(|s| s.amount().to_string()))
        .bind(stake.as_ref().map(|s| s.currency().to_string()))
        .bind(id.to_string())
        .bind(owner.as_str())
        .bind(MIN_TITLE_CHARS as i64)
        .bind(MIN_COMMITMENT_CHARS as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            let err =
                classify_zero_rows(&mut tx, id, owner, |lock| lock.seal(None, sealed_at)).await;
            return Err(err);
        }

        let Some(row) = fetch_row(&mut *tx, id).await? else {
            return Err(RegistryError::Storage("sealed row vanished".to_string()));
        };
        let lock = lock_from_row(&row)?;
        tx.commit().await.map_err(db_err)?;
        Ok(lock)
    }

    async fn drop_draft(
        &self,
        id: Uuid,
        owner: &OwnerId,
        dropped_at: DateTime<Utc>,
        amendment: Amendment,
    ) -> Result<Lock> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            "UPDATE locks SET status = 'dropped', dropped_at = ?1 \
             WHERE id = ?2 AND owner_id = ?3 AND status = 'draft'",
        )
        .bind(dropped_at)
        .bind(id.to_string())
        .bind(owner.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            let err =
                classify_zero_rows(&mut tx, id, owner, |lock| lock.drop_draft(dropped_at)).await;
            return Err(err);
        }

        insert_amendment(&mut tx, &amendment).await?;

        let Some(row) = fetch_row(&mut *tx, id).await? else {
            return Err(RegistryError::Storage("dropped row vanished".to_string()));
        };
        let lock = lock_from_row(&row)?;
        tx.commit().await.map_err(db_err)?;
        Ok(lock)
    }

    async fn finalize_lock(
        &self,
        id: Uuid,
        owner: &OwnerId,
        outcome: LockStatus,
        resolved_at: DateTime<Utc>,
        amendment: Amendment,
    ) -> Result<Lock> {
        if !matches!(outcome, LockStatus::Completed | LockStatus::Broken) {
            return Err(RegistryError::InvalidInput(
                "outcome must finalize to completed or broken".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            "UPDATE locks SET status = ?1, resolved_at = ?2 \
             WHERE id = ?3 AND owner_id = ?4 AND status = 'locked'",
        )
        .bind(outcome.as_str())
        .bind(resolved_at)
        .bind(id.to_string())
        .bind(owner.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            let err = classify_zero_rows(&mut tx, id, owner, |lock| {
                lock.finalize(outcome, resolved_at)
            })
            .await;
            return Err(err);
        }

        insert_amendment(&mut tx, &amendment).await?;

        let Some(row) = fetch_row(&mut *tx, id).await? else {
            return Err(RegistryError::Storage("finalized row vanished".to_string()));
        };
        let lock = lock_from_row(&row)?;
        tx.commit().await.map_err(db_err)?;
        Ok(lock)
    }

    async fn append_amendment(
        &self,
        id: Uuid,
        owner: &OwnerId,
        amendment: Amendment,
    ) -> Result<Amendment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let Some(row) = fetch_row(&mut *tx, id).await? else {
            return Err(RegistryError::NotFound(format!("lock {id} not found")));
        };
        let lock = lock_from_row(&row)?;
        if lock.owner != *owner {
            return Err(RegistryError::Forbidden(
                "caller does not own this lock".to_string(),
            ));
        }
        if lock.status != LockStatus::Locked {
            return Err(RegistryError::Conflict(
                "amendments attach to sealed records only".to_string(),
            ));
        }

        insert_amendment(&mut tx, &amendment).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(amendment)
    }

    async fn amendments_for(&self, id: Uuid) -> Result<Vec<Amendment>> {
        let rows = sqlx::query(
            "SELECT id, lock_id, kind, body, created_at FROM amendments \
             WHERE lock_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(amendment_from_row).collect()
    }
}
