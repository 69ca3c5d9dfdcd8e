use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;

use crate::common::HaikuId;
use crate::domains::posts::models::Post;
use crate::kernel::stores::StoreError;

// ============================================================================
// State
// ============================================================================

/// Lifecycle of a haiku.
///
/// ```text
/// Created → SummaryGetting → SummaryGot → HaikuTextGetting → HaikuTextGot → Commenting → Done
///     └──────────────┴──────────────┴──────────────┴──────────────┴──────────────┴─► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "haiku_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HaikuState {
    Created,
    SummaryGetting,
    SummaryGot,
    HaikuTextGetting,
    HaikuTextGot,
    Commenting,
    Done,
    Failed,
}

impl HaikuState {
    /// The forward path, in order.
    pub const FORWARD_PATH: [HaikuState; 7] = [
        HaikuState::Created,
        HaikuState::SummaryGetting,
        HaikuState::SummaryGot,
        HaikuState::HaikuTextGetting,
        HaikuState::HaikuTextGot,
        HaikuState::Commenting,
        HaikuState::Done,
    ];

    pub const NON_TERMINAL: [HaikuState; 6] = [
        HaikuState::Created,
        HaikuState::SummaryGetting,
        HaikuState::SummaryGot,
        HaikuState::HaikuTextGetting,
        HaikuState::HaikuTextGot,
        HaikuState::Commenting,
    ];

    /// States that mark an external call in flight.
    pub const TRANSITIONAL: [HaikuState; 3] = [
        HaikuState::SummaryGetting,
        HaikuState::HaikuTextGetting,
        HaikuState::Commenting,
    ];

    /// Next state on the forward path; `None` for terminal states.
    pub fn next(self) -> Option<HaikuState> {
        match self {
            Self::Created => Some(Self::SummaryGetting),
            Self::SummaryGetting => Some(Self::SummaryGot),
            Self::SummaryGot => Some(Self::HaikuTextGetting),
            Self::HaikuTextGetting => Some(Self::HaikuTextGot),
            Self::HaikuTextGot => Some(Self::Commenting),
            Self::Commenting => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn is_transitional(self) -> bool {
        Self::TRANSITIONAL.contains(&self)
    }

    /// Forward by exactly one step, or into `Failed` from any non-terminal state.
    pub fn can_transition_to(self, to: HaikuState) -> bool {
        match to {
            Self::Failed => !self.is_terminal(),
            _ => self.next() == Some(to),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::SummaryGetting => "summary_getting",
            Self::SummaryGot => "summary_got",
            Self::HaikuTextGetting => "haiku_text_getting",
            Self::HaikuTextGot => "haiku_text_got",
            Self::Commenting => "commenting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for HaikuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Record
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct Haiku {
    pub id: HaikuId,
    pub post_id: String,
    pub state: HaikuState,
    pub summary: Option<String>,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub seq: i64,
    /// Loaded on request, see [`PostJoin`].
    #[sqlx(skip)]
    pub post: Option<Post>,
}

/// Whether work selection should also load the haiku's post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostJoin {
    Skip,
    Load,
}

/// New state plus any fields written in the same transaction.
///
/// `None` fields keep their current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaikuChange {
    pub state: HaikuState,
    pub summary: Option<String>,
    pub text: Option<String>,
}

impl HaikuChange {
    pub fn to(state: HaikuState) -> Self {
        Self {
            state,
            summary: None,
            text: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Result of a check-and-set on one haiku row.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    Committed(Haiku),
    /// The row was not in an allowed state; carries the row as found.
    Conflict(Haiku),
    NotFound,
}

// ============================================================================
// Queries
// ============================================================================

impl Haiku {
    pub async fn insert(post_id: &str, pool: &PgPool) -> Result<Self, StoreError> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO haikus (id, post_id, state)
            VALUES ($1, $2, 'created')
            RETURNING id, post_id, state, summary, text, created_at, updated_at, seq
            "#,
        )
        .bind(HaikuId::new())
        .bind(post_id)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StoreError::DuplicateHaiku(post_id.to_string());
                }
                if db.is_foreign_key_violation() {
                    return StoreError::UnknownPost(post_id.to_string());
                }
            }
            StoreError::Database(e)
        })
    }

    pub async fn find_by_id(id: HaikuId, pool: &PgPool) -> Result<Option<Self>, StoreError> {
        let haiku = sqlx::query_as::<_, Self>(
            "SELECT id, post_id, state, summary, text, created_at, updated_at, seq FROM haikus WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(haiku)
    }

    /// Oldest haiku in `state`, ties broken by insertion order.
    pub async fn find_oldest_in_state(
        state: HaikuState,
        pool: &PgPool,
    ) -> Result<Option<Self>, StoreError> {
        let haiku = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, post_id, state, summary, text, created_at, updated_at, seq
            FROM haikus
            WHERE state = $1
            ORDER BY created_at ASC, seq ASC
            LIMIT 1
            "#,
        )
        .bind(state)
        .fetch_optional(pool)
        .await?;

        Ok(haiku)
    }

    /// Haikus parked in one of `states` since before `updated_before`.
    pub async fn find_stale(
        states: &[HaikuState],
        updated_before: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<Vec<Self>, StoreError> {
        let haikus = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, post_id, state, summary, text, created_at, updated_at, seq
            FROM haikus
            WHERE state = ANY($1) AND updated_at < $2
            ORDER BY updated_at ASC, seq ASC
            "#,
        )
        .bind(states.to_vec())
        .bind(updated_before)
        .fetch_all(pool)
        .await?;

        Ok(haikus)
    }

    /// Check-and-set under a row lock.
    ///
    /// Begins a transaction, locks the row with `FOR UPDATE`, verifies its
    /// state is one of `allowed` and writes `change` before committing. A
    /// mismatch rolls back without writing.
    pub async fn compare_and_set(
        id: HaikuId,
        allowed: &[HaikuState],
        change: &HaikuChange,
        pool: &PgPool,
    ) -> Result<CasOutcome, StoreError> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, post_id, state, summary, text, created_at, updated_at, seq
            FROM haikus
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            return Ok(CasOutcome::NotFound);
        };

        if !allowed.contains(&current.state) {
            tx.rollback().await?;
            return Ok(CasOutcome::Conflict(current));
        }

        let updated = sqlx::query_as::<_, Self>(
            r#"
            UPDATE haikus
            SET state = $2,
                summary = COALESCE($3, summary),
                text = COALESCE($4, text),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, post_id, state, summary, text, created_at, updated_at, seq
            "#,
        )
        .bind(id)
        .bind(change.state)
        .bind(&change.summary)
        .bind(&change.text)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CasOutcome::Committed(updated))
    }

    /// Row counts per state, for operators.
    pub async fn count_by_state(pool: &PgPool) -> Result<Vec<(HaikuState, i64)>, StoreError> {
        let counts = sqlx::query_as::<_, (HaikuState, i64)>(
            "SELECT state, COUNT(*) FROM haikus GROUP BY state ORDER BY state",
        )
        .fetch_all(pool)
        .await?;

        Ok(counts)
    }
}
