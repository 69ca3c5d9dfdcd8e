use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::kernel::stores::StoreError;

/// Monthly budget of search calls against the social platform.
#[derive(Debug, Clone, FromRow)]
pub struct FetchQuota {
    pub period: String,
    pub used: i32,
    pub updated_at: DateTime<Utc>,
}

impl FetchQuota {
    /// Quota period for `now`: the UTC month as `YYYY-MM`.
    pub fn period_for(now: DateTime<Utc>) -> String {
        now.format("%Y-%m").to_string()
    }

    /// Take one unit of `period`'s budget if fewer than `limit` are used.
    ///
    /// A single upsert, so concurrent claims cannot overshoot the limit.
    pub async fn claim(period: &str, limit: u32, pool: &PgPool) -> Result<bool, StoreError> {
        if limit == 0 {
            return Ok(false);
        }

        let claimed = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO fetch_quotas (period, used)
            VALUES ($1, 1)
            ON CONFLICT (period) DO UPDATE
                SET used = fetch_quotas.used + 1,
                    updated_at = NOW()
                WHERE fetch_quotas.used::BIGINT < $2
            RETURNING used
            "#,
        )
        .bind(period)
        .bind(i64::from(limit))
        .fetch_optional(pool)
        .await?;

        Ok(claimed.is_some())
    }

    pub async fn find(period: &str, pool: &PgPool) -> Result<Option<Self>, StoreError> {
        let quota = sqlx::query_as::<_, Self>("SELECT * FROM fetch_quotas WHERE period = $1")
            .bind(period)
            .fetch_optional(pool)
            .await?;

        Ok(quota)
    }
}
