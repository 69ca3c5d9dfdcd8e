use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

use crate::kernel::stores::StoreError;

pub const PLATFORM_TWITTER: &str = "twitter";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub username: String,
}

impl Author {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// A post observed on the social platform. Never mutated after insert.
#[derive(Debug, Clone, FromRow, TypedBuilder)]
pub struct Post {
    #[builder(setter(into))]
    pub id: String,
    #[builder(setter(transform = |author: Author| Json(author)))]
    pub author: Json<Author>,
    #[builder(setter(into))]
    pub text: String,
    #[builder(default)]
    pub likes: i64,
    #[builder(default)]
    pub shares: i64,
    #[builder(default)]
    pub replies: i64,
    #[builder(default = PLATFORM_TWITTER.to_string(), setter(into))]
    pub platform: String,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    /// Insertion order, assigned by the store.
    #[builder(default)]
    pub seq: i64,
}

impl Post {
    /// Insert a batch, skipping ids that already exist. Returns the number of
    /// rows actually inserted.
    pub async fn insert_many(posts: &[Post], pool: &PgPool) -> Result<u64, StoreError> {
        let mut tx = pool.begin().await?;
        let mut inserted = 0;

        for post in posts {
            let result = sqlx::query(
                r#"
                INSERT INTO posts (id, author, text, likes, shares, replies, platform, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&post.id)
            .bind(&post.author)
            .bind(&post.text)
            .bind(post.likes)
            .bind(post.shares)
            .bind(post.replies)
            .bind(&post.platform)
            .bind(post.created_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn find_by_id(id: &str, pool: &PgPool) -> Result<Option<Self>, StoreError> {
        let post = sqlx::query_as::<_, Self>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(post)
    }

    /// Oldest post without a haiku (anti-join).
    pub async fn find_oldest_unprocessed(pool: &PgPool) -> Result<Option<Self>, StoreError> {
        let post = sqlx::query_as::<_, Self>(
            r#"
            SELECT p.*
            FROM posts p
            WHERE NOT EXISTS (SELECT 1 FROM haikus h WHERE h.post_id = p.id)
            ORDER BY p.created_at ASC, p.seq ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(pool)
        .await?;

        Ok(post)
    }
}
