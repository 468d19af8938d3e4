use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{InsertOutcome, RecordStore, StoreError, StoreResult};
use crate::models::{Expiry, TokenPatch, TokenRecord};

const TOKEN_COLUMNS: &str = "token, active, expire_at, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<TokenRecord>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TokenRecord::from))
    }

    async fn insert_if_absent(
        &self,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let inserted = sqlx::query_as::<_, TokenRow>(&format!(
            r#"INSERT INTO tokens (token, active, expire_at, created_at)
               VALUES ($1, false, NULL, $2)
               ON CONFLICT (token) DO NOTHING
               RETURNING {TOKEN_COLUMNS}"#
        ))
        .bind(token)
        .bind(created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome {
                record: row.into(),
                created: true,
            });
        }

        // Lost the race (or the token already existed): report the stored row.
        let existing = self
            .find_by_token(token)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        Ok(InsertOutcome {
            record: existing,
            created: false,
        })
    }

    async fn update_fields(
        &self,
        token: &str,
        patch: &TokenPatch,
    ) -> StoreResult<Option<TokenRecord>> {
        // Single statement: the row lock taken by UPDATE makes the patch atomic.
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            r#"UPDATE tokens
               SET active = COALESCE($2, active),
                   expire_at = CASE WHEN $3 THEN $4 ELSE expire_at END,
                   updated_at = NOW()
               WHERE token = $1
               RETURNING {TOKEN_COLUMNS}"#
        ))
        .bind(token)
        .bind(patch.active)
        .bind(patch.expire_at.is_some())
        .bind(patch.expire_at.flatten())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TokenRecord::from))
    }

    async fn list_all(&self, order_by_created_desc: bool) -> StoreResult<Vec<TokenRecord>> {
        // The table has no insertion sequence; ascending created_at stands in for it.
        let order = if order_by_created_desc {
            "created_at DESC, token"
        } else {
            "created_at ASC, token"
        };
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens ORDER BY {order}"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TokenRecord::from).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct TokenRow {
    pub token: String,
    pub active: bool,
    pub expire_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<TokenRow> for TokenRecord {
    fn from(row: TokenRow) -> Self {
        TokenRecord {
            token: row.token,
            active: row.active,
            created_at: row.created_at,
            expire_at: row.expire_at.map(Expiry::At),
        }
    }
}
