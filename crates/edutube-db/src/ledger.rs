//! Failure ledger in SQLite.
//!
//! Implements [`FailureLedger`] over the `failed_items` table, keyed by
//! `(harvester, item_id)` so one harvester's failures never hide an item from
//! another.

use chrono::{DateTime, Utc};
use edutube_core::config::HarvesterKind;
use edutube_core::error::AppError;
use edutube_core::models::FailedItem;
use edutube_core::traits::FailureLedger;
use sqlx::SqlitePool;

/// SQLite implementation of the failure ledger.
#[derive(Clone)]
pub struct SqliteFailureLedger {
    pool: SqlitePool,
}

impl SqliteFailureLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ledger entries for one harvester, oldest first.
    pub async fn list(&self, harvester: HarvesterKind) -> Result<Vec<FailedItem>, AppError> {
        let rows: Vec<FailedRow> = sqlx::query_as(
            r#"
            SELECT harvester, item_id, reason, failed_at
            FROM failed_items
            WHERE harvester = ?
            ORDER BY failed_at, item_id
            "#,
        )
        .bind(harvester.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(FailedItem::from).collect())
    }

    /// Removes every entry of one harvester so its items are retried.
    pub async fn clear(&self, harvester: HarvesterKind) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM failed_items WHERE harvester = ?")
            .bind(harvester.as_str())
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}

/// Helper struct for deserializing ledger rows.
#[derive(sqlx::FromRow)]
struct FailedRow {
    harvester: String,
    item_id: String,
    reason: String,
    failed_at: DateTime<Utc>,
}

impl From<FailedRow> for FailedItem {
    fn from(row: FailedRow) -> Self {
        Self {
            harvester: row.harvester,
            item_id: row.item_id,
            reason: row.reason,
            failed_at: row.failed_at,
        }
    }
}

// =============================================================================
// FailureLedger Trait Implementation
// =============================================================================

impl FailureLedger for SqliteFailureLedger {
    async fn mark_failed(
        &self,
        harvester: HarvesterKind,
        item: &str,
        reason: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO failed_items (harvester, item_id, reason, failed_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(harvester.as_str())
        .bind(item)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    async fn is_failed(&self, harvester: HarvesterKind, item: &str) -> Result<bool, AppError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM failed_items WHERE harvester = ? AND item_id = ?",
        )
        .bind(harvester.as_str())
        .bind(item)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(found.is_some())
    }
}
