//! Repository for the `whitelist_entries` table.

use sqlx::PgPool;

use crate::models::whitelist::WhitelistEntry;

const COLUMNS: &str = "id, subject, category, created_at";

/// Provides CRUD operations for whitelist entries.
pub struct WhitelistRepo;

impl WhitelistRepo {
    /// Insert `(subject, category)` if absent.
    ///
    /// Returns the stored entry and whether this call created it.
    pub async fn insert(
        pool: &PgPool,
        subject: &str,
        category: &str,
    ) -> Result<(WhitelistEntry, bool), sqlx::Error> {
        let query = format!(
            "INSERT INTO whitelist_entries (subject, category) VALUES ($1, $2) \
             ON CONFLICT (subject, category) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, WhitelistEntry>(&query)
            .bind(subject)
            .bind(category)
            .fetch_optional(pool)
            .await?;

        match inserted {
            Some(entry) => Ok((entry, true)),
            None => {
                let existing = Self::find(pool, subject, category)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok((existing, false))
            }
        }
    }

    /// Delete an entry. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, subject: &str, category: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM whitelist_entries WHERE subject = $1 AND category = $2")
                .bind(subject)
                .bind(category)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Exact-match lookup.
    pub async fn find(
        pool: &PgPool,
        subject: &str,
        category: &str,
    ) -> Result<Option<WhitelistEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM whitelist_entries WHERE subject = $1 AND category = $2"
        );
        sqlx::query_as::<_, WhitelistEntry>(&query)
            .bind(subject)
            .bind(category)
            .fetch_optional(pool)
            .await
    }

    /// List entries, optionally for a single subject.
    pub async fn list(
        pool: &PgPool,
        subject: Option<&str>,
    ) -> Result<Vec<WhitelistEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM whitelist_entries \
             WHERE ($1::TEXT IS NULL OR subject = $1) \
             ORDER BY id"
        );
        sqlx::query_as::<_, WhitelistEntry>(&query)
            .bind(subject)
            .fetch_all(pool)
            .await
    }
}
