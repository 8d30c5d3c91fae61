use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::dialect::{is_unique_violation, placeholders};
use crate::application::ports::{BinaryCatalog, CatalogError, ReferenceResolver};
use crate::domain::entities::{BinaryRecord, CatalogStats};
use crate::domain::value_objects::{BinaryInfo, ContentHash};

/// Bind values per `IN (...)` list
const SEARCH_CHUNK: usize = 500;

/// Rows fetched per page while collecting deletion candidates
const CANDIDATE_PAGE: i64 = 1000;

const RECORD_SELECT: &str =
    "SELECT primary_hash, secondary_hash, length, created_at_ms FROM binaries";

pub struct SqlBinaryCatalog {
    pool: AnyPool,
}

impl SqlBinaryCatalog {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl BinaryCatalog for SqlBinaryCatalog {
    async fn init(&self) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS binaries (
                primary_hash VARCHAR(64) NOT NULL PRIMARY KEY,
                secondary_hash VARCHAR(128) NOT NULL,
                length BIGINT NOT NULL,
                created_at_ms BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, CatalogError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT CAST(COUNT(*) AS BIGINT) FROM binaries WHERE primary_hash = $1",
        )
        .bind(hash.as_hex())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }

    async fn load(&self, hash: &ContentHash) -> Result<Option<BinaryRecord>, CatalogError> {
        let row = sqlx::query_as::<_, BinaryRow>(&format!(
            "{} WHERE primary_hash = $1",
            RECORD_SELECT
        ))
        .bind(hash.as_hex())
        .fetch_optional(&self.pool)
        .await?;

        row.map(BinaryRow::into_domain).transpose()
    }

    async fn create(&self, info: &BinaryInfo) -> Result<BinaryRecord, CatalogError> {
        // Millisecond precision so the returned record equals a later load
        let created_at_ms = Utc::now().timestamp_millis();
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms)
            .ok_or_else(|| CatalogError::Corrupt(format!("timestamp {}", created_at_ms)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO binaries (primary_hash, secondary_hash, length, created_at_ms)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(info.primary_hash().as_hex())
        .bind(info.secondary_hash())
        .bind(info.length() as i64)
        .bind(created_at_ms)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(BinaryRecord::reconstruct(info.clone(), created_at)),
            Err(e) if is_unique_violation(&e) => {
                debug!(hash = %info.primary_hash(), "Catalog insert lost to concurrent writer");
                Err(CatalogError::DuplicateKey(info.primary_hash().to_string()))
            }
            Err(e) => Err(CatalogError::Database(e)),
        }
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM binaries WHERE primary_hash = $1")
            .bind(hash.as_hex())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, hashes: &[ContentHash]) -> Result<Vec<BinaryRecord>, CatalogError> {
        let mut records = Vec::new();

        for chunk in hashes.chunks(SEARCH_CHUNK) {
            let sql = format!(
                "{} WHERE primary_hash IN ({})",
                RECORD_SELECT,
                placeholders(1, chunk.len())
            );
            let mut query = sqlx::query_as::<_, BinaryRow>(&sql);
            for hash in chunk {
                query = query.bind(hash.as_hex());
            }

            for row in query.fetch_all(&self.pool).await? {
                records.push(row.into_domain()?);
            }
        }

        Ok(records)
    }

    async fn find_all(&self) -> Result<Vec<BinaryRecord>, CatalogError> {
        let rows = sqlx::query_as::<_, BinaryRow>(&format!(
            "{} ORDER BY primary_hash",
            RECORD_SELECT
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BinaryRow::into_domain).collect()
    }

    async fn count_and_size(&self) -> Result<CatalogStats, CatalogError> {
        let (count, total) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT CAST(COUNT(*) AS BIGINT), CAST(COALESCE(SUM(length), 0) AS BIGINT)
            FROM binaries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogStats::new(count.max(0) as u64, total.max(0) as u64))
    }

    async fn find_deletion_candidates(
        &self,
        resolver: Arc<dyn ReferenceResolver>,
        min_age: Duration,
    ) -> Result<Vec<BinaryRecord>, CatalogError> {
        let min_age_ms = i64::try_from(min_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff_ms = Utc::now().timestamp_millis().saturating_sub(min_age_ms);

        let mut candidates = Vec::new();
        let mut cursor = String::new();

        // Keyset paging keeps each resolver call bounded
        loop {
            let rows = sqlx::query_as::<_, BinaryRow>(&format!(
                "{} WHERE primary_hash > $1 AND created_at_ms <= $2 ORDER BY primary_hash LIMIT $3",
                RECORD_SELECT
            ))
            .bind(cursor.clone())
            .bind(cutoff_ms)
            .bind(CANDIDATE_PAGE)
            .fetch_all(&self.pool)
            .await?;

            let Some(last) = rows.last() else {
                break;
            };
            cursor = last.primary_hash.clone();
            let page_full = rows.len() as i64 == CANDIDATE_PAGE;

            let page = rows
                .into_iter()
                .map(BinaryRow::into_domain)
                .collect::<Result<Vec<_>, _>>()?;
            let hashes: Vec<ContentHash> =
                page.iter().map(|r| r.primary_hash().clone()).collect();
            let referenced = resolver
                .referenced(&hashes)
                .await
                .map_err(|e| CatalogError::Resolver(e.to_string()))?;

            candidates.extend(
                page.into_iter()
                    .filter(|record| !referenced.contains(record.primary_hash())),
            );

            if !page_full {
                break;
            }
        }

        debug!(candidates = candidates.len(), "Collected deletion candidates");
        Ok(candidates)
    }
}

#[derive(sqlx::FromRow)]
struct BinaryRow {
    primary_hash: String,
    secondary_hash: String,
    length: i64,
    created_at_ms: i64,
}

impl BinaryRow {
    fn into_domain(self) -> Result<BinaryRecord, CatalogError> {
        let hash = ContentHash::from_hex(self.primary_hash)
            .map_err(|e| CatalogError::Corrupt(e.to_string()))?;
        let length = u64::try_from(self.length)
            .map_err(|_| CatalogError::Corrupt(format!("{}: negative length", hash)))?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(self.created_at_ms)
            .ok_or_else(|| CatalogError::Corrupt(format!("{}: bad timestamp", hash)))?;

        Ok(BinaryRecord::reconstruct(
            BinaryInfo::new(hash, self.secondary_hash, length),
            created_at,
        ))
    }
}
