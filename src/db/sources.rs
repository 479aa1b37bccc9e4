//! Source replacement, normalization, and domain migration.

use crate::error::DatabaseError;
use crate::types::{SeriesId, SourceId, SourceScanStatus};
use crate::{Error, Result};
use url::Url;

use super::{Database, Source};

/// Column list shared by every source SELECT
const SOURCE_COLUMNS: &str = "id, series_id, source_url, source_domain, manga_slug, priority, \
     is_enabled, last_chapter_count, last_chapter_number, last_scan_status, last_scan_error, \
     last_scan_at, created_at";

/// A source URL after trimming, parsing, and field derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSource {
    /// Canonical URL string
    pub url: String,
    /// Hostname
    pub domain: String,
    /// Last non-empty path segment
    pub slug: String,
}

/// One rewritten source URL in a domain migration
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct MigratedUrl {
    /// URL before the hostname swap
    pub old_url: String,
    /// URL after the hostname swap
    pub new_url: String,
}

/// Outcome of a domain migration request
#[derive(Debug, Clone)]
pub enum DomainMigration {
    /// Nothing mutated; preview of what a live run would touch
    DryRun {
        /// Number of source rows that would change
        affected_count: u64,
        /// Up to ten example rewrites
        sample: Vec<MigratedUrl>,
    },
    /// Rows were rewritten
    Applied {
        /// Number of source rows changed
        updated_count: u64,
    },
}

/// Normalize a set of source URLs: trim, parse, derive domain and slug,
/// dedupe preserving input order, and enforce the 1-3 bound.
pub fn normalize_source_urls(urls: &[String]) -> Result<Vec<NormalizedSource>> {
    let mut normalized: Vec<NormalizedSource> = Vec::new();

    for raw in urls {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parsed = Url::parse(trimmed)
            .map_err(|e| Error::Validation(format!("invalid source URL {:?}: {}", trimmed, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::Validation(format!(
                "source URL {:?} must use http or https",
                trimmed
            )));
        }
        let domain = parsed
            .host_str()
            .ok_or_else(|| {
                Error::Validation(format!("source URL {:?} has no hostname", trimmed))
            })?
            .to_string();
        let slug = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Validation(format!("source URL {:?} has no path segment", trimmed))
            })?;

        let url = parsed.to_string();
        if normalized.iter().any(|s| s.url == url) {
            continue;
        }
        normalized.push(NormalizedSource { url, domain, slug });
    }

    if normalized.is_empty() || normalized.len() > 3 {
        return Err(Error::Validation(format!(
            "1-3 unique source URLs required, got {}",
            normalized.len()
        )));
    }

    Ok(normalized)
}

/// Rewrite only the hostname of a URL; path, query, and fragment survive
fn replace_host(url_str: &str, new_domain: &str) -> Result<String> {
    let mut parsed = Url::parse(url_str)
        .map_err(|e| Error::Validation(format!("stored source URL {:?} is invalid: {}", url_str, e)))?;
    parsed
        .set_host(Some(new_domain))
        .map_err(|e| Error::Validation(format!("invalid domain {:?}: {}", new_domain, e)))?;
    Ok(parsed.to_string())
}

impl Database {
    /// All sources of a series, priority ascending
    pub async fn get_sources(&self, series_id: SeriesId) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, Source>(&format!(
            "SELECT {} FROM sources WHERE series_id = ? ORDER BY priority ASC",
            SOURCE_COLUMNS
        ))
        .bind(series_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get sources: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Enabled sources of a series, priority ascending
    pub async fn get_enabled_sources(&self, series_id: SeriesId) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, Source>(&format!(
            "SELECT {} FROM sources WHERE series_id = ? AND is_enabled = 1 ORDER BY priority ASC",
            SOURCE_COLUMNS
        ))
        .bind(series_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get enabled sources: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Replace the full source set of a series atomically.
    ///
    /// Priorities are reassigned 1-based in input order and the series'
    /// denormalized primary-source fields follow the new priority-1 source.
    pub async fn replace_sources(
        &self,
        series_id: SeriesId,
        urls: &[String],
    ) -> Result<Vec<Source>> {
        let normalized = normalize_source_urls(urls)?;

        if self.get_series(series_id).await?.is_none() {
            return Err(Error::NotFound(format!("series {}", series_id)));
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query("DELETE FROM sources WHERE series_id = ?")
            .bind(series_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear sources: {}",
                    e
                )))
            })?;

        for (index, source) in normalized.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sources (
                    series_id, source_url, source_domain, manga_slug,
                    priority, is_enabled, created_at
                ) VALUES (?, ?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(series_id)
            .bind(&source.url)
            .bind(&source.domain)
            .bind(&source.slug)
            .bind((index + 1) as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert source: {}",
                    e
                )))
            })?;
        }

        let primary = &normalized[0];
        sqlx::query(
            r#"
            UPDATE series SET
                manga_url = ?, source_domain = ?, manga_slug = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&primary.url)
        .bind(&primary.domain)
        .bind(&primary.slug)
        .bind(now)
        .bind(series_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update primary source fields: {}",
                e
            )))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit source replacement: {}",
                e
            )))
        })?;

        self.get_sources(series_id).await
    }

    /// Record the per-source outcome of a scan
    pub async fn record_source_scan(
        &self,
        source_id: SourceId,
        status: SourceScanStatus,
        chapter_count: Option<i64>,
        last_chapter: Option<f64>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE sources SET
                last_scan_status = ?,
                last_chapter_count = COALESCE(?, last_chapter_count),
                last_chapter_number = COALESCE(?, last_chapter_number),
                last_scan_error = ?,
                last_scan_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.to_i32())
        .bind(chapter_count)
        .bind(last_chapter)
        .bind(error)
        .bind(now)
        .bind(source_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record source scan: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Move sources from one hostname to another.
    ///
    /// Only the hostname is replaced; path, query, and fragment are
    /// preserved byte for byte. `series_ids` optionally narrows the
    /// migration; `dry_run` previews without mutating. Series whose
    /// priority-1 source moved get their denormalized fields resynced.
    pub async fn update_domain(
        &self,
        old_domain: &str,
        new_domain: &str,
        series_ids: Option<&[i64]>,
        dry_run: bool,
    ) -> Result<DomainMigration> {
        if old_domain.trim().is_empty() || new_domain.trim().is_empty() {
            return Err(Error::Validation(
                "old_domain and new_domain must not be empty".to_string(),
            ));
        }
        if let Some(ids) = series_ids
            && ids.len() > 200
        {
            return Err(Error::Validation(
                "series_ids is limited to 200 entries".to_string(),
            ));
        }

        let candidates = sqlx::query_as::<_, Source>(&format!(
            "SELECT {} FROM sources WHERE source_domain = ? ORDER BY id ASC",
            SOURCE_COLUMNS
        ))
        .bind(old_domain)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query sources for migration: {}",
                e
            )))
        })?;

        let candidates: Vec<&Source> = match series_ids {
            Some(ids) => {
                let allowed: std::collections::HashSet<i64> = ids.iter().copied().collect();
                candidates
                    .iter()
                    .filter(|s| allowed.contains(&s.series_id.get()))
                    .collect()
            }
            None => candidates.iter().collect(),
        };

        let mut rewrites: Vec<(SourceId, SeriesId, i64, MigratedUrl)> = Vec::new();
        for source in &candidates {
            let new_url = replace_host(&source.source_url, new_domain)?;
            rewrites.push((
                source.id,
                source.series_id,
                source.priority,
                MigratedUrl {
                    old_url: source.source_url.clone(),
                    new_url,
                },
            ));
        }

        if dry_run {
            return Ok(DomainMigration::DryRun {
                affected_count: rewrites.len() as u64,
                sample: rewrites
                    .iter()
                    .take(10)
                    .map(|(_, _, _, m)| m.clone())
                    .collect(),
            });
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        for (source_id, series_id, priority, migrated) in &rewrites {
            sqlx::query("UPDATE sources SET source_url = ?, source_domain = ? WHERE id = ?")
                .bind(&migrated.new_url)
                .bind(new_domain)
                .bind(source_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to migrate source: {}",
                        e
                    )))
                })?;

            // Resync the denormalized fields where the primary source moved
            if *priority == 1 {
                sqlx::query(
                    r#"
                    UPDATE series SET
                        manga_url = ?, source_domain = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&migrated.new_url)
                .bind(new_domain)
                .bind(now)
                .bind(series_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to resync series source fields: {}",
                        e
                    )))
                })?;
            }
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit domain migration: {}",
                e
            )))
        })?;

        Ok(DomainMigration::Applied {
            updated_count: rewrites.len() as u64,
        })
    }
}
