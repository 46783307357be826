use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::{Config, validate_sql_identifier};
use crate::model::{ReadBook, ReadStatus, SeriesVolume};

/// Local reading history.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Books finished or in progress within the recency window.
    async fn list_candidate_books(&self) -> anyhow::Result<Vec<ReadBook>>;

    /// Volumes of `series_id` with a series index up to and including
    /// `up_to_index`, ascending.
    async fn list_series_volumes(
        &self,
        series_id: i64,
        up_to_index: f64,
    ) -> anyhow::Result<Vec<SeriesVolume>>;
}

#[derive(Debug, Clone)]
pub struct LibraryOptions {
    pub identifier_type: String,
    pub chapters_column: String,
    pub window_days: u32,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            identifier_type: "anilist".to_owned(),
            chapters_column: "custom_column_15".to_owned(),
            window_days: 30,
        }
    }
}

/// calibre-web's `app.db` opened read-only, with calibre's `metadata.db`
/// attached as schema `calibre`.
#[derive(Debug, Clone)]
pub struct CalibreLibrary {
    pool: SqlitePool,
    options: LibraryOptions,
}

impl CalibreLibrary {
    pub async fn open(
        app_db: &Path,
        metadata_db: &Path,
        options: LibraryOptions,
    ) -> anyhow::Result<Self> {
        validate_sql_identifier(&options.chapters_column).context("invalid chapters column")?;
        for (label, path) in [("app.db", app_db), ("metadata.db", metadata_db)] {
            if !path.is_file() {
                anyhow::bail!("{label} not found: {}", path.display());
            }
        }

        let metadata_db = metadata_db.to_string_lossy().into_owned();
        let connect_options = SqliteConnectOptions::new()
            .filename(app_db)
            .read_only(true);

        // One connection: the attach only applies to the connection it ran on.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .after_connect(move |conn, _meta| {
                let metadata_db = metadata_db.clone();
                Box::pin(async move {
                    sqlx::query("ATTACH DATABASE ? AS calibre")
                        .bind(metadata_db)
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .with_context(|| format!("open calibre-web database: {}", app_db.display()))?;

        Ok(Self { pool, options })
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::open(
            &config.app_db,
            &config.metadata_db,
            LibraryOptions {
                identifier_type: config.identifier_type.clone(),
                chapters_column: config.chapters_column.clone(),
                window_days: config.window_days,
            },
        )
        .await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    fn cutoff(&self) -> anyhow::Result<String> {
        let window = TimeDelta::try_days(i64::from(self.options.window_days))
            .ok_or_else(|| anyhow::anyhow!("window_days out of range"))?;
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .ok_or_else(|| anyhow::anyhow!("window_days out of range"))?;
        // calibre-web stores naive UTC timestamps as text.
        Ok(cutoff.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

const CANDIDATE_BOOKS_SQL: &str = "
WITH latest_progress AS (
    SELECT
        krs.book_id,
        krs.user_id,
        kb.progress_percent,
        ROW_NUMBER() OVER (
            PARTITION BY krs.book_id, krs.user_id ORDER BY kb.last_modified DESC
        ) AS rn
    FROM kobo_reading_state krs
    INNER JOIN kobo_bookmark kb ON kb.kobo_reading_state_id = krs.id
),
ranked_books AS (
    SELECT
        b.id AS book_id,
        b.title AS book_name,
        s.id AS series_id,
        CAST(b.series_index AS REAL) AS book_series_index,
        i.val AS tracker_id,
        brl.read_status AS read_status,
        CAST(lp.progress_percent AS REAL) AS progress_percent,
        ROW_NUMBER() OVER (PARTITION BY s.id ORDER BY b.series_index DESC) AS rn
    FROM book_read_link brl
    INNER JOIN calibre.books b ON b.id = brl.book_id
    LEFT JOIN calibre.books_series_link bsl ON bsl.book = b.id
    LEFT JOIN calibre.series s ON s.id = bsl.series
    LEFT JOIN calibre.identifiers i ON i.book = b.id AND i.type = ?1
    LEFT JOIN latest_progress lp
        ON lp.book_id = brl.book_id AND lp.user_id = brl.user_id AND lp.rn = 1
    WHERE brl.last_modified > ?2
      AND brl.read_status IN (1, 2)
)
SELECT
    book_id,
    book_name,
    series_id,
    book_series_index,
    tracker_id,
    read_status,
    progress_percent
FROM ranked_books
WHERE rn = 1 OR series_id IS NULL
ORDER BY series_id, book_series_index DESC
";

#[derive(Debug, sqlx::FromRow)]
struct ReadBookRow {
    book_id: i64,
    book_name: String,
    series_id: Option<i64>,
    book_series_index: Option<f64>,
    tracker_id: Option<String>,
    read_status: i64,
    progress_percent: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct SeriesVolumeRow {
    book_id: i64,
    book_name: String,
    book_series_index: Option<f64>,
    tracker_id: Option<String>,
    chapters: Option<i64>,
}

fn series_volumes_sql(chapters_column: &str) -> String {
    format!(
        "
SELECT
    b.id AS book_id,
    b.title AS book_name,
    CAST(b.series_index AS REAL) AS book_series_index,
    i.val AS tracker_id,
    CAST(c.value AS INTEGER) AS chapters
FROM calibre.books b
INNER JOIN calibre.books_series_link bsl ON b.id = bsl.book
LEFT JOIN calibre.identifiers i ON b.id = i.book AND i.type = ?1
LEFT JOIN calibre.{chapters_column} c ON b.id = c.book
WHERE bsl.series = ?2
  AND b.series_index <= ?3
ORDER BY b.series_index
"
    )
}

/// Identifier values are free text in calibre; anything that is not a
/// positive integer is treated as no tracker id.
pub fn parse_tracker_id(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

#[async_trait]
impl ReadingSource for CalibreLibrary {
    async fn list_candidate_books(&self) -> anyhow::Result<Vec<ReadBook>> {
        let cutoff = self.cutoff()?;
        let rows: Vec<ReadBookRow> = sqlx::query_as(CANDIDATE_BOOKS_SQL)
            .bind(&self.options.identifier_type)
            .bind(&cutoff)
            .fetch_all(&self.pool)
            .await
            .context("query read books")?;

        tracing::debug!(rows = rows.len(), since = %cutoff, "read books");

        Ok(rows
            .into_iter()
            .map(|row| ReadBook {
                book_id: row.book_id,
                name: row.book_name,
                series_id: row.series_id,
                series_index: row.book_series_index.unwrap_or(0.0),
                tracker_id: parse_tracker_id(row.tracker_id.as_deref()),
                progress_percent: row.progress_percent.unwrap_or(0.0),
                read_status: ReadStatus::from_calibre_web(row.read_status),
            })
            .collect())
    }

    async fn list_series_volumes(
        &self,
        series_id: i64,
        up_to_index: f64,
    ) -> anyhow::Result<Vec<SeriesVolume>> {
        let sql = series_volumes_sql(&self.options.chapters_column);
        let rows: Vec<SeriesVolumeRow> = sqlx::query_as(&sql)
            .bind(&self.options.identifier_type)
            .bind(series_id)
            .bind(up_to_index)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query volumes of series {series_id}"))?;

        Ok(rows
            .into_iter()
            .map(|row| SeriesVolume {
                book_id: row.book_id,
                name: row.book_name,
                series_index: row.book_series_index.unwrap_or(0.0),
                tracker_id: parse_tracker_id(row.tracker_id.as_deref()),
                chapters: row
                    .chapters
                    .map(|c| u32::try_from(c.max(0)).unwrap_or(u32::MAX)),
            })
            .collect())
    }
}
