use std::path::{Path, PathBuf};

use anyhow::Context as _;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const METADATA_SCHEMA: &[&str] = &[
    "CREATE TABLE books (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL DEFAULT 'Unknown',
        series_index REAL NOT NULL DEFAULT 1.0
    )",
    "CREATE TABLE series (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE books_series_link (
        id INTEGER PRIMARY KEY,
        book INTEGER NOT NULL,
        series INTEGER NOT NULL
    )",
    "CREATE TABLE identifiers (
        id INTEGER PRIMARY KEY,
        book INTEGER NOT NULL,
        type TEXT NOT NULL DEFAULT 'isbn',
        val TEXT NOT NULL
    )",
    "CREATE TABLE custom_column_15 (
        id INTEGER PRIMARY KEY,
        book INTEGER,
        value INTEGER NOT NULL
    )",
];

const APP_SCHEMA: &[&str] = &[
    "CREATE TABLE book_read_link (
        id INTEGER PRIMARY KEY,
        book_id INTEGER,
        user_id INTEGER,
        read_status INTEGER NOT NULL DEFAULT 0,
        last_modified DATETIME,
        last_time_started_reading DATETIME,
        times_started_reading INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE kobo_reading_state (
        id INTEGER PRIMARY KEY,
        user_id INTEGER,
        book_id INTEGER,
        last_modified DATETIME,
        priority_timestamp DATETIME
    )",
    "CREATE TABLE kobo_bookmark (
        id INTEGER PRIMARY KEY,
        kobo_reading_state_id INTEGER,
        last_modified DATETIME,
        location_source TEXT,
        location_type TEXT,
        location_value TEXT,
        progress_percent FLOAT,
        content_source_progress_percent FLOAT
    )",
];

pub const USER_ID: i64 = 1;

#[derive(Debug, Clone, Copy)]
pub struct FixtureBook<'a> {
    pub id: i64,
    pub title: &'a str,
    pub series: Option<i64>,
    pub series_index: f64,
    pub tracker_id: Option<&'a str>,
    pub chapters: Option<u32>,
}

/// calibre `metadata.db` + calibre-web `app.db` pair in a temp dir.
pub struct CalibreFixture {
    pub dir: tempfile::TempDir,
    pub app_db: PathBuf,
    pub metadata_db: PathBuf,
    app: SqlitePool,
    metadata: SqlitePool,
}

#[allow(dead_code)]
impl CalibreFixture {
    pub async fn create() -> anyhow::Result<Self> {
        let dir = tempfile::TempDir::new()?;
        let app_db = dir.path().join("app.db");
        let metadata_db = dir.path().join("metadata.db");

        let app = writable_pool(&app_db).await?;
        let metadata = writable_pool(&metadata_db).await?;
        for stmt in APP_SCHEMA {
            sqlx::query(stmt).execute(&app).await.context("create app schema")?;
        }
        for stmt in METADATA_SCHEMA {
            sqlx::query(stmt)
                .execute(&metadata)
                .await
                .context("create metadata schema")?;
        }

        Ok(Self {
            dir,
            app_db,
            metadata_db,
            app,
            metadata,
        })
    }

    pub async fn add_series(&self, id: i64, name: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO series (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(&self.metadata)
            .await?;
        Ok(())
    }

    pub async fn add_book(&self, book: FixtureBook<'_>) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO books (id, title, series_index) VALUES (?, ?, ?)")
            .bind(book.id)
            .bind(book.title)
            .bind(book.series_index)
            .execute(&self.metadata)
            .await?;
        if let Some(series) = book.series {
            sqlx::query("INSERT INTO books_series_link (book, series) VALUES (?, ?)")
                .bind(book.id)
                .bind(series)
                .execute(&self.metadata)
                .await?;
        }
        if let Some(tracker_id) = book.tracker_id {
            sqlx::query("INSERT INTO identifiers (book, type, val) VALUES (?, 'anilist', ?)")
                .bind(book.id)
                .bind(tracker_id)
                .execute(&self.metadata)
                .await?;
        }
        if let Some(chapters) = book.chapters {
            sqlx::query("INSERT INTO custom_column_15 (book, value) VALUES (?, ?)")
                .bind(book.id)
                .bind(i64::from(chapters))
                .execute(&self.metadata)
                .await?;
        }
        Ok(())
    }

    /// `read_status`: 1 finished, 2 in progress.
    pub async fn mark_read(&self, book_id: i64, read_status: i64, days_ago: u32) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO book_read_link (book_id, user_id, read_status, last_modified)
             VALUES (?, ?, ?, datetime('now', ?))",
        )
        .bind(book_id)
        .bind(USER_ID)
        .bind(read_status)
        .bind(format!("-{days_ago} day"))
        .execute(&self.app)
        .await?;
        Ok(())
    }

    pub async fn add_bookmark(&self, book_id: i64, percent: f64, minutes_ago: u32) -> anyhow::Result<()> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM kobo_reading_state WHERE book_id = ? AND user_id = ?",
        )
        .bind(book_id)
        .bind(USER_ID)
        .fetch_optional(&self.app)
        .await?;
        let state_id = match existing {
            Some(id) => id,
            None => sqlx::query(
                "INSERT INTO kobo_reading_state (user_id, book_id, last_modified)
                 VALUES (?, ?, datetime('now'))",
            )
            .bind(USER_ID)
            .bind(book_id)
            .execute(&self.app)
            .await?
            .last_insert_rowid(),
        };
        sqlx::query(
            "INSERT INTO kobo_bookmark (kobo_reading_state_id, last_modified, progress_percent)
             VALUES (?, datetime('now', ?), ?)",
        )
        .bind(state_id)
        .bind(format!("-{minutes_ago} minutes"))
        .bind(percent)
        .execute(&self.app)
        .await?;
        Ok(())
    }

    /// Closes the writable handles so the library can open the files
    /// read-only.
    pub async fn finish(self) -> (tempfile::TempDir, PathBuf, PathBuf) {
        self.app.close().await;
        self.metadata.close().await;
        (self.dir, self.app_db, self.metadata_db)
    }
}

async fn writable_pool(path: &Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("open fixture db: {}", path.display()))
}

/// The "Saga" series from the reconciliation examples: three volumes with
/// 10, 12 and 8 chapters, tracked as AniList media 30013.
#[allow(dead_code)]
pub async fn saga(fixture: &CalibreFixture) -> anyhow::Result<()> {
    fixture.add_series(1, "Saga").await?;
    for (idx, chapters) in [10u32, 12, 8].into_iter().enumerate() {
        let id = idx as i64 + 1;
        let title = format!("Vol.{id}");
        fixture
            .add_book(FixtureBook {
                id,
                title: &title,
                series: Some(1),
                series_index: id as f64,
                tracker_id: Some("30013"),
                chapters: Some(chapters),
            })
            .await?;
    }
    Ok(())
}
