use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::anilist::{AnilistClient, Tracker};
use crate::calibre::{CalibreLibrary, ReadingSource};
use crate::config::Config;
use crate::model::{PartialSync, ReadBook, ReconciliationDecision, SyncReport, TrackerEntry};
use crate::reconcile;

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Pause between books, keeps us under the tracker's global rate limit.
    pub pace: Duration,
}

pub struct Syncer {
    source: Arc<dyn ReadingSource>,
    tracker: Arc<dyn Tracker>,
    options: SyncOptions,
}

/// Opens the library and the AniList client described by `config` and runs
/// one sync over them.
pub async fn run(config: &Config, dry_run: bool) -> anyhow::Result<SyncReport> {
    if dry_run {
        tracing::warn!("DRYRUN MODE");
    }
    tracing::debug!(?config, "sync config");

    let library = CalibreLibrary::from_config(config)
        .await
        .context("open calibre library")?;
    let tracker = AnilistClient::from_config(config).context("build AniList client")?;

    let syncer = Syncer::new(
        Arc::new(library.clone()),
        Arc::new(tracker),
        SyncOptions {
            dry_run,
            pace: config.pace,
        },
    );
    let result = syncer.run().await;
    library.close().await;
    result
}

impl Syncer {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        tracker: Arc<dyn Tracker>,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            tracker,
            options,
        }
    }

    /// Reconciles every candidate book, one at a time.
    ///
    /// A failed tracker call aborts the run; the error carries a
    /// [`PartialSync`] context with the titles already written.
    pub async fn run(&self) -> anyhow::Result<SyncReport> {
        let books = self
            .source
            .list_candidate_books()
            .await
            .context("list candidate books")?;
        let candidates = select_candidates(books);
        tracing::info!(candidates = candidates.len(), "syncing");

        let mut report = SyncReport::default();
        let total = candidates.len();
        for (idx, (tracker_id, book)) in candidates.into_iter().enumerate() {
            if let Err(err) = self.sync_book(tracker_id, &book, &mut report).await {
                tracing::error!(title = %book.name, tracker_id, "sync aborted");
                return Err(err.context(PartialSync {
                    updated: report.updated.clone(),
                }));
            }

            if idx + 1 < total && !self.options.pace.is_zero() {
                tokio::time::sleep(self.options.pace).await;
            }
        }

        if report.updated.is_empty() && report.would_update.is_empty() {
            tracing::info!(
                processed = report.processed,
                skipped = report.skipped,
                "No updates required"
            );
        } else {
            tracing::info!(
                processed = report.processed,
                skipped = report.skipped,
                updated = report.updated.len(),
                would_update = report.would_update.len(),
                "sync finished"
            );
        }
        Ok(report)
    }

    async fn sync_book(
        &self,
        tracker_id: i64,
        book: &ReadBook,
        report: &mut SyncReport,
    ) -> anyhow::Result<()> {
        tracing::info!(
            title = %book.name,
            book_id = book.book_id,
            volume = book.series_index,
            read_status = ?book.read_status,
            "processing"
        );

        let volumes = match book.series_id {
            Some(series_id) => self
                .source
                .list_series_volumes(series_id, book.series_index)
                .await
                .with_context(|| format!("list volumes for {:?}", book.name))?,
            None => Vec::new(),
        };
        if volumes.is_empty() {
            tracing::error!(
                book_id = book.book_id,
                series_id = ?book.series_id,
                "couldn't find any books in series; skipping"
            );
            report.skipped += 1;
            return Ok(());
        }

        let entry = self
            .tracker
            .fetch_entry(tracker_id)
            .await
            .with_context(|| format!("fetch tracker entry for {:?}", book.name))?;

        let Some(decision) = reconcile::decide(book, &volumes, &entry) else {
            report.skipped += 1;
            return Ok(());
        };

        self.apply(book, &entry, &decision, report).await?;
        report.processed += 1;
        Ok(())
    }

    async fn apply(
        &self,
        book: &ReadBook,
        entry: &TrackerEntry,
        decision: &ReconciliationDecision,
        report: &mut SyncReport,
    ) -> anyhow::Result<()> {
        if decision.update_volume {
            tracing::info!(
                kind = "volume",
                from = decision.current_volume,
                to = decision.target_volume,
                status = %decision.status,
                "updating"
            );
            if self.options.dry_run {
                tracing::warn!(
                    volume = decision.target_volume,
                    status = %decision.status,
                    "DRYRUN: would update volume"
                );
            } else {
                self.tracker
                    .write_volume_progress(entry.media_id, decision.target_volume, decision.status)
                    .await
                    .with_context(|| format!("update volume progress for {:?}", book.name))?;
                report.updated.push(book.name.clone());
            }
        } else {
            tracing::debug!(
                current = decision.current_volume,
                new = decision.target_volume,
                "skipping volume update"
            );
        }

        if decision.update_chapter {
            tracing::info!(
                kind = "chapter",
                from = decision.current_chapter,
                to = decision.target_chapter,
                status = %decision.status,
                "updating"
            );
            if self.options.dry_run {
                tracing::warn!(
                    chapter = decision.target_chapter,
                    status = %decision.status,
                    "DRYRUN: would update chapter"
                );
            } else {
                self.tracker
                    .write_chapter_progress(entry.media_id, decision.target_chapter, decision.status)
                    .await
                    .with_context(|| format!("update chapter progress for {:?}", book.name))?;
                // A successful volume write already recorded the title.
                if !decision.update_volume {
                    report.updated.push(book.name.clone());
                }
            }
        } else {
            tracing::debug!(
                current = decision.current_chapter,
                new = decision.target_chapter,
                "skipping chapter update"
            );
        }

        if self.options.dry_run && decision.has_updates() {
            report.would_update.push(book.name.clone());
        }
        Ok(())
    }
}

/// Drops books without a tracker id and keeps one book per tracker id: the
/// one furthest along the series, the later record on a tie. Tracker ids keep
/// the order in which they first appeared.
pub fn select_candidates(books: Vec<ReadBook>) -> Vec<(i64, ReadBook)> {
    let mut order = Vec::new();
    let mut chosen: HashMap<i64, ReadBook> = HashMap::new();

    for book in books {
        let Some(tracker_id) = book.tracker_id else {
            tracing::debug!(title = %book.name, "skipping: invalid tracker id");
            continue;
        };
        match chosen.entry(tracker_id) {
            Entry::Vacant(slot) => {
                order.push(tracker_id);
                slot.insert(book);
            }
            Entry::Occupied(mut slot) => {
                if book.series_index >= slot.get().series_index {
                    tracing::debug!(
                        tracker_id,
                        kept = %book.name,
                        dropped = %slot.get().name,
                        "duplicate tracker id"
                    );
                    slot.insert(book);
                } else {
                    tracing::debug!(
                        tracker_id,
                        kept = %slot.get().name,
                        dropped = %book.name,
                        "duplicate tracker id"
                    );
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| chosen.remove(&id).map(|book| (id, book)))
        .collect()
}
