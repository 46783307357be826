use crate::model::{
    MediaListStatus, ReadBook, ReadStatus, ReconciliationDecision, SeriesVolume, TrackerEntry,
};

/// Cumulative chapter count for a series read up to (and including) the last
/// volume in `volumes`.
///
/// A finished book counts every chapter. A book still being read counts the
/// earlier volumes in full and estimates the last one from its progress.
pub fn aggregate_chapters(book: &ReadBook, volumes: &[SeriesVolume]) -> u32 {
    let Some((current, earlier)) = volumes.split_last() else {
        return 0;
    };

    if book.read_status != ReadStatus::InProgress {
        return sum_chapters(volumes);
    }

    let estimated = estimate_partial(current.chapter_count(), book.progress_percent);
    let total = sum_chapters(earlier).saturating_add(estimated);
    tracing::debug!(
        title = %book.name,
        estimated = total,
        progress = %format!("{:.2}%", book.progress_percent),
        "in progress"
    );
    total
}

fn sum_chapters(volumes: &[SeriesVolume]) -> u32 {
    volumes
        .iter()
        .fold(0u32, |acc, v| acc.saturating_add(v.chapter_count()))
}

fn estimate_partial(chapters: u32, progress_percent: f64) -> u32 {
    let progress = if progress_percent.is_finite() {
        progress_percent.clamp(0.0, 100.0) / 100.0
    } else {
        0.0
    };
    (f64::from(chapters) * progress).round() as u32
}

/// Volume number of the last volume read. Fractional calibre series indices
/// (e.g. `2.5` for a side story) count as the volume they follow.
pub fn latest_volume(volumes: &[SeriesVolume]) -> u32 {
    match volumes.last() {
        Some(v) if v.series_index.is_finite() && v.series_index > 0.0 => {
            v.series_index.trunc().min(f64::from(u32::MAX)) as u32
        }
        _ => 0,
    }
}

/// Clamps `candidate` to `max`; a `max` of 0 is unknown and never clamps.
pub fn normalize(candidate: u32, max: u32) -> u32 {
    if max != 0 && candidate > max {
        tracing::debug!(old = candidate, new = max, "normalised");
        return max;
    }
    candidate
}

pub fn is_completed(
    entry: &TrackerEntry,
    volume: u32,
    chapter: u32,
    read_status: ReadStatus,
) -> bool {
    tracing::debug!(
        max_volumes = entry.max_volumes,
        max_chapters = entry.max_chapters,
        "media limits"
    );
    if entry.max_volumes == 0 || entry.max_chapters == 0 {
        return false;
    }
    // Estimated progress for a book still being read never completes a series.
    read_status == ReadStatus::Finished
        && volume >= entry.max_volumes
        && chapter >= entry.max_chapters
}

/// Computes what the remote entry should look like for `book`. Returns `None`
/// when the series lookup produced no volumes.
pub fn decide(
    book: &ReadBook,
    volumes: &[SeriesVolume],
    entry: &TrackerEntry,
) -> Option<ReconciliationDecision> {
    if volumes.is_empty() {
        return None;
    }

    let volume = latest_volume(volumes);
    let chapter = aggregate_chapters(book, volumes);

    let target_volume = normalize(volume, entry.max_volumes);
    let target_chapter = normalize(chapter, entry.max_chapters);

    let status = if is_completed(entry, target_volume, target_chapter, book.read_status) {
        MediaListStatus::Completed
    } else {
        MediaListStatus::Current
    };

    tracing::debug!(
        volume,
        chapter,
        target_volume,
        target_chapter,
        %status,
        "normalised progress"
    );

    Some(ReconciliationDecision {
        current_volume: entry.progress_volumes,
        current_chapter: entry.progress_chapters,
        target_volume,
        target_chapter,
        status,
        update_volume: target_volume > entry.progress_volumes,
        update_chapter: target_chapter > entry.progress_chapters,
    })
}
