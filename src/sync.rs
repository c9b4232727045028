//! Incremental sync of merged Gerrit changes into the database
//!
//! `pull_and_store_changes` → connect, pick the fetch window, page through
//! `status:merged` results and merge each page before asking for the next.

use crate::config::FetchConfig;
use crate::db::{self, Database, ReviewComment, ReviewedChange};
use crate::gerrit::{merged_changes_query, Account, ChangeRecord, ChangeSource, CommentRecord, GerritClient};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// Comment authors containing these are automation, not reviewers
const BOT_NAME_MARKERS: [&str; 2] = ["Jenkins", "Gerrit"];

/// Messages containing these are votes or rebase notices, not discussion
const IGNORED_MESSAGE_MARKERS: [&str; 3] = ["Code-Review+1", "Code-Review+2", "was rebased"];

/// Outcome of one sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SyncSummary {
    /// Start of the fetch window (sent to Gerrit as a date)
    pub window_start: DateTime<Utc>,
    /// Queries issued, including the final empty one
    pub pages: usize,
    /// Change rows returned across all pages
    pub fetched: usize,
    /// Changes that were new to the database
    pub stored: usize,
}

impl SyncSummary {
    fn empty(window_start: DateTime<Utc>) -> Self {
        Self {
            window_start,
            pages: 0,
            fetched: 0,
            stored: 0,
        }
    }
}

/// Pick where the fetch window starts.
///
/// Empty database, or a last change older than `max_days`: go back
/// `max_days` from `now`. Otherwise resume from the last known change; the
/// boundary change comes back again and is dropped by the merge.
pub fn determine_fetch_window_start(
    now: DateTime<Utc>,
    last_known_change: Option<DateTime<Utc>>,
    max_days: i64,
) -> DateTime<Utc> {
    let max_days = max_days.max(0);
    // a look-back past chrono's range means "everything"
    let max_days_ago = Duration::try_days(max_days)
        .and_then(|back| now.checked_sub_signed(back))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    match last_known_change {
        None => max_days_ago,
        Some(last) => {
            let days_to_pull = (now - last).num_days().abs();
            if days_to_pull > max_days {
                info!(
                    "{} days elapsed since last pull. Only pulling last {} days.",
                    days_to_pull, max_days
                );
                max_days_ago
            } else {
                last
            }
        }
    }
}

/// Whether a comment should be left out of the leaderboard
pub fn ignore_comment(change: &ChangeRecord, comment: &CommentRecord) -> bool {
    let reviewer = comment.reviewer.display_name();

    if BOT_NAME_MARKERS.iter().any(|marker| reviewer.contains(marker)) {
        return true;
    }
    // owner replies on their own change
    if change.owner.is_named(&reviewer) || same_email(&change.owner, &comment.reviewer) {
        return true;
    }
    IGNORED_MESSAGE_MARKERS
        .iter()
        .any(|marker| comment.message.contains(marker))
}

fn same_email(a: &Account, b: &Account) -> bool {
    match (a.email.as_deref().map(str::trim), b.email.as_deref().map(str::trim)) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

/// Normalize a fetched change into what gets stored, dropping ignored comments
pub fn reviewed_change(change: &ChangeRecord) -> ReviewedChange {
    ReviewedChange {
        change_id: change.change_id.clone(),
        owner_full_name: change.owner.display_name(),
        subject: change.subject.clone(),
        project_name: change.project.clone(),
        last_updated: change.last_updated,
        comments: change
            .comments
            .iter()
            .filter(|comment| !ignore_comment(change, comment))
            .map(|comment| ReviewComment {
                reviewer: comment.reviewer.display_name(),
                posted_at: comment.timestamp,
                message: comment.message.clone(),
            })
            .collect(),
    }
}

/// Merge fetched changes in order, skipping ids already stored.
///
/// Returns how many changes were new.
pub fn merge(db: &Database, changes: &[ChangeRecord]) -> db::Result<usize> {
    let mut stored = 0;
    for change in changes {
        // Known ids show up again on window overlap or when a merged change
        // gets a late comment; both are skipped.
        if db.store_reviewed_change(&reviewed_change(change))? {
            stored += 1;
        }
    }
    Ok(stored)
}

/// Window start for this pass, from what is already stored
pub fn fetch_window_start(db: &Database, max_days: i64, now: DateTime<Utc>) -> db::Result<DateTime<Utc>> {
    let last_synced = db.latest_change_timestamp()?;
    match last_synced {
        Some(last) => info!("Last pulled change has UTC datetime: {}", last),
        None => info!("No changes stored yet"),
    }
    Ok(determine_fetch_window_start(now, last_synced, max_days))
}

fn fetch_page<S: ChangeSource + ?Sized>(source: &S, query: &str) -> Vec<ChangeRecord> {
    match source.query(query) {
        Ok(changes) => {
            info!("Number of changes fetched: {}", changes.len());
            changes
        }
        Err(e) => {
            warn!("Query {} failed, stopping this sync pass: {}", query, e);
            Vec::new()
        }
    }
}

/// Page through merged changes from `source` and merge them into `db`.
///
/// The window is fixed before the first page; merging a page moves the
/// newest stored timestamp, so it must not be recomputed mid-loop.
pub fn pull_all<S: ChangeSource + ?Sized>(
    db: &Database,
    source: &S,
    max_days: i64,
    now: DateTime<Utc>,
) -> db::Result<SyncSummary> {
    let window_start = fetch_window_start(db, max_days, now)?;
    let mut summary = SyncSummary::empty(window_start);

    loop {
        info!(
            "Pulling a maximum of {} days of changes, skipping latest {} changes...",
            max_days, summary.fetched
        );
        let page = fetch_page(source, &merged_changes_query(window_start, summary.fetched));
        summary.pages += 1;
        if page.is_empty() {
            break;
        }
        summary.stored += merge(db, &page)?;
        summary.fetched += page.len();
    }

    info!(
        "Fetched a total of {} changes, {} new",
        summary.fetched, summary.stored
    );
    Ok(summary)
}

/// Connect to the configured Gerrit server and run one sync pass.
///
/// An unreachable server is a warning and an empty pass; the next call
/// simply tries again.
pub fn pull_and_store_changes(db: &Database, fetch: &FetchConfig) -> db::Result<SyncSummary> {
    let now = Utc::now();
    match GerritClient::connect(&fetch.hostname, &fetch.username, fetch.port) {
        Ok(client) => {
            info!("Syncing from {} (Gerrit {})", client.host(), client.version());
            pull_all(db, &client, fetch.maxdays, now)
        }
        Err(e) => {
            warn!("Gerrit error: {}", e);
            Ok(SyncSummary::empty(fetch_window_start(db, fetch.maxdays, now)?))
        }
    }
}
