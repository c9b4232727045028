//! SQLite database with Diesel ORM
//!
//! Stores Gerrit changes, their review comments and the reviewers who wrote
//! them. Tables are created on open; every write goes through uniqueness
//! constraints so repeated syncs never duplicate rows.

use crate::schema::*;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Walk up directory tree to find .leaderboard folder (like git finds .git)
/// Can be overridden with LEADERBOARD_DB_PATH env var
fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("LEADERBOARD_DB_PATH") {
        return PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let state_dir = dir.join(".leaderboard");
            if state_dir.is_dir() {
                return state_dir.join("leaderboard.db");
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    PathBuf::from(".leaderboard/leaderboard.db")
}

/// Current storage schema
pub const CURRENT_SCHEMA: StorageSchema = StorageSchema {
    major: 1,
    minor: 1,
    patch: 0,
    name: "review-leaderboard",
    features: &[
        "changes",
        "comments",
        "reviewers",
        "reviewer_changes",
        "reviewer_comments",
    ],
};

/// Describes the version and tables of the storage schema
#[derive(Debug, Clone)]
pub struct StorageSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl StorageSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for StorageSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

// ============================================================================
// Diesel Models
// ============================================================================

#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
struct NewSchemaVersion<'a> {
    version: &'a str,
    name: &'a str,
    features: &'a str,
    introduced_at: &'a str,
}

/// Queryable schema version
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = schema_versions)]
pub struct StoredSchema {
    pub id: i32,
    pub version: String,
    pub name: String,
    pub features: String,
    pub introduced_at: String,
}

/// Insertable change
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = changes)]
pub struct NewChange<'a> {
    pub change_id: &'a str,
    pub owner_full_name: &'a str,
    pub subject: &'a str,
    pub project_name: &'a str,
    pub last_updated: i64,
}

/// Queryable change
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = changes)]
pub struct StoredChange {
    pub change_id: String,
    pub owner_full_name: String,
    pub subject: String,
    pub project_name: String,
    pub last_updated: i64,
}

#[derive(Insertable)]
#[diesel(table_name = comments)]
struct NewComment<'a> {
    change_id: &'a str,
    posted_at: i64,
    message: &'a str,
}

/// Queryable comment
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = comments)]
pub struct StoredComment {
    pub id: i32,
    pub change_id: String,
    pub posted_at: i64,
    pub message: String,
}

/// Queryable reviewer
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = reviewers)]
pub struct Reviewer {
    pub id: i32,
    pub full_name: String,
}

/// A change ready to be merged, with the comments that survived filtering
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewedChange {
    pub change_id: String,
    pub owner_full_name: String,
    pub subject: String,
    pub project_name: String,
    pub last_updated: DateTime<Utc>,
    pub comments: Vec<ReviewComment>,
}

/// A comment attributed to a resolved reviewer name
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewComment {
    pub reviewer: String,
    pub posted_at: DateTime<Utc>,
    pub message: String,
}

/// Row and link counts across all tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StorageCounts {
    pub changes: i64,
    pub comments: i64,
    pub reviewers: i64,
    pub reviewer_changes: i64,
    pub reviewer_comments: i64,
}

/// Per-reviewer count produced by the aggregation queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerTally {
    pub reviewer_id: i32,
    pub full_name: String,
    pub count: i64,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
}

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("Pool error: {0}")]
    Pool(#[from] diesel::r2d2::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Per-connection pragmas; SQLite leaves foreign keys off by default
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Convert stored unix seconds back to UTC
pub fn from_unix_seconds(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> PathBuf {
        get_db_path()
    }

    /// Open database at default path (respects LEADERBOARD_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| DbError::Connection(e.to_string()))?;
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        Self::build(&path_str, 5)
    }

    /// Private in-memory database; a single pooled connection keeps it alive
    pub fn open_in_memory() -> Result<Self> {
        Self::build(":memory:", 1)
    }

    fn build(url: &str, max_size: u32) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                features TEXT NOT NULL,
                introduced_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS changes (
                change_id TEXT PRIMARY KEY NOT NULL,
                owner_full_name TEXT NOT NULL,
                subject TEXT NOT NULL,
                project_name TEXT NOT NULL,
                last_updated BIGINT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                change_id TEXT NOT NULL,
                posted_at BIGINT NOT NULL,
                message TEXT NOT NULL,
                FOREIGN KEY (change_id) REFERENCES changes(change_id) ON DELETE CASCADE
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS reviewers (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                full_name TEXT NOT NULL UNIQUE
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS reviewer_changes (
                reviewer_id INTEGER NOT NULL,
                change_id TEXT NOT NULL,
                PRIMARY KEY (reviewer_id, change_id),
                FOREIGN KEY (reviewer_id) REFERENCES reviewers(id),
                FOREIGN KEY (change_id) REFERENCES changes(change_id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS reviewer_comments (
                reviewer_id INTEGER NOT NULL,
                comment_id INTEGER NOT NULL,
                PRIMARY KEY (reviewer_id, comment_id),
                FOREIGN KEY (reviewer_id) REFERENCES reviewers(id),
                FOREIGN KEY (comment_id) REFERENCES comments(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_changes_last_updated ON changes(last_updated)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_changes_project ON changes(project_name)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_comments_change ON comments(change_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_reviewer_changes_change ON reviewer_changes(change_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_reviewer_comments_comment ON reviewer_comments(comment_id)").execute(&mut conn)?;

        register_schema(&mut conn, &CURRENT_SCHEMA)?;
        Ok(())
    }

    /// Schema versions recorded in this database
    pub fn schema_versions(&self) -> Result<Vec<StoredSchema>> {
        let mut conn = self.get_conn()?;
        let versions = schema_versions::table
            .order(schema_versions::id.asc())
            .load::<StoredSchema>(&mut conn)?;
        Ok(versions)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store a change with its comments in one transaction.
    ///
    /// Returns `false` without touching anything when the change id is
    /// already stored.
    pub fn store_reviewed_change(&self, change: &ReviewedChange) -> Result<bool> {
        let mut conn = self.get_conn()?;
        conn.transaction::<bool, DbError, _>(|conn| {
            let new_change = NewChange {
                change_id: &change.change_id,
                owner_full_name: &change.owner_full_name,
                subject: &change.subject,
                project_name: &change.project_name,
                last_updated: change.last_updated.timestamp(),
            };
            if !insert_change_if_absent(conn, &new_change)? {
                return Ok(false);
            }

            for comment in &change.comments {
                let comment_id = insert_comment(
                    conn,
                    &change.change_id,
                    comment.posted_at.timestamp(),
                    &comment.message,
                )?;
                let reviewer_id = upsert_reviewer(conn, &comment.reviewer)?;
                link_reviewer_comment(conn, reviewer_id, comment_id)?;
                link_reviewer_change(conn, reviewer_id, &change.change_id)?;
            }
            Ok(true)
        })
    }

    /// Insert a bare change row; `false` if the id already exists
    pub fn insert_change(&self, change: &NewChange<'_>) -> Result<bool> {
        let mut conn = self.get_conn()?;
        Ok(insert_change_if_absent(&mut conn, change)?)
    }

    /// Resolve or create a reviewer by full name, returning its id
    pub fn upsert_reviewer(&self, full_name: &str) -> Result<i32> {
        let mut conn = self.get_conn()?;
        Ok(upsert_reviewer(&mut conn, full_name)?)
    }

    /// Link a reviewer to a stored change (no-op if already linked)
    pub fn link_reviewer_change(&self, reviewer_id: i32, change_id: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        link_reviewer_change(&mut conn, reviewer_id, change_id)?;
        Ok(())
    }

    /// Create a comment on a stored change authored by the given reviewer
    pub fn add_reviewer_comment(
        &self,
        reviewer_id: i32,
        change_id: &str,
        posted_at: DateTime<Utc>,
        message: &str,
    ) -> Result<i32> {
        let mut conn = self.get_conn()?;
        conn.transaction::<i32, DbError, _>(|conn| {
            let comment_id = insert_comment(conn, change_id, posted_at.timestamp(), message)?;
            link_reviewer_comment(conn, reviewer_id, comment_id)?;
            Ok(comment_id)
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Last-update time of the most recently updated stored change
    pub fn latest_change_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.get_conn()?;
        let latest: Option<i64> = changes::table
            .select(diesel::dsl::max(changes::last_updated))
            .first(&mut conn)?;
        Ok(latest.map(from_unix_seconds))
    }

    pub fn change_exists(&self, change_id: &str) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let count: i64 = changes::table
            .filter(changes::change_id.eq(change_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count != 0)
    }

    pub fn get_change(&self, change_id: &str) -> Result<Option<StoredChange>> {
        let mut conn = self.get_conn()?;
        let change = changes::table
            .filter(changes::change_id.eq(change_id))
            .select(StoredChange::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(change)
    }

    pub fn get_comments_for_change(&self, change_id: &str) -> Result<Vec<StoredComment>> {
        let mut conn = self.get_conn()?;
        let found = comments::table
            .filter(comments::change_id.eq(change_id))
            .order(comments::id.asc())
            .select(StoredComment::as_select())
            .load(&mut conn)?;
        Ok(found)
    }

    pub fn find_reviewer(&self, full_name: &str) -> Result<Option<Reviewer>> {
        let mut conn = self.get_conn()?;
        let reviewer = reviewers::table
            .filter(reviewers::full_name.eq(full_name))
            .select(Reviewer::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(reviewer)
    }

    /// Number of (changes, comments) linked to a reviewer
    pub fn reviewer_link_counts(&self, reviewer_id: i32) -> Result<(i64, i64)> {
        let mut conn = self.get_conn()?;
        let changes: i64 = reviewer_changes::table
            .filter(reviewer_changes::reviewer_id.eq(reviewer_id))
            .count()
            .get_result(&mut conn)?;
        let comments: i64 = reviewer_comments::table
            .filter(reviewer_comments::reviewer_id.eq(reviewer_id))
            .count()
            .get_result(&mut conn)?;
        Ok((changes, comments))
    }

    pub fn counts(&self) -> Result<StorageCounts> {
        let mut conn = self.get_conn()?;
        Ok(StorageCounts {
            changes: changes::table.count().get_result(&mut conn)?,
            comments: comments::table.count().get_result(&mut conn)?,
            reviewers: reviewers::table.count().get_result(&mut conn)?,
            reviewer_changes: reviewer_changes::table.count().get_result(&mut conn)?,
            reviewer_comments: reviewer_comments::table.count().get_result(&mut conn)?,
        })
    }

    /// Distinct project names across stored changes, alphabetically
    pub fn distinct_projects(&self) -> Result<Vec<String>> {
        let mut conn = self.get_conn()?;
        let projects = changes::table
            .select(changes::project_name)
            .distinct()
            .order(changes::project_name.asc())
            .load::<String>(&mut conn)?;
        Ok(projects)
    }

    /// Linked changes per reviewer, counting only changes updated at or
    /// after `since` (and in `project` when given). Reviewers with no
    /// matching change are absent. Ordered by reviewer row id.
    pub fn reviewed_change_tallies(
        &self,
        project: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReviewerTally>> {
        let mut conn = self.get_conn()?;
        let mut query = reviewer_changes::table
            .inner_join(reviewers::table)
            .inner_join(changes::table)
            .filter(changes::last_updated.ge(since.timestamp()))
            .select((reviewers::id, reviewers::full_name))
            .into_boxed();
        if let Some(project) = project {
            query = query.filter(changes::project_name.eq(project));
        }
        let rows: Vec<(i32, String)> = query.load(&mut conn)?;

        let mut tallies: BTreeMap<i32, ReviewerTally> = BTreeMap::new();
        for (reviewer_id, full_name) in rows {
            tallies
                .entry(reviewer_id)
                .or_insert_with(|| ReviewerTally {
                    reviewer_id,
                    full_name,
                    count: 0,
                })
                .count += 1;
        }
        debug!(reviewers = tallies.len(), ?project, %since, "counted reviewed changes");
        Ok(tallies.into_values().collect())
    }

    /// Authored comments per reviewer id, counting only comments posted at
    /// or after `since` on changes in `project` when given
    pub fn comment_tallies(
        &self,
        project: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<BTreeMap<i32, i64>> {
        let mut conn = self.get_conn()?;
        let mut query = reviewer_comments::table
            .inner_join(comments::table.inner_join(changes::table))
            .filter(comments::posted_at.ge(since.timestamp()))
            .select(reviewer_comments::reviewer_id)
            .into_boxed();
        if let Some(project) = project {
            query = query.filter(changes::project_name.eq(project));
        }
        let reviewer_ids: Vec<i32> = query.load(&mut conn)?;

        let mut tallies = BTreeMap::new();
        for reviewer_id in reviewer_ids {
            *tallies.entry(reviewer_id).or_insert(0) += 1;
        }
        Ok(tallies)
    }
}

// ============================================================================
// Connection-level helpers (shared by single writes and transactions)
// ============================================================================

fn register_schema(conn: &mut SqliteConnection, schema: &StorageSchema) -> QueryResult<()> {
    let now = Utc::now().to_rfc3339();
    let features_json = serde_json::to_string(&schema.features).unwrap_or_default();

    let new_schema = NewSchemaVersion {
        version: &schema.version_string(),
        name: schema.name,
        features: &features_json,
        introduced_at: &now,
    };

    diesel::insert_or_ignore_into(schema_versions::table)
        .values(&new_schema)
        .execute(conn)?;
    Ok(())
}

fn insert_change_if_absent(conn: &mut SqliteConnection, change: &NewChange<'_>) -> QueryResult<bool> {
    let inserted = diesel::insert_or_ignore_into(changes::table)
        .values(change)
        .execute(conn)?;
    Ok(inserted != 0)
}

fn insert_comment(
    conn: &mut SqliteConnection,
    change_id: &str,
    posted_at: i64,
    message: &str,
) -> QueryResult<i32> {
    diesel::insert_into(comments::table)
        .values(&NewComment {
            change_id,
            posted_at,
            message,
        })
        .execute(conn)?;

    diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .first(conn)
}

fn upsert_reviewer(conn: &mut SqliteConnection, full_name: &str) -> QueryResult<i32> {
    diesel::insert_or_ignore_into(reviewers::table)
        .values(reviewers::full_name.eq(full_name))
        .execute(conn)?;

    reviewers::table
        .filter(reviewers::full_name.eq(full_name))
        .select(reviewers::id)
        .first(conn)
}

fn link_reviewer_change(conn: &mut SqliteConnection, reviewer_id: i32, change_id: &str) -> QueryResult<()> {
    diesel::insert_or_ignore_into(reviewer_changes::table)
        .values((
            reviewer_changes::reviewer_id.eq(reviewer_id),
            reviewer_changes::change_id.eq(change_id),
        ))
        .execute(conn)?;
    Ok(())
}

fn link_reviewer_comment(conn: &mut SqliteConnection, reviewer_id: i32, comment_id: i32) -> QueryResult<()> {
    diesel::insert_or_ignore_into(reviewer_comments::table)
        .values((
            reviewer_comments::reviewer_id.eq(reviewer_id),
            reviewer_comments::comment_id.eq(comment_id),
        ))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reviewed(change_id: &str, project: &str, comments: &[(&str, &str)]) -> ReviewedChange {
        let now = Utc::now();
        ReviewedChange {
            change_id: change_id.to_string(),
            owner_full_name: "John Doe".to_string(),
            subject: "My fix for everything".to_string(),
            project_name: project.to_string(),
            last_updated: now,
            comments: comments
                .iter()
                .map(|(reviewer, message)| ReviewComment {
                    reviewer: reviewer.to_string(),
                    posted_at: now,
                    message: message.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_open_registers_schema() {
        let db = Database::open_in_memory().unwrap();
        let versions = db.schema_versions().unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, CURRENT_SCHEMA.version_string());
        assert!(versions[0].features.contains("reviewer_comments"));
    }

    #[test]
    fn test_reopen_file_database_keeps_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("leaderboard.db");
        {
            let db = Database::open_at(&path).unwrap();
            assert!(db.store_reviewed_change(&reviewed("I1", "core", &[("Mary Jane", "nit")])).unwrap());
        }
        let db = Database::open_at(&path).unwrap();
        assert!(db.change_exists("I1").unwrap());
        assert_eq!(db.schema_versions().unwrap().len(), 1);
    }

    #[test]
    fn test_latest_change_timestamp_empty() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.latest_change_timestamp().unwrap(), None);
    }

    #[test]
    fn test_latest_change_timestamp_picks_newest() {
        let db = Database::open_in_memory().unwrap();
        let base = from_unix_seconds(1_456_000_000);
        for (i, offset) in [3, 1, 2].iter().enumerate() {
            let id = format!("I{}", i);
            db.insert_change(&NewChange {
                change_id: &id,
                owner_full_name: "Owner",
                subject: "s",
                project_name: "p",
                last_updated: (base + Duration::seconds(*offset)).timestamp(),
            })
            .unwrap();
        }
        assert_eq!(db.latest_change_timestamp().unwrap(), Some(base + Duration::seconds(3)));
    }

    #[test]
    fn test_store_reviewed_change_creates_rows_and_links() {
        let db = Database::open_in_memory().unwrap();
        let change = reviewed("I1", "leaderboard", &[("Mary Jane", "Looks odd"), ("Mary Jane", "Still odd")]);
        assert!(db.store_reviewed_change(&change).unwrap());

        let stored = db.get_change("I1").unwrap().unwrap();
        assert_eq!(stored.owner_full_name, "John Doe");
        assert_eq!(stored.project_name, "leaderboard");
        assert_eq!(stored.last_updated, change.last_updated.timestamp());

        let comments = db.get_comments_for_change("I1").unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].message, "Looks odd");

        let reviewer = db.find_reviewer("Mary Jane").unwrap().unwrap();
        assert_eq!(db.reviewer_link_counts(reviewer.id).unwrap(), (1, 2));
    }

    #[test]
    fn test_store_reviewed_change_skips_known_id() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.store_reviewed_change(&reviewed("I1", "a", &[("Mary Jane", "first")])).unwrap());

        let mut again = reviewed("I1", "b", &[("City Girl", "second")]);
        again.subject = "Different subject".to_string();
        assert!(!db.store_reviewed_change(&again).unwrap());

        let stored = db.get_change("I1").unwrap().unwrap();
        assert_eq!(stored.project_name, "a");
        assert_eq!(stored.subject, "My fix for everything");
        assert!(db.find_reviewer("City Girl").unwrap().is_none());
        assert_eq!(db.counts().unwrap().comments, 1);
    }

    #[test]
    fn test_upsert_reviewer_reuses_row() {
        let db = Database::open_in_memory().unwrap();
        let first = db.upsert_reviewer("Foo Bar").unwrap();
        let second = db.upsert_reviewer("Foo Bar").unwrap();
        assert_eq!(first, second);
        assert_eq!(db.counts().unwrap().reviewers, 1);
    }

    #[test]
    fn test_link_reviewer_change_is_set_union() {
        let db = Database::open_in_memory().unwrap();
        db.insert_change(&NewChange {
            change_id: "I1",
            owner_full_name: "o",
            subject: "s",
            project_name: "p",
            last_updated: 0,
        })
        .unwrap();
        let id = db.upsert_reviewer("Foo Bar").unwrap();
        db.link_reviewer_change(id, "I1").unwrap();
        db.link_reviewer_change(id, "I1").unwrap();
        assert_eq!(db.reviewer_link_counts(id).unwrap(), (1, 0));
    }

    #[test]
    fn test_comment_requires_stored_change() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_reviewer("Foo Bar").unwrap();
        let result = db.add_reviewer_comment(id, "missing", Utc::now(), "orphan");
        assert!(result.is_err());
        assert_eq!(db.counts().unwrap().comments, 0);
    }

    #[test]
    fn test_distinct_projects_sorted() {
        let db = Database::open_in_memory().unwrap();
        for (i, project) in ["foo", "bar", "foo", "acme"].iter().enumerate() {
            let id = format!("I{}", i);
            db.insert_change(&NewChange {
                change_id: &id,
                owner_full_name: "o",
                subject: "s",
                project_name: project,
                last_updated: 0,
            })
            .unwrap();
        }
        assert_eq!(db.distinct_projects().unwrap(), vec!["acme", "bar", "foo"]);
    }

    #[test]
    fn test_from_unix_seconds_epoch() {
        let epoch = from_unix_seconds(0);
        assert_eq!(epoch.format("%Y-%m-%d %H:%M:%S").to_string(), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_schema_display() {
        assert_eq!(CURRENT_SCHEMA.to_string(), "v1.1.0 (review-leaderboard)");
    }
}
