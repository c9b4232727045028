//! Gerrit SSH query integration
//!
//! Wrapper around `ssh <user>@<host> gerrit query --format=JSON`.
//! Uses the system ssh client so key and agent handling stay with the user's
//! existing SSH setup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::process::Command;
use tracing::{debug, info};

/// Default Gerrit SSH port
pub const DEFAULT_PORT: u16 = 29418;

/// Maximum rows Gerrit returns for one SSH query
pub const PAGE_SIZE: usize = 500;

/// Query for every open change
pub const OPEN_CHANGES_QUERY: &str = "status:open";

/// Gerrit account as it appears on owners, commenters and reviewers
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Account {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Canonical display identity: name, else username, else email.
    ///
    /// Blank values count as missing; an account with nothing usable is
    /// `"Unknown"`.
    pub fn display_name(&self) -> String {
        [&self.name, &self.username, &self.email]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string()
    }

    /// Whether `display` names this account by either its name or username
    pub fn is_named(&self, display: &str) -> bool {
        self.name.as_deref() == Some(display) || self.username.as_deref() == Some(display)
    }
}

/// A comment (review message) on a change
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentRecord {
    #[serde(deserialize_with = "unix_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reviewer: Account,
    #[serde(default)]
    pub message: String,
}

/// A change row from `gerrit query --format=JSON`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeRecord {
    /// The Change-Id, stable across patch sets and fetches
    #[serde(rename = "id")]
    pub change_id: String,
    pub project: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub owner: Account,
    #[serde(rename = "lastUpdated", deserialize_with = "unix_seconds")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
    /// Present when queried with `--all-reviewers`
    #[serde(rename = "allReviewers", default)]
    pub reviewers: Vec<Account>,
}

/// Error type for Gerrit operations
#[derive(Debug, thiserror::Error)]
pub enum GerritError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not connect to {host}: {stderr}")]
    Connect { host: String, stderr: String },
    #[error("Command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("Gerrit rejected query: {message}")]
    Query { message: String },
    #[error("Failed to parse Gerrit response: {message}")]
    Parse { message: String },
}

pub type Result<T> = std::result::Result<T, GerritError>;

/// Anything that can answer Gerrit change queries
pub trait ChangeSource {
    fn query(&self, query: &str) -> Result<Vec<ChangeRecord>>;
}

/// Query for merged changes after `after` (date granularity), paged by `skip`.
///
/// Gerrit's `after:` operator silently matches nothing when given a time of
/// day, so only the UTC date is sent.
pub fn merged_changes_query(after: DateTime<Utc>, skip: usize) -> String {
    let mut query = format!(
        "status:merged after:{} limit:{}",
        after.format("%Y-%m-%d"),
        PAGE_SIZE
    );
    if skip > 0 {
        query.push_str(&format!(" -S {}", skip));
    }
    query
}

/// Parse a unix-seconds value such as `"1456214400"` or `"1456214400.25"`
pub fn parse_unix_seconds(text: &str) -> Option<DateTime<Utc>> {
    let seconds: f64 = text.trim().parse().ok()?;
    seconds_to_utc(seconds)
}

fn seconds_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp(seconds.floor() as i64, 0)
}

fn unix_seconds<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(i64),
        Float(f64),
        Text(String),
    }

    let parsed = match Seconds::deserialize(deserializer)? {
        Seconds::Int(s) => DateTime::from_timestamp(s, 0),
        Seconds::Float(s) => seconds_to_utc(s),
        Seconds::Text(s) => parse_unix_seconds(&s),
    };
    parsed.ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
}

/// Parse the JSON-lines output of `gerrit query --format=JSON`.
///
/// The trailing `stats` row is dropped; an `error` row fails the whole
/// query.
pub fn parse_query_output(output: &str) -> Result<Vec<ChangeRecord>> {
    let mut changes = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| GerritError::Parse {
            message: format!("JSON parse error: {} - Raw: {}", e, line),
        })?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("stats") => continue,
            Some("error") => {
                let message = value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(GerritError::Query { message });
            }
            _ => {}
        }

        let change: ChangeRecord = serde_json::from_value(value).map_err(|e| GerritError::Parse {
            message: format!("bad change row: {} - Raw: {}", e, line),
        })?;
        changes.push(change);
    }

    Ok(changes)
}

/// Gerrit client speaking the SSH command interface
#[derive(Debug, Clone)]
pub struct GerritClient {
    host: String,
    username: String,
    port: u16,
    version: String,
}

impl GerritClient {
    /// Connect by asking the server for its version.
    ///
    /// The ssh binary can be swapped with LEADERBOARD_SSH.
    pub fn connect(host: &str, username: &str, port: u16) -> Result<Self> {
        info!("Connecting to {}@{}:{}", username, host, port);
        let mut client = Self {
            host: host.to_string(),
            username: username.to_string(),
            port,
            version: String::new(),
        };

        let output = client.gerrit_command(&["version"]).output()?;
        if !output.status.success() {
            return Err(GerritError::Connect {
                host: host.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout);
        client.version = version
            .trim()
            .trim_start_matches("gerrit version")
            .trim()
            .to_string();
        info!("Connected to Gerrit version [{}]", client.version);
        Ok(client)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn gerrit_command(&self, args: &[&str]) -> Command {
        let ssh = std::env::var("LEADERBOARD_SSH").unwrap_or_else(|_| "ssh".to_string());
        let mut cmd = Command::new(ssh);
        cmd.args([
            "-p",
            &self.port.to_string(),
            "-o",
            "BatchMode=yes",
            "-o",
            "ConnectTimeout=15",
            &format!("{}@{}", self.username, self.host),
            "gerrit",
        ]);
        cmd.args(args);
        cmd
    }
}

impl ChangeSource for GerritClient {
    fn query(&self, query: &str) -> Result<Vec<ChangeRecord>> {
        info!("Fetching changes with {}", query);
        let output = self
            .gerrit_command(&["query", "--format=JSON", "--comments", "--all-reviewers", query])
            .output()?;

        if !output.status.success() {
            return Err(GerritError::CommandFailed {
                command: format!("gerrit query {}", query),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let changes = parse_query_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(host = %self.host, count = changes.len(), "query complete");
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = r#"{"project":"leaderboard","branch":"master","id":"I0123abcd","number":"42","subject":"My fix for everything","owner":{"name":"John Doe","email":"john@example.com","username":"jdoe"},"url":"https://gerrit.example.com/42","lastUpdated":1456214400,"open":false,"status":"MERGED","comments":[{"timestamp":1456210000,"reviewer":{"name":"Mary Jane","username":"mjane"},"message":"Patch Set 1:\n\nThis really fixes everything!"}],"allReviewers":[{"name":"Mary Jane","username":"mjane"}]}
{"project":"infra","id":"I4567efgh","subject":"Bump deps","owner":{"username":"robot"},"lastUpdated":"1456214500"}
{"type":"stats","rowCount":2,"runTimeMilliseconds":12,"moreChanges":false}
"#;

    #[test]
    fn test_parse_query_output_drops_stats_row() {
        let changes = parse_query_output(SAMPLE_OUTPUT).unwrap();
        assert_eq!(changes.len(), 2);

        let first = &changes[0];
        assert_eq!(first.change_id, "I0123abcd");
        assert_eq!(first.project, "leaderboard");
        assert_eq!(first.owner.display_name(), "John Doe");
        assert_eq!(first.last_updated.timestamp(), 1_456_214_400);
        assert_eq!(first.comments.len(), 1);
        assert_eq!(first.comments[0].reviewer.display_name(), "Mary Jane");
        assert_eq!(first.reviewers.len(), 1);
    }

    #[test]
    fn test_parse_query_output_accepts_string_timestamps() {
        let changes = parse_query_output(SAMPLE_OUTPUT).unwrap();
        let second = &changes[1];
        assert_eq!(second.last_updated.timestamp(), 1_456_214_500);
        assert!(second.comments.is_empty());
        assert_eq!(second.owner.display_name(), "robot");
    }

    #[test]
    fn test_parse_query_output_error_row() {
        let output = r#"{"type":"error","message":"limit:5000 is bigger than max"}"#;
        match parse_query_output(output) {
            Err(GerritError::Query { message }) => assert!(message.contains("limit")),
            other => panic!("expected query error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_query_output_garbage() {
        assert!(matches!(
            parse_query_output("not json"),
            Err(GerritError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_query_output_empty() {
        assert!(parse_query_output("").unwrap().is_empty());
        assert!(parse_query_output("{\"type\":\"stats\",\"rowCount\":0}\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_unix_seconds() {
        let epoch = parse_unix_seconds("0").unwrap();
        assert_eq!(epoch.format("%Y-%m-%d %H:%M:%S").to_string(), "1970-01-01 00:00:00");
        assert_eq!(parse_unix_seconds(" 1456214400.75 ").unwrap().timestamp(), 1_456_214_400);
        assert!(parse_unix_seconds("soon").is_none());
    }

    #[test]
    fn test_merged_changes_query_first_page() {
        let after = DateTime::from_timestamp(1_456_214_400 + 3_600 * 13, 0).unwrap();
        assert_eq!(
            merged_changes_query(after, 0),
            "status:merged after:2016-02-23 limit:500"
        );
    }

    #[test]
    fn test_merged_changes_query_with_skip() {
        let after = DateTime::from_timestamp(1_456_214_400, 0).unwrap();
        assert_eq!(
            merged_changes_query(after, 1000),
            "status:merged after:2016-02-23 limit:500 -S 1000"
        );
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(Account::named("Mary Jane").display_name(), "Mary Jane");

        let handle_only = Account {
            name: Some("  ".to_string()),
            username: Some("mjane".to_string()),
            email: None,
        };
        assert_eq!(handle_only.display_name(), "mjane");

        let email_only = Account {
            email: Some("mj@example.com".to_string()),
            ..Account::default()
        };
        assert_eq!(email_only.display_name(), "mj@example.com");

        assert_eq!(Account::default().display_name(), "Unknown");
    }

    #[test]
    fn test_is_named_matches_name_or_username() {
        let owner = Account {
            name: Some("John Doe".to_string()),
            username: Some("jdoe".to_string()),
            email: None,
        };
        assert!(owner.is_named("John Doe"));
        assert!(owner.is_named("jdoe"));
        assert!(!owner.is_named("Mary Jane"));
    }
}
