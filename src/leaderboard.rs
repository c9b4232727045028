//! Reviewer leaderboard: counts per reviewer for a project and time window

use crate::db::{self, Database};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Project selection meaning "no project filter"
pub const PROJECT_ALL: &str = "all";

/// Selectable look-back periods, in display order
pub const TIME_PERIODS: [(&str, i64); 4] = [
    ("1 Week", 7),
    ("1 Month", 30),
    ("3 Months", 90),
    ("6 Months", 180),
];

pub const DEFAULT_TIME_PERIOD: &str = "1 Month";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectFilter {
    All,
    Project(String),
}

impl ProjectFilter {
    /// `"all"` means every project, anything else names one
    pub fn from_selection(selection: &str) -> Self {
        if selection == PROJECT_ALL {
            Self::All
        } else {
            Self::Project(selection.to_string())
        }
    }

    fn project(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Project(name) => Some(name.as_str()),
        }
    }
}

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewerActivity {
    pub name: String,
    pub review_count: i64,
    pub comment_count: i64,
}

impl ReviewerActivity {
    pub fn new(name: &str, review_count: i64, comment_count: i64) -> Self {
        Self {
            name: name.to_string(),
            review_count,
            comment_count,
        }
    }
}

/// Everything needed to render one leaderboard view
#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub project: String,
    pub time_period: String,
    pub window_start: DateTime<Utc>,
    pub project_choices: Vec<String>,
    pub time_window_choices: Vec<String>,
    /// Ranked for display
    pub reviewers: Vec<ReviewerActivity>,
}

fn move_to_front(choices: &mut Vec<String>, current: &str) {
    if let Some(pos) = choices.iter().position(|c| c == current) {
        let selected = choices.remove(pos);
        choices.insert(0, selected);
    }
}

/// Time period labels with `current` first when it is a known label
pub fn time_window_choices(current: &str) -> Vec<String> {
    let mut choices: Vec<String> = TIME_PERIODS.iter().map(|(label, _)| label.to_string()).collect();
    move_to_front(&mut choices, current);
    choices
}

/// Days covered by a period label
pub fn period_days(label: &str) -> Option<i64> {
    TIME_PERIODS
        .iter()
        .find(|(known, _)| *known == label)
        .map(|(_, days)| *days)
}

/// Start of the window `label` covers, ending at `end` (default now).
///
/// Unknown labels fall back to the default period.
pub fn window_start_for(label: &str, end: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let days = period_days(label).unwrap_or_else(|| {
        warn!(
            "Unknown time period {:?}, using default {}",
            label, DEFAULT_TIME_PERIOD
        );
        period_days(DEFAULT_TIME_PERIOD).unwrap_or(30)
    });
    end.unwrap_or_else(Utc::now) - Duration::days(days)
}

/// `"all"` followed by `projects` sorted, then `current` moved to the front
/// when it is one of them. Unknown selections are logged and ignored.
pub fn arrange_project_choices(projects: &[String], current: &str) -> Vec<String> {
    let mut sorted = projects.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut choices = Vec::with_capacity(sorted.len() + 1);
    choices.push(PROJECT_ALL.to_string());
    choices.extend(sorted);

    if current != PROJECT_ALL && !choices.iter().any(|c| c == current) {
        info!("Current project {:?} not found, ignoring", current);
    }
    move_to_front(&mut choices, current);
    choices
}

/// Project drop-down contents from the stored changes
pub fn project_choices(db: &Database, current: &str) -> db::Result<Vec<String>> {
    Ok(arrange_project_choices(&db.distinct_projects()?, current))
}

/// Reviewers with at least one linked change in the filter and window.
///
/// Review and comment counts are independent: comments are matched on their
/// own timestamp and their change's project. Rows come back in reviewer row
/// order; use [`rank`] for display.
pub fn reviewers_with_counts(
    db: &Database,
    filter: &ProjectFilter,
    since: DateTime<Utc>,
) -> db::Result<Vec<ReviewerActivity>> {
    let project = filter.project();
    let comments = db.comment_tallies(project, since)?;

    Ok(db
        .reviewed_change_tallies(project, since)?
        .into_iter()
        .map(|tally| ReviewerActivity {
            comment_count: comments.get(&tally.reviewer_id).copied().unwrap_or(0),
            name: tally.full_name,
            review_count: tally.count,
        })
        .collect())
}

/// Display order: most reviews, then most comments, then name
pub fn rank(mut reviewers: Vec<ReviewerActivity>) -> Vec<ReviewerActivity> {
    reviewers.sort_by(|a, b| {
        b.review_count
            .cmp(&a.review_count)
            .then(b.comment_count.cmp(&a.comment_count))
            .then_with(|| a.name.cmp(&b.name))
    });
    reviewers
}

/// Resolve a selection against what is stored and compute the ranked board.
///
/// Unknown projects and periods are replaced by `"all"` and the default
/// period.
pub fn build(db: &Database, project: &str, time_period: &str, now: DateTime<Utc>) -> db::Result<Leaderboard> {
    let projects = db.distinct_projects()?;
    let project = if project == PROJECT_ALL || projects.iter().any(|p| p == project) {
        project.to_string()
    } else {
        warn!("Unknown project {:?}, showing {}", project, PROJECT_ALL);
        PROJECT_ALL.to_string()
    };
    let time_period = if period_days(time_period).is_some() {
        time_period.to_string()
    } else {
        warn!("Unknown time period {:?}, showing {}", time_period, DEFAULT_TIME_PERIOD);
        DEFAULT_TIME_PERIOD.to_string()
    };

    let window_start = window_start_for(&time_period, Some(now));
    let reviewers = reviewers_with_counts(db, &ProjectFilter::from_selection(&project), window_start)?;

    Ok(Leaderboard {
        project_choices: arrange_project_choices(&projects, &project),
        time_window_choices: time_window_choices(&time_period),
        reviewers: rank(reviewers),
        project,
        time_period,
        window_start,
    })
}
