//! Open review load: how many open changes each reviewer is attached to

use crate::config::FetchConfig;
use crate::gerrit::{ChangeRecord, ChangeSource, GerritClient, OPEN_CHANGES_QUERY};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// project → reviewer name → open change count
pub type OpenLoad = BTreeMap<String, BTreeMap<String, u32>>;

fn counts_as_reviewer(name: Option<&str>) -> Option<&str> {
    name.filter(|n| !n.is_empty() && !n.contains("Jenkins"))
}

/// Tally reviewers attached to `changes` per project
pub fn tally_open_load(changes: &[ChangeRecord]) -> OpenLoad {
    let mut load = OpenLoad::new();
    for change in changes.iter().filter(|c| !c.reviewers.is_empty()) {
        let per_reviewer = load.entry(change.project.clone()).or_default();
        for reviewer in &change.reviewers {
            if let Some(name) = counts_as_reviewer(reviewer.name.as_deref()) {
                *per_reviewer.entry(name.to_string()).or_insert(0) += 1;
            }
        }
    }
    load
}

/// Query open changes and tally them; query failures give an empty load
pub fn open_change_load<S: ChangeSource + ?Sized>(source: &S) -> OpenLoad {
    match source.query(OPEN_CHANGES_QUERY) {
        Ok(changes) => {
            info!("Number of open changes fetched: {}", changes.len());
            tally_open_load(&changes)
        }
        Err(e) => {
            warn!("Could not fetch open changes: {}", e);
            OpenLoad::new()
        }
    }
}

/// Connect to the configured server and compute the open load
pub fn fetch_open_load(fetch: &FetchConfig) -> OpenLoad {
    match GerritClient::connect(&fetch.hostname, &fetch.username, fetch.port) {
        Ok(client) => open_change_load(&client),
        Err(e) => {
            warn!("Gerrit error: {}", e);
            OpenLoad::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gerrit::{parse_query_output, Account, GerritError};

    struct Fixed(Vec<ChangeRecord>);

    impl ChangeSource for Fixed {
        fn query(&self, query: &str) -> crate::gerrit::Result<Vec<ChangeRecord>> {
            assert_eq!(query, OPEN_CHANGES_QUERY);
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl ChangeSource for Broken {
        fn query(&self, _query: &str) -> crate::gerrit::Result<Vec<ChangeRecord>> {
            Err(GerritError::Query {
                message: "not authorized".to_string(),
            })
        }
    }

    const OPEN_CHANGES: &str = r#"{"project":"project-a","id":"I1","subject":"a","owner":{"name":"John Doe"},"lastUpdated":1456214400,"allReviewers":[{"name":"Foo Bar"},{"name":"Jenkins CI"},{"username":"nameless"}]}
{"project":"project-a","id":"I2","subject":"b","owner":{"name":"John Doe"},"lastUpdated":1456214400,"allReviewers":[{"name":"Foo Bar"},{"name":"City Girl"}]}
{"project":"project-b","id":"I3","subject":"c","owner":{"name":"John Doe"},"lastUpdated":1456214400,"allReviewers":[{"name":"City Girl"}]}
{"project":"project-c","id":"I4","subject":"d","owner":{"name":"John Doe"},"lastUpdated":1456214400}
{"type":"stats","rowCount":4}"#;

    #[test]
    fn test_tally_per_project() {
        let changes = parse_query_output(OPEN_CHANGES).unwrap();
        let load = open_change_load(&Fixed(changes));

        assert_eq!(load.len(), 2);
        assert_eq!(load["project-a"]["Foo Bar"], 2);
        assert_eq!(load["project-a"]["City Girl"], 1);
        assert_eq!(load["project-b"]["City Girl"], 1);
        assert!(!load["project-a"].contains_key("Jenkins CI"));
        assert_eq!(load["project-a"].len(), 2);
        assert!(!load.contains_key("project-c"));
    }

    #[test]
    fn test_jenkins_only_change_keeps_project() {
        let mut change = parse_query_output(OPEN_CHANGES).unwrap().remove(0);
        change.reviewers = vec![Account::named("Jenkins CI")];
        let load = tally_open_load(&[change]);
        assert!(load["project-a"].is_empty());
    }

    #[test]
    fn test_query_error_is_empty_load() {
        assert!(open_change_load(&Broken).is_empty());
    }
}
