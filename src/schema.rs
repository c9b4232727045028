// Leaderboard schema - Gerrit change and reviewer tables for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

diesel::table! {
    changes (change_id) {
        change_id -> Text,               // Gerrit Change-Id, unique across fetches
        owner_full_name -> Text,
        subject -> Text,
        project_name -> Text,
        last_updated -> BigInt,          // UTC unix seconds
    }
}

diesel::table! {
    comments (id) {
        id -> Integer,
        change_id -> Text,               // FK to changes.change_id
        posted_at -> BigInt,             // UTC unix seconds
        message -> Text,
    }
}

diesel::table! {
    reviewers (id) {
        id -> Integer,
        full_name -> Text,               // UNIQUE
    }
}

// ============================================================================
// Reviewer association tables (composite keys give set-union semantics)
// ============================================================================

diesel::table! {
    reviewer_changes (reviewer_id, change_id) {
        reviewer_id -> Integer,
        change_id -> Text,
    }
}

diesel::table! {
    reviewer_comments (reviewer_id, comment_id) {
        reviewer_id -> Integer,
        comment_id -> Integer,
    }
}

diesel::joinable!(comments -> changes (change_id));
diesel::joinable!(reviewer_changes -> reviewers (reviewer_id));
diesel::joinable!(reviewer_changes -> changes (change_id));
diesel::joinable!(reviewer_comments -> reviewers (reviewer_id));
diesel::joinable!(reviewer_comments -> comments (comment_id));

diesel::allow_tables_to_appear_in_same_query!(
    changes,
    comments,
    reviewers,
    reviewer_changes,
    reviewer_comments,
);
