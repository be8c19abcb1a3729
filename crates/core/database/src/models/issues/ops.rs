use serde_json::Value;
use snapfix_result::Result;

use crate::{DeclineEntry, Issue, IssueStatus, RawIssue};

#[cfg(feature = "mongodb")]
mod mongodb;
mod reference;

#[async_trait]
pub trait AbstractIssues: Sync + Send {
    /// Insert a new issue into the database
    async fn insert_issue(&self, issue: &Issue) -> Result<()>;

    /// Fetch an issue by its id
    async fn fetch_issue(&self, id: &str) -> Result<Option<RawIssue>>;

    /// Fetch all issues, most recent timestamp first
    async fn fetch_issues(&self) -> Result<Vec<RawIssue>>;

    /// Replace the report of a pending issue and append to its decline history
    ///
    /// Returns whether a pending issue was matched.
    async fn update_pending_issue(
        &self,
        id: &str,
        report: &Value,
        decline: &DeclineEntry,
    ) -> Result<bool>;

    /// Set the status of an issue and clear its decline state
    ///
    /// Returns whether an issue was matched.
    async fn update_issue_status(
        &self,
        id: &str,
        status: IssueStatus,
        timestamp: &str,
    ) -> Result<bool>;
}
