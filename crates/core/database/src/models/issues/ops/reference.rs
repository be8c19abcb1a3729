use serde_json::{json, Value};
use snapfix_result::Result;

use crate::ReferenceDb;
use crate::{DeclineEntry, Issue, IssueStatus, RawIssue};

use super::AbstractIssues;

fn decode(document: Value) -> Option<RawIssue> {
    match serde_json::from_value::<RawIssue>(document) {
        Ok(issue) => Some(issue),
        Err(err) => {
            warn!("Skipping undecodable issue document: {err}");
            None
        }
    }
}

fn timestamp_of(document: &Value) -> Option<&str> {
    document.get("timestamp").and_then(Value::as_str)
}

#[async_trait]
impl AbstractIssues for ReferenceDb {
    /// Insert a new issue into the database
    async fn insert_issue(&self, issue: &Issue) -> Result<()> {
        let document = serde_json::to_value(issue).map_err(|_| create_error!(InternalError))?;

        let mut issues = self.issues.lock().await;
        if issues.contains_key(&issue.id) {
            Err(create_database_error!("insert", "issues"))
        } else {
            issues.insert(issue.id.to_string(), document);
            Ok(())
        }
    }

    /// Fetch an issue by its id
    async fn fetch_issue(&self, id: &str) -> Result<Option<RawIssue>> {
        let issues = self.issues.lock().await;
        Ok(issues.get(id).cloned().and_then(decode))
    }

    /// Fetch all issues, most recent timestamp first
    async fn fetch_issues(&self) -> Result<Vec<RawIssue>> {
        let issues = self.issues.lock().await;
        let mut documents: Vec<&Value> = issues.values().collect();

        // documents without a timestamp sort last
        documents.sort_by(|a, b| timestamp_of(b).cmp(&timestamp_of(a)));

        Ok(documents.into_iter().cloned().filter_map(decode).collect())
    }

    /// Replace the report of a pending issue and append to its decline history
    async fn update_pending_issue(
        &self,
        id: &str,
        report: &Value,
        decline: &DeclineEntry,
    ) -> Result<bool> {
        let entry = serde_json::to_value(decline).map_err(|_| create_error!(InternalError))?;

        let mut issues = self.issues.lock().await;
        let Some(Value::Object(document)) = issues.get_mut(id) else {
            return Ok(false);
        };

        if document.get("status").and_then(Value::as_str) != Some(IssueStatus::Pending.as_str()) {
            return Ok(false);
        }

        match document
            .entry("decline_history")
            .or_insert_with(|| json!([]))
        {
            Value::Array(history) => history.push(entry),
            _ => return Err(create_database_error!("update_one", "issues")),
        }

        document.insert("report".to_string(), report.clone());
        document.insert("decline_reason".to_string(), json!(decline.reason));
        document.insert("timestamp".to_string(), json!(decline.timestamp));

        Ok(true)
    }

    /// Set the status of an issue and clear its decline state
    async fn update_issue_status(
        &self,
        id: &str,
        status: IssueStatus,
        timestamp: &str,
    ) -> Result<bool> {
        let mut issues = self.issues.lock().await;
        let Some(Value::Object(document)) = issues.get_mut(id) else {
            return Ok(false);
        };

        document.insert("status".to_string(), json!(status.as_str()));
        document.insert("timestamp".to_string(), json!(timestamp));
        document.insert("decline_reason".to_string(), Value::Null);
        document.insert("decline_history".to_string(), json!([]));

        Ok(true)
    }
}
