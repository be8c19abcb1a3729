use bson::Document;
use mongodb::options::FindOptions;
use serde_json::Value;
use snapfix_result::Result;

use crate::MongoDb;
use crate::{DeclineEntry, Issue, IssueStatus, RawIssue};

use super::AbstractIssues;

static COL: &str = "issues";

fn decode(document: Document) -> Option<RawIssue> {
    match bson::from_document::<RawIssue>(document) {
        Ok(issue) => Some(issue),
        Err(err) => {
            warn!("Skipping undecodable issue document: {err}");
            None
        }
    }
}

#[async_trait]
impl AbstractIssues for MongoDb {
    /// Insert a new issue into the database
    async fn insert_issue(&self, issue: &Issue) -> Result<()> {
        self.insert_one(COL, issue)
            .await
            .map(|_| ())
            .map_err(|err| {
                error!("insert_one on {COL} failed for {}: {err}", issue.id);
                create_database_error!("insert_one", COL)
            })
    }

    /// Fetch an issue by its id
    async fn fetch_issue(&self, id: &str) -> Result<Option<RawIssue>> {
        self.find_one_by_id::<Document>(COL, id)
            .await
            .map(|document| document.and_then(decode))
            .map_err(|err| {
                error!("find_one on {COL} failed for {id}: {err}");
                create_database_error!("find_one", COL)
            })
    }

    /// Fetch all issues, most recent timestamp first
    async fn fetch_issues(&self) -> Result<Vec<RawIssue>> {
        self.find_with_options::<_, Document>(
            COL,
            doc! {},
            FindOptions::builder()
                .sort(doc! {
                    "timestamp": -1
                })
                .build(),
        )
        .await
        .map(|documents| documents.into_iter().filter_map(decode).collect())
        .map_err(|err| {
            error!("find on {COL} failed: {err}");
            create_database_error!("find", COL)
        })
    }

    /// Replace the report of a pending issue and append to its decline history
    async fn update_pending_issue(
        &self,
        id: &str,
        report: &Value,
        decline: &DeclineEntry,
    ) -> Result<bool> {
        let report = bson::to_bson(report).map_err(|_| create_error!(InternalError))?;
        let entry = bson::to_bson(decline).map_err(|_| create_error!(InternalError))?;

        self.update_one(
            COL,
            doc! {
                "_id": id,
                "status": IssueStatus::Pending.as_str()
            },
            doc! {
                "$set": {
                    "report": report,
                    "decline_reason": decline.reason.as_str(),
                    "timestamp": decline.timestamp.as_str()
                },
                "$push": {
                    "decline_history": entry
                }
            },
        )
        .await
        .map(|result| result.matched_count > 0)
        .map_err(|err| {
            error!("update_one on {COL} failed for {id}: {err}");
            create_database_error!("update_one", COL)
        })
    }

    /// Set the status of an issue and clear its decline state
    async fn update_issue_status(
        &self,
        id: &str,
        status: IssueStatus,
        timestamp: &str,
    ) -> Result<bool> {
        self.update_one(
            COL,
            doc! {
                "_id": id
            },
            doc! {
                "$set": {
                    "status": status.as_str(),
                    "timestamp": timestamp,
                    "decline_reason": null,
                    "decline_history": []
                }
            },
        )
        .await
        .map(|result| result.matched_count > 0)
        .map_err(|err| {
            error!("update_one on {COL} failed for {id}: {err}");
            create_database_error!("update_one", COL)
        })
    }
}
