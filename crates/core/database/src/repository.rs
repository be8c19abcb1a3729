use std::time::Duration;

use futures::lock::Mutex;
use once_cell::sync::OnceCell;
use serde_json::Value;
use snapfix_result::Result;

use crate::{Database, DatabaseInfo, Image, Issue, NewIssue};

/// Data access for reported issues and their photographs
///
/// The store connection is opened on first use. Concurrent callers wait on
/// the single attempt in flight rather than opening connections of their own.
pub struct IssueRepository {
    info: DatabaseInfo,
    database: OnceCell<Database>,
    connecting: Mutex<()>,
}

impl IssueRepository {
    /// Create a repository which connects lazily using the given information
    pub fn new(info: DatabaseInfo) -> IssueRepository {
        IssueRepository {
            info,
            database: OnceCell::new(),
            connecting: Mutex::new(()),
        }
    }

    /// Create a repository around an existing connection
    pub fn from_database(db: Database) -> IssueRepository {
        IssueRepository {
            info: DatabaseInfo::Reference,
            database: OnceCell::with_value(db),
            connecting: Mutex::new(()),
        }
    }

    /// Get the store connection, connecting if this is the first use
    pub async fn database(&self) -> Result<&Database> {
        if let Some(db) = self.database.get() {
            return Ok(db);
        }

        let _guard = self.connecting.lock().await;
        if let Some(db) = self.database.get() {
            return Ok(db);
        }

        let db = self.info.clone().connect().await?;
        Ok(self.database.get_or_init(|| db))
    }

    /// Store a new issue and its photograph, returning the photograph's blob id
    pub async fn create_issue(&self, id: &str, image: &[u8], issue: NewIssue) -> Result<String> {
        Issue::create(self.database().await?, id, image, issue)
            .await
            .inspect_err(|err| error!("Failed to store issue {id}: {err:?}"))
    }

    /// Replace the report of a pending issue after it was declined
    ///
    /// Returns `false` if there is no pending issue with this id.
    pub async fn update_decline_report(
        &self,
        id: &str,
        report: Value,
        decline_reason: &str,
    ) -> Result<bool> {
        Issue::decline(self.database().await?, id, report, decline_reason).await
    }

    /// List every issue, most recently written first
    pub async fn list_issues(&self) -> Result<Vec<Issue>> {
        Issue::fetch_all(self.database().await?).await
    }

    /// Fetch a single issue, `None` if it does not exist
    pub async fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        Issue::fetch(self.database().await?, id).await
    }

    /// Move an issue to one of `pending`, `accepted`, `rejected` or `completed`
    ///
    /// Returns `false` if there is no issue with this id.
    pub async fn update_status(&self, id: &str, status: &str) -> Result<bool> {
        Issue::set_status(self.database().await?, id, status).await
    }

    /// Download the photograph of an issue
    pub async fn get_image(&self, id: &str) -> Result<Vec<u8>> {
        Image::fetch_for_issue(self.database().await?, id).await
    }

    /// Delete photographs older than the grace period that no issue refers to
    pub async fn reconcile_orphaned_images(&self, grace_period: Duration) -> Result<usize> {
        Image::prune_orphans(self.database().await?, grace_period).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::{
        Authority, Database, DatabaseInfo, IssueRepository, IssueStatus, NewIssue,
        ResponsibleAuthority,
    };

    fn report(summary: &str) -> serde_json::Value {
        json!({
            "issue_overview": { "summary_explanation": summary },
            "template_fields": { "oid": "rpt", "timezone_name": "UTC" }
        })
    }

    fn new_issue(summary: &str) -> NewIssue {
        NewIssue {
            report: report(summary),
            address: "400 Elm Ave".to_string(),
            zip_code: Some("30301".to_string()),
            latitude: 33.75,
            longitude: -84.39,
            issue_type: "Streetlight".to_string(),
            severity: "Medium".to_string(),
            category: "Utilities".to_string(),
            priority: "Low".to_string(),
            user_email: None,
            responsible_authorities: vec![
                ResponsibleAuthority {
                    name: Some("Power".to_string()),
                    email: Some("power@example.gov".to_string()),
                },
                ResponsibleAuthority {
                    name: None,
                    email: Some("lights@example.gov".to_string()),
                },
            ],
            available_authorities: None,
        }
    }

    #[tokio::test]
    async fn connects_lazily_once() {
        let repository = IssueRepository::new(DatabaseInfo::Reference);

        let first = repository.database().await.unwrap() as *const Database;
        let second = repository.database().await.unwrap() as *const Database;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn concurrent_first_use_shares_one_connection() {
        let repository = IssueRepository::new(DatabaseInfo::Reference);

        let (a, b) = futures::join!(repository.database(), repository.database());
        let (a, b) = (a.unwrap(), b.unwrap());

        match (a, b) {
            (Database::Reference(a), Database::Reference(b)) => {
                assert!(std::sync::Arc::ptr_eq(&a.issues, &b.issues))
            }
            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn issue_lifecycle() {
        database_test!(|db| async move {
            let repository = IssueRepository::from_database(db);

            let image_id = repository
                .create_issue("light-1", b"photo", new_issue("Streetlight out"))
                .await
                .unwrap();
            assert!(!image_id.is_empty());

            let issue = repository.get_issue("light-1").await.unwrap().unwrap();
            assert_eq!(issue.image_id, image_id);
            assert_eq!(
                issue.authority_email,
                vec!["power@example.gov", "lights@example.gov"]
            );
            assert_eq!(issue.authority_name, vec!["Power", "City Department"]);
            assert_eq!(issue.authority_email.len(), issue.authority_name.len());

            assert!(repository
                .update_decline_report("light-1", report("Streetlight flickering"), "Unclear")
                .await
                .unwrap());

            let issue = repository.get_issue("light-1").await.unwrap().unwrap();
            assert_eq!(issue.decline_history.len(), 1);
            assert_eq!(issue.decline_reason.as_deref(), Some("Unclear"));

            assert!(repository.update_status("light-1", "accepted").await.unwrap());
            let issue = repository.get_issue("light-1").await.unwrap().unwrap();
            assert_eq!(issue.status, IssueStatus::Accepted);
            assert_eq!(issue.decline_reason, None);
            assert!(issue.decline_history.is_empty());

            assert!(!repository
                .update_decline_report("light-1", report("Again"), "Unclear")
                .await
                .unwrap());

            assert_eq!(repository.get_image("light-1").await.unwrap(), b"photo");
            assert!(repository.get_issue("missing").await.unwrap().is_none());
            assert!(repository
                .get_image("missing")
                .await
                .unwrap_err()
                .is_not_found());
        });
    }

    #[tokio::test]
    async fn list_is_newest_first_and_populated() {
        database_test!(|db| async move {
            let repository = IssueRepository::from_database(db.clone());

            for index in 0..3 {
                repository
                    .create_issue(
                        &format!("issue-{index}"),
                        b"photo",
                        new_issue(&format!("Issue {index}")),
                    )
                    .await
                    .unwrap();

                // distinct timestamps
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            repository.update_status("issue-0", "completed").await.unwrap();

            if let Database::Reference(reference) = &db {
                reference.issues.lock().await.insert(
                    "legacy".to_string(),
                    json!({ "_id": "legacy", "timestamp": "2001-01-01T00:00:00" }),
                );
            }

            let issues = repository.list_issues().await.unwrap();
            let ids: Vec<&str> = issues.iter().map(|issue| issue.id.as_str()).collect();
            assert_eq!(ids[..3], ["issue-0", "issue-2", "issue-1"]);

            for pair in issues.windows(2) {
                assert!(pair[0].timestamp >= pair[1].timestamp);
            }

            for issue in &issues {
                assert!(!issue.severity.is_empty());
                assert!(!issue.category.is_empty());
                assert!(!issue.priority.is_empty());
                assert!(!issue.available_authorities.is_empty());
                assert!(issue.available_authorities.iter().all(Authority::is_complete));
            }
        });
    }

    #[tokio::test]
    async fn validation_errors_are_reported() {
        database_test!(|db| async move {
            let repository = IssueRepository::from_database(db);

            let error = repository
                .create_issue(
                    "bad",
                    b"photo",
                    NewIssue {
                        category: String::new(),
                        ..new_issue("Bad")
                    },
                )
                .await
                .unwrap_err();
            assert!(error.is_validation());

            let error = repository.update_status("bad", "closed").await.unwrap_err();
            assert!(error.is_validation());

            assert!(repository.list_issues().await.unwrap().is_empty());
        });
    }

    #[tokio::test]
    async fn reconcile_removes_orphans() {
        database_test!(|db| async move {
            let repository = IssueRepository::from_database(db.clone());
            repository
                .create_issue("kept", b"photo", new_issue("Kept"))
                .await
                .unwrap();
            db.upload_image("lost.jpg", "lost", b"photo").await.unwrap();

            assert_eq!(
                repository
                    .reconcile_orphaned_images(Duration::ZERO)
                    .await
                    .unwrap(),
                1
            );
            assert!(repository.get_image("kept").await.is_ok());
            assert!(repository.get_image("lost").await.unwrap_err().is_not_found());
        });
    }
}
