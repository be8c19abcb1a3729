use std::str::FromStr;

use chrono::Local;
use serde_json::Value;
use snapfix_result::{Error, Result};

use crate::{
    authority_lists, fallback_authority_lists, is_valid_zip_code, Database, Image, RawIssue,
    DEFAULT_ADDRESS, DEFAULT_EMAIL_STATUS, DEFAULT_TIMEZONE, NO_ZIP_CODE,
};

/// Email address used when no responsible authority can be determined
pub const FALLBACK_AUTHORITY_EMAIL: &str = "snapfix@momntumai.com";
/// Department name used when no responsible authority can be determined
pub const FALLBACK_AUTHORITY_NAME: &str = "City Department";
/// Authority type used for the fallback authority
pub const FALLBACK_AUTHORITY_TYPE: &str = "general";

auto_derived!(
    /// Lifecycle status of an issue
    #[derive(Copy, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum IssueStatus {
        #[default]
        Pending,
        Accepted,
        Rejected,
        Completed,
    }

    /// Authority which is able to receive or handle an issue
    pub struct Authority {
        /// Display name
        pub name: String,
        /// Contact address
        pub email: String,
        /// Kind of authority (e.g. general, police, utilities)
        #[serde(rename = "type")]
        pub authority_type: String,
    }

    /// Authority routed an issue by the caller
    ///
    /// Absent fields fall back to the default department.
    #[derive(Default)]
    pub struct ResponsibleAuthority {
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default)]
        pub email: Option<String>,
    }

    /// Entry in the audit trail of declined reports
    pub struct DeclineEntry {
        /// Why the report was sent back
        pub reason: String,
        /// When the report was sent back (ISO-8601)
        pub timestamp: String,
    }
);

impl IssueStatus {
    /// Every status an issue may have
    pub const ALL: [IssueStatus; 4] = [
        IssueStatus::Pending,
        IssueStatus::Accepted,
        IssueStatus::Rejected,
        IssueStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::Accepted => "accepted",
            IssueStatus::Rejected => "rejected",
            IssueStatus::Completed => "completed",
        }
    }
}

impl FromStr for IssueStatus {
    type Err = Error;

    fn from_str(status: &str) -> Result<Self> {
        IssueStatus::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == status)
            .ok_or_else(|| {
                create_error!(InvalidStatus {
                    status: status.to_string()
                })
            })
    }
}

impl Authority {
    /// Authority used in place of missing or malformed authority lists
    pub fn fallback() -> Authority {
        Authority {
            name: FALLBACK_AUTHORITY_NAME.to_string(),
            email: FALLBACK_AUTHORITY_EMAIL.to_string(),
            authority_type: FALLBACK_AUTHORITY_TYPE.to_string(),
        }
    }

    /// Whether every field is populated
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.authority_type.trim().is_empty()
    }
}

impl DeclineEntry {
    /// Record a decline reason at the current time
    pub fn now(reason: &str) -> DeclineEntry {
        DeclineEntry {
            reason: reason.to_string(),
            timestamp: timestamp_now(),
        }
    }
}

/// Reported civic issue
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Issue {
    /// Unique Id, supplied by the caller
    #[serde(rename = "_id")]
    pub id: String,
    /// Summary of the issue
    pub description: String,
    /// Street address
    pub address: String,
    /// Five digit zip code or `N/A`
    pub zip_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub issue_type: String,
    pub severity: String,
    /// Blob store id of the photograph
    pub image_id: String,
    pub status: IssueStatus,
    /// Free-form generated report
    pub report: Value,
    pub category: String,
    pub priority: String,
    pub report_id: String,
    /// Time of the last write (ISO-8601)
    pub timestamp: String,
    /// Addresses of the responsible authorities, parallel to `authority_name`
    pub authority_email: Vec<String>,
    /// Names of the responsible authorities, parallel to `authority_email`
    pub authority_name: Vec<String>,
    pub timestamp_formatted: String,
    pub timezone_name: String,
    /// Address of the reporting user
    pub user_email: Option<String>,
    /// Authorities which may take over this issue
    pub available_authorities: Vec<Authority>,
    /// Reason the latest report was declined
    pub decline_reason: Option<String>,
    /// Every reason a report was declined, oldest first
    pub decline_history: Vec<DeclineEntry>,
    /// Owned by the notification service
    pub email_status: String,
    /// Owned by the notification service
    pub email_errors: Vec<Value>,
}

/// Details of an issue being reported
#[derive(Deserialize, Debug, Clone, Default)]
pub struct NewIssue {
    pub report: Value,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub responsible_authorities: Vec<ResponsibleAuthority>,
    /// Unvalidated authority records
    #[serde(default)]
    pub available_authorities: Option<Vec<Value>>,
}

impl NewIssue {
    /// Names of required fields which were left empty
    pub fn missing_fields(&self) -> Vec<String> {
        [
            ("issue_type", self.issue_type.trim().is_empty()),
            ("severity", self.severity.trim().is_empty()),
            ("category", self.category.trim().is_empty()),
            ("priority", self.priority.trim().is_empty()),
            ("report", is_empty_value(&self.report)),
        ]
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(field, _)| field.to_string())
        .collect()
    }
}

/// Current time as an ISO-8601 string
pub fn timestamp_now() -> String {
    Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Current time formatted for display
pub fn timestamp_formatted_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

/// Whether a JSON value carries no information
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

/// Look up a nested string in the generated report
fn report_field<'a>(report: &'a Value, section: &str, field: &str) -> Option<&'a str> {
    report
        .get(section)
        .and_then(|section| section.get(field))
        .and_then(Value::as_str)
}

impl Issue {
    /// Validate and store a new issue alongside its photograph
    ///
    /// Returns the blob id of the stored photograph. The photograph is
    /// removed again if the issue document could not be written.
    pub async fn create(db: &Database, id: &str, image: &[u8], data: NewIssue) -> Result<String> {
        let missing = data.missing_fields();
        if !missing.is_empty() {
            warn!("Rejected issue {id}, missing required fields: {missing:?}");
            return Err(create_error!(MissingFields { fields: missing }));
        }

        let zip_code = match data.zip_code {
            Some(zip) if is_valid_zip_code(&zip) => zip,
            Some(zip) if !zip.is_empty() => {
                warn!("Invalid zip code format for issue {id}: {zip}. Setting to 'N/A'.");
                NO_ZIP_CODE.to_string()
            }
            _ => NO_ZIP_CODE.to_string(),
        };

        let (authority_email, authority_name) = derive_authority_lists(&data.responsible_authorities);
        let (authority_email, authority_name) = authority_lists(authority_email, authority_name)
            .unwrap_or_else(|| {
                warn!("No valid authorities provided for issue {id}. Using defaults.");
                fallback_authority_lists()
            });

        let available_authorities = match data.available_authorities {
            Some(entries) => {
                let authorities = parse_available_authorities(entries);
                if authorities.is_none() {
                    warn!("Invalid available_authorities for issue {id}. Setting to default.");
                }

                authorities.unwrap_or_else(|| vec![Authority::fallback()])
            }
            None => {
                debug!("No available_authorities provided for issue {id}. Using default.");
                vec![Authority::fallback()]
            }
        };

        let filename = Image::filename_for(id);
        let image_id = db
            .upload_image(&filename, id, image)
            .await
            .inspect_err(|err| error!("Failed to upload image for issue {id}: {err:?}"))?;
        debug!("Image uploaded successfully with ID: {image_id}");

        let report = data.report;
        let mut issue = Issue {
            id: id.to_string(),
            description: report_field(&report, "issue_overview", "summary_explanation")
                .unwrap_or("No description provided")
                .to_string(),
            address: if data.address.trim().is_empty() {
                DEFAULT_ADDRESS.to_string()
            } else {
                data.address
            },
            zip_code,
            latitude: data.latitude,
            longitude: data.longitude,
            issue_type: data.issue_type,
            severity: data.severity,
            image_id: image_id.clone(),
            status: IssueStatus::Pending,
            category: data.category,
            priority: data.priority,
            report_id: report_field(&report, "template_fields", "oid")
                .unwrap_or_default()
                .to_string(),
            timestamp: timestamp_now(),
            authority_email,
            authority_name,
            timestamp_formatted: report_field(&report, "template_fields", "timestamp")
                .map(str::to_string)
                .unwrap_or_else(timestamp_formatted_now),
            timezone_name: report_field(&report, "template_fields", "timezone_name")
                .unwrap_or(DEFAULT_TIMEZONE)
                .to_string(),
            user_email: data.user_email,
            available_authorities,
            decline_reason: None,
            decline_history: vec![],
            email_status: DEFAULT_EMAIL_STATUS.to_string(),
            email_errors: vec![],
            report,
        };

        issue.normalise();

        if let Err(err) = db.insert_issue(&issue).await {
            error!("Failed to insert issue document for {id}: {err:?}");

            match db.delete_image(&image_id).await {
                Ok(()) => info!("Cleaned up orphaned image {image_id} for issue {id}"),
                Err(cleanup) => {
                    error!("Failed to clean up orphaned image {image_id}: {cleanup:?}")
                }
            }

            return Err(err);
        }

        info!(
            "Stored issue {id} with image ID {image_id}, authorities: {:?}, user_email: {:?}, zip_code: {}",
            issue.authority_name, issue.user_email, issue.zip_code
        );

        Ok(image_id)
    }

    /// Fetch a single issue, `None` if it does not exist
    pub async fn fetch(db: &Database, id: &str) -> Result<Option<Issue>> {
        let issue = db
            .fetch_issue(id)
            .await
            .inspect_err(|err| error!("Failed to retrieve issue {id}: {err:?}"))?
            .map(RawIssue::into_issue);

        match &issue {
            Some(_) => info!("Retrieved issue {id}"),
            None => warn!("No issue found with ID {id}"),
        }

        Ok(issue)
    }

    /// Fetch every issue, most recently written first
    pub async fn fetch_all(db: &Database) -> Result<Vec<Issue>> {
        let issues: Vec<Issue> = db
            .fetch_issues()
            .await
            .inspect_err(|err| error!("Failed to retrieve issues: {err:?}"))?
            .into_iter()
            .map(RawIssue::into_issue)
            .collect();

        info!("Retrieved {} issues", issues.len());
        Ok(issues)
    }

    /// Replace the report of a pending issue and record why the previous one was declined
    ///
    /// Returns `false` if there is no pending issue with this id.
    pub async fn decline(db: &Database, id: &str, report: Value, reason: &str) -> Result<bool> {
        if is_empty_value(&report) {
            warn!("Rejected decline of issue {id}: report cannot be empty");
            return Err(create_error!(FailedValidation {
                error: "Report cannot be empty".to_string()
            }));
        }

        if reason.trim().is_empty() {
            warn!("Rejected decline of issue {id}: decline reason cannot be empty");
            return Err(create_error!(FailedValidation {
                error: "Decline reason cannot be empty".to_string()
            }));
        }

        let entry = DeclineEntry::now(reason);
        let updated = db
            .update_pending_issue(id, &report, &entry)
            .await
            .inspect_err(|err| error!("Failed to update pending issue {id}: {err:?}"))?;

        if updated {
            info!("Updated pending issue {id} with decline reason: {reason}");
        } else {
            warn!("No pending issue found with ID {id}");
        }

        Ok(updated)
    }

    /// Move an issue to a new status
    ///
    /// Every status change clears the decline reason and history. Returns
    /// `false` if there is no issue with this id.
    pub async fn set_status(db: &Database, id: &str, status: &str) -> Result<bool> {
        let status: IssueStatus = status
            .parse()
            .inspect_err(|_| warn!("Rejected status {status:?} for issue {id}"))?;

        let updated = db
            .update_issue_status(id, status, &timestamp_now())
            .await
            .inspect_err(|err| error!("Failed to update issue {id} status: {err:?}"))?;

        if updated {
            info!("Updated status for issue {id} to {}", status.as_str());
        } else {
            warn!("No issue found with ID {id}");
        }

        Ok(updated)
    }
}

/// Build parallel email and name lists from the responsible authorities
fn derive_authority_lists(authorities: &[ResponsibleAuthority]) -> (Vec<String>, Vec<String>) {
    authorities
        .iter()
        .map(|authority| {
            (
                authority
                    .email
                    .clone()
                    .unwrap_or_else(|| FALLBACK_AUTHORITY_EMAIL.to_string()),
                authority
                    .name
                    .clone()
                    .unwrap_or_else(|| FALLBACK_AUTHORITY_NAME.to_string()),
            )
        })
        .unzip()
}

/// Parse caller supplied authority records, `None` if any of them is malformed
fn parse_available_authorities(entries: Vec<Value>) -> Option<Vec<Authority>> {
    entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value::<Authority>(entry)
                .ok()
                .filter(Authority::is_complete)
        })
        .collect()
}
