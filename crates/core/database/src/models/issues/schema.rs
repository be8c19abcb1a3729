use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::IgnoredAny;
use serde_json::Value;

use crate::{
    timestamp_formatted_now, Authority, DeclineEntry, Issue, IssueStatus,
    FALLBACK_AUTHORITY_EMAIL, FALLBACK_AUTHORITY_NAME,
};

static RE_ZIP_CODE: Lazy<Regex> = Lazy::new(|| Regex::new("^[0-9]{5}$").unwrap());

/// Stored in place of a missing or malformed zip code
pub const NO_ZIP_CODE: &str = "N/A";
pub const DEFAULT_ADDRESS: &str = "Unknown Address";
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_EMAIL_STATUS: &str = "pending";

const DEFAULT_ISSUE_TYPE: &str = "Unknown Issue";
const DEFAULT_DESCRIPTION: &str = "No description";
const DEFAULT_SEVERITY: &str = "Medium";
const DEFAULT_CATEGORY: &str = "Public";
const DEFAULT_PRIORITY: &str = "Medium";

/// Value which either matches `T` or is kept aside as malformed
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Loose<T> {
    Valid(T),
    Invalid(IgnoredAny),
}

impl<T> Loose<T> {
    pub fn valid(self) -> Option<T> {
        match self {
            Loose::Valid(value) => Some(value),
            Loose::Invalid(_) => None,
        }
    }
}

/// Legacy documents stored a single authority as a bare string
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum OneOrMany {
    Many(Vec<Loose<String>>),
    One(String),
}

/// Image reference, older documents kept the native object id
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ImageRef {
    Text(String),
    ObjectId {
        #[serde(rename = "$oid")]
        oid: String,
    },
}

/// Issue document as found in the store
///
/// Every field other than the id may be absent or hold an unexpected type;
/// [`RawIssue::into_issue`] resolves those to their defaults.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RawIssue {
    #[serde(rename = "_id")]
    pub id: String,
    pub description: Option<Loose<String>>,
    pub address: Option<Loose<String>>,
    pub zip_code: Option<Loose<String>>,
    pub latitude: Option<Loose<f64>>,
    pub longitude: Option<Loose<f64>>,
    pub issue_type: Option<Loose<String>>,
    pub severity: Option<Loose<String>>,
    pub image_id: Option<Loose<ImageRef>>,
    pub status: Option<Loose<IssueStatus>>,
    pub report: Option<Value>,
    pub category: Option<Loose<String>>,
    pub priority: Option<Loose<String>>,
    pub report_id: Option<Loose<String>>,
    pub timestamp: Option<Loose<String>>,
    pub authority_email: Option<Loose<OneOrMany>>,
    pub authority_name: Option<Loose<OneOrMany>>,
    pub timestamp_formatted: Option<Loose<String>>,
    pub timezone_name: Option<Loose<String>>,
    pub user_email: Option<Loose<String>>,
    pub available_authorities: Option<Loose<Vec<Loose<Authority>>>>,
    pub decline_reason: Option<Loose<String>>,
    pub decline_history: Option<Loose<Vec<Loose<DeclineEntry>>>>,
    pub email_status: Option<Loose<String>>,
    pub email_errors: Option<Loose<Vec<Value>>>,
}

fn take<T>(field: Option<Loose<T>>) -> Option<T> {
    field.and_then(Loose::valid)
}

fn take_list(field: Option<Loose<OneOrMany>>) -> Vec<String> {
    match take(field) {
        Some(OneOrMany::Many(entries)) => entries.into_iter().filter_map(Loose::valid).collect(),
        Some(OneOrMany::One(entry)) => vec![entry],
        None => vec![],
    }
}

impl RawIssue {
    /// Resolve a stored document into a fully populated issue
    pub fn into_issue(self) -> Issue {
        let id = self.id;

        let image_id = match take(self.image_id) {
            Some(ImageRef::Text(image_id)) => image_id,
            Some(ImageRef::ObjectId { oid }) => {
                warn!("Invalid image_id format for issue {id}. Converting to string.");
                oid
            }
            None => String::new(),
        };

        let status = match self.status {
            Some(Loose::Valid(status)) => status,
            Some(Loose::Invalid(_)) => {
                warn!("Unknown status for issue {id}, treating as pending");
                IssueStatus::Pending
            }
            None => IssueStatus::Pending,
        };

        // a single malformed entry invalidates the whole list
        let available_authorities: Vec<Authority> = take(self.available_authorities)
            .and_then(|entries| entries.into_iter().map(Loose::valid).collect())
            .unwrap_or_default();

        let mut issue = Issue {
            description: take(self.description).unwrap_or_default(),
            address: take(self.address).unwrap_or_default(),
            zip_code: take(self.zip_code).unwrap_or_default(),
            latitude: take(self.latitude).unwrap_or(0.0),
            longitude: take(self.longitude).unwrap_or(0.0),
            issue_type: take(self.issue_type).unwrap_or_default(),
            severity: take(self.severity).unwrap_or_default(),
            image_id,
            status,
            report: self.report.unwrap_or(Value::Null),
            category: take(self.category).unwrap_or_default(),
            priority: take(self.priority).unwrap_or_default(),
            report_id: take(self.report_id).unwrap_or_default(),
            timestamp: take(self.timestamp).unwrap_or_default(),
            authority_email: take_list(self.authority_email),
            authority_name: take_list(self.authority_name),
            timestamp_formatted: take(self.timestamp_formatted).unwrap_or_default(),
            timezone_name: take(self.timezone_name).unwrap_or_default(),
            user_email: take(self.user_email),
            available_authorities,
            decline_reason: take(self.decline_reason),
            decline_history: take(self.decline_history)
                .map(|entries| entries.into_iter().filter_map(Loose::valid).collect())
                .unwrap_or_default(),
            email_status: take(self.email_status).unwrap_or_default(),
            email_errors: take(self.email_errors).unwrap_or_default(),
            id,
        };

        issue.normalise();
        issue
    }
}

/// Whether the zip code is exactly five digits
pub fn is_valid_zip_code(zip_code: &str) -> bool {
    RE_ZIP_CODE.is_match(zip_code)
}

/// Single fallback entry for both authority lists
pub fn fallback_authority_lists() -> (Vec<String>, Vec<String>) {
    (
        vec![FALLBACK_AUTHORITY_EMAIL.to_string()],
        vec![FALLBACK_AUTHORITY_NAME.to_string()],
    )
}

/// Check the parallel authority lists, `None` if they must be replaced
///
/// Both lists have to be non-empty, of equal length and free of blank entries.
pub fn authority_lists(
    emails: Vec<String>,
    names: Vec<String>,
) -> Option<(Vec<String>, Vec<String>)> {
    let blank = |entry: &String| entry.trim().is_empty();

    if emails.is_empty()
        || emails.len() != names.len()
        || emails.iter().any(blank)
        || names.iter().any(blank)
    {
        None
    } else {
        Some((emails, names))
    }
}

fn default_if_blank(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    }
}

impl Issue {
    /// Enforce the invariants every stored or returned issue satisfies
    ///
    /// Applied before every write and after every read.
    pub fn normalise(&mut self) {
        default_if_blank(&mut self.issue_type, DEFAULT_ISSUE_TYPE);
        default_if_blank(&mut self.description, DEFAULT_DESCRIPTION);
        default_if_blank(&mut self.address, DEFAULT_ADDRESS);
        default_if_blank(&mut self.severity, DEFAULT_SEVERITY);
        default_if_blank(&mut self.category, DEFAULT_CATEGORY);
        default_if_blank(&mut self.priority, DEFAULT_PRIORITY);
        default_if_blank(&mut self.timezone_name, DEFAULT_TIMEZONE);
        default_if_blank(&mut self.email_status, DEFAULT_EMAIL_STATUS);

        if self.timestamp_formatted.trim().is_empty() {
            self.timestamp_formatted = timestamp_formatted_now();
        }

        if !is_valid_zip_code(&self.zip_code) {
            if !self.zip_code.is_empty() && self.zip_code != NO_ZIP_CODE {
                debug!("Replacing invalid zip code {:?} of issue {}", self.zip_code, self.id);
            }

            self.zip_code = NO_ZIP_CODE.to_string();
        }

        if !self.latitude.is_finite() {
            self.latitude = 0.0;
        }

        if !self.longitude.is_finite() {
            self.longitude = 0.0;
        }

        let emails = std::mem::take(&mut self.authority_email);
        let names = std::mem::take(&mut self.authority_name);
        (self.authority_email, self.authority_name) =
            authority_lists(emails, names).unwrap_or_else(fallback_authority_lists);

        if self.available_authorities.is_empty()
            || !self.available_authorities.iter().all(Authority::is_complete)
        {
            self.available_authorities = vec![Authority::fallback()];
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        authority_lists, is_valid_zip_code, Authority, IssueStatus, RawIssue,
        FALLBACK_AUTHORITY_EMAIL, FALLBACK_AUTHORITY_NAME,
    };

    fn raw(document: serde_json::Value) -> RawIssue {
        serde_json::from_value(document).unwrap()
    }

    #[test]
    fn zip_code_format() {
        assert!(is_valid_zip_code("02134"));
        assert!(!is_valid_zip_code("2134"));
        assert!(!is_valid_zip_code("021345"));
        assert!(!is_valid_zip_code("0213a"));
        assert!(!is_valid_zip_code("N/A"));
        assert!(!is_valid_zip_code(""));
    }

    #[test]
    fn authority_lists_must_line_up() {
        let lists = authority_lists(vec!["a@x.org".into()], vec!["A".into()]);
        assert_eq!(lists, Some((vec!["a@x.org".into()], vec!["A".into()])));

        assert_eq!(authority_lists(vec![], vec![]), None);
        assert_eq!(
            authority_lists(vec!["a@x.org".into(), "b@x.org".into()], vec!["A".into()]),
            None
        );
        assert_eq!(authority_lists(vec!["".into()], vec!["A".into()]), None);
    }

    #[test]
    fn legacy_document_is_fully_populated() {
        let issue = raw(json!({ "_id": "legacy-1" })).into_issue();

        assert_eq!(issue.id, "legacy-1");
        assert_eq!(issue.issue_type, "Unknown Issue");
        assert_eq!(issue.description, "No description");
        assert_eq!(issue.address, "Unknown Address");
        assert_eq!(issue.zip_code, "N/A");
        assert_eq!(issue.latitude, 0.0);
        assert_eq!(issue.longitude, 0.0);
        assert_eq!(issue.severity, "Medium");
        assert_eq!(issue.category, "Public");
        assert_eq!(issue.priority, "Medium");
        assert_eq!(issue.status, IssueStatus::Pending);
        assert_eq!(issue.timezone_name, "UTC");
        assert!(!issue.timestamp_formatted.is_empty());
        assert_eq!(issue.user_email, None);
        assert_eq!(issue.decline_reason, None);
        assert!(issue.decline_history.is_empty());
        assert_eq!(issue.authority_email, vec![FALLBACK_AUTHORITY_EMAIL]);
        assert_eq!(issue.authority_name, vec![FALLBACK_AUTHORITY_NAME]);
        assert_eq!(issue.available_authorities, vec![Authority::fallback()]);
    }

    #[test]
    fn malformed_fields_fall_back() {
        let issue = raw(json!({
            "_id": "legacy-2",
            "latitude": "41.9",
            "longitude": 12,
            "severity": 3,
            "status": "archived",
            "zip_code": "1234",
            "image_id": { "$oid": "65f0c0ffee0000000000beef" },
            "authority_email": "roads@example.gov",
            "authority_name": ["Roads", null],
            "decline_history": [
                { "reason": "Blurry", "timestamp": "2025-01-01T10:00:00" },
                "not an entry"
            ]
        }))
        .into_issue();

        assert_eq!(issue.latitude, 0.0);
        assert_eq!(issue.longitude, 12.0);
        assert_eq!(issue.severity, "Medium");
        assert_eq!(issue.status, IssueStatus::Pending);
        assert_eq!(issue.zip_code, "N/A");
        assert_eq!(issue.image_id, "65f0c0ffee0000000000beef");
        assert_eq!(issue.authority_email, vec!["roads@example.gov"]);
        assert_eq!(issue.authority_name, vec!["Roads"]);
        assert_eq!(issue.decline_history.len(), 1);
        assert_eq!(issue.decline_history[0].reason, "Blurry");
    }

    #[test]
    fn mismatched_authority_lists_collapse() {
        let issue = raw(json!({
            "_id": "legacy-3",
            "authority_email": ["a@example.gov", "b@example.gov"],
            "authority_name": ["A"]
        }))
        .into_issue();

        assert_eq!(issue.authority_email, vec![FALLBACK_AUTHORITY_EMAIL]);
        assert_eq!(issue.authority_name, vec![FALLBACK_AUTHORITY_NAME]);
    }

    #[test]
    fn one_malformed_available_authority_replaces_all() {
        let issue = raw(json!({
            "_id": "legacy-4",
            "available_authorities": [
                { "name": "Parks", "email": "parks@example.gov", "type": "parks" },
                { "name": "Water", "email": "water@example.gov" }
            ]
        }))
        .into_issue();
        assert_eq!(issue.available_authorities, vec![Authority::fallback()]);

        let issue = raw(json!({
            "_id": "legacy-5",
            "available_authorities": [
                { "name": "Parks", "email": "parks@example.gov", "type": "parks" }
            ]
        }))
        .into_issue();
        assert_eq!(issue.available_authorities[0].name, "Parks");
    }

    #[test]
    fn null_fields_are_treated_as_absent() {
        let issue = raw(json!({
            "_id": "legacy-6",
            "category": null,
            "report": null,
            "user_email": null,
            "decline_reason": null
        }))
        .into_issue();

        assert_eq!(issue.category, "Public");
        assert!(issue.report.is_null());
        assert_eq!(issue.user_email, None);
        assert_eq!(issue.decline_reason, None);
    }
}
