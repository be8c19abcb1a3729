use snapfix_database::{DatabaseInfo, IssueRepository};

#[tokio::main]
async fn main() {
    snapfix_config::setup_logging();

    let repository = IssueRepository::new(DatabaseInfo::Auto);
    let issues = repository.list_issues().await.unwrap();

    for issue in issues {
        println!(
            "{} [{}] {} ({}, {}) -> {}",
            issue.id,
            issue.status.as_str(),
            issue.issue_type,
            issue.address,
            issue.zip_code,
            issue.authority_name.join(", ")
        );
    }
}
