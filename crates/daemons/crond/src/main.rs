use snapfix_config::configure;
use snapfix_database::{DatabaseInfo, IssueRepository};
use snapfix_result::Result;
use tasks::prune_orphaned_images;

pub mod tasks;

#[tokio::main]
async fn main() -> Result<()> {
    configure!(crond);

    let repository = IssueRepository::new(DatabaseInfo::Auto);
    repository.database().await?;

    prune_orphaned_images::task(&repository).await
}
