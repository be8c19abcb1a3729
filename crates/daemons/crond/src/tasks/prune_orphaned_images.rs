use std::time::Duration;

use log::{info, warn};
use snapfix_config::config;
use snapfix_database::IssueRepository;
use snapfix_result::Result;
use tokio::time::sleep;

pub async fn task(repository: &IssueRepository) -> Result<()> {
    loop {
        let sweeper = config().await.sweeper;

        match repository
            .reconcile_orphaned_images(Duration::from_secs(sweeper.grace_period_secs))
            .await
        {
            Ok(0) => {}
            Ok(count) => info!("Deleted {count} orphaned images"),
            Err(err) => warn!("Failed to prune orphaned images: {err:?}"),
        }

        sleep(Duration::from_secs(sweeper.interval_secs)).await;
    }
}
