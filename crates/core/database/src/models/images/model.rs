use std::time::Duration;

use chrono::Utc;
use snapfix_result::Result;

use crate::{Database, RawIssue};

auto_derived!(
    /// Photograph held in the blob store
    pub struct Image {
        /// Blob store id
        pub id: String,
        /// Name the blob was stored under
        pub filename: String,
        /// Issue this photograph was uploaded for
        pub issue_id: Option<String>,
        /// Upload time in milliseconds since the epoch
        pub uploaded_at: i64,
    }
);

impl Image {
    /// Blob name under which the photograph of an issue is stored
    pub fn filename_for(issue_id: &str) -> String {
        format!("{issue_id}.jpg")
    }

    /// Id of the issue owning this photograph
    ///
    /// Falls back to the filename for blobs uploaded without metadata.
    pub fn owner(&self) -> Option<&str> {
        self.issue_id
            .as_deref()
            .or_else(|| self.filename.strip_suffix(".jpg"))
    }

    /// Download the photograph of an issue
    pub async fn fetch_for_issue(db: &Database, issue_id: &str) -> Result<Vec<u8>> {
        db.fetch_image(&Self::filename_for(issue_id))
            .await
            .inspect_err(|err| {
                if err.is_not_found() {
                    error!("Image not found for issue {issue_id}");
                } else {
                    error!("Failed to retrieve image for issue {issue_id}: {err:?}");
                }
            })
    }

    /// Find photographs older than the grace period that no stored issue refers to
    pub async fn find_orphans(db: &Database, grace_period: Duration) -> Result<Vec<Image>> {
        let cutoff = Utc::now().timestamp_millis()
            - i64::try_from(grace_period.as_millis()).unwrap_or(i64::MAX);

        let mut orphans = vec![];
        for image in db.fetch_images().await? {
            if image.uploaded_at > cutoff {
                continue;
            }

            // This could be a single query, but the image metadata is not
            // guaranteed to be present on older uploads.
            let owner = match image.owner() {
                Some(issue_id) => db.fetch_issue(issue_id).await?.map(RawIssue::into_issue),
                None => None,
            };

            // A blob left behind by a second create under the same id is not
            // the one its issue refers to. Issues without a recorded image id
            // keep whatever was uploaded for them.
            let owned = owner.is_some_and(|issue| {
                issue.image_id.is_empty() || issue.image_id == image.id
            });

            if !owned {
                orphans.push(image);
            }
        }

        Ok(orphans)
    }

    /// Delete orphaned photographs, returning how many were removed
    pub async fn prune_orphans(db: &Database, grace_period: Duration) -> Result<usize> {
        let mut pruned = 0;
        for image in Self::find_orphans(db, grace_period).await? {
            match db.delete_image(&image.id).await {
                Ok(()) => {
                    info!("Deleted orphaned image {} ({})", image.id, image.filename);
                    pruned += 1;
                }
                Err(err) => warn!("Failed to delete orphaned image {}: {err:?}", image.id),
            }
        }

        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::{Image, Issue, NewIssue};

    #[test]
    fn owner_falls_back_to_filename() {
        let image = Image {
            id: "1".to_string(),
            filename: "issue-9.jpg".to_string(),
            issue_id: None,
            uploaded_at: 0,
        };

        assert_eq!(image.owner(), Some("issue-9"));
        assert_eq!(Image::filename_for("issue-9"), "issue-9.jpg");
    }

    #[tokio::test]
    async fn missing_image_is_not_found() {
        database_test!(|db| async move {
            let error = Image::fetch_for_issue(&db, "nothing-here").await.unwrap_err();
            assert!(error.is_not_found());
        });
    }

    #[tokio::test]
    async fn prune_only_orphans() {
        database_test!(|db| async move {
            Issue::create(
                &db,
                "owned",
                b"owned image",
                NewIssue {
                    report: json!({ "message": "report" }),
                    issue_type: "Graffiti".to_string(),
                    severity: "Low".to_string(),
                    category: "Public".to_string(),
                    priority: "Low".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

            db.upload_image(&Image::filename_for("orphan"), "orphan", b"orphan image")
                .await
                .unwrap();

            // nothing is old enough yet
            assert_eq!(
                Image::prune_orphans(&db, Duration::from_secs(3600))
                    .await
                    .unwrap(),
                0
            );

            let orphans = Image::find_orphans(&db, Duration::ZERO).await.unwrap();
            assert_eq!(orphans.len(), 1);
            assert_eq!(orphans[0].owner(), Some("orphan"));

            assert_eq!(Image::prune_orphans(&db, Duration::ZERO).await.unwrap(), 1);
            assert_eq!(db.fetch_images().await.unwrap().len(), 1);
            assert!(Image::fetch_for_issue(&db, "orphan")
                .await
                .unwrap_err()
                .is_not_found());
            assert_eq!(
                Image::fetch_for_issue(&db, "owned").await.unwrap(),
                b"owned image".to_vec()
            );
        });
    }

    #[tokio::test]
    async fn prune_replaced_upload_for_existing_issue() {
        database_test!(|db| async move {
            let image_id = Issue::create(
                &db,
                "twice",
                b"first",
                NewIssue {
                    report: json!({ "message": "report" }),
                    issue_type: "Pothole".to_string(),
                    severity: "High".to_string(),
                    category: "Public".to_string(),
                    priority: "High".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

            // upload left behind by a second create whose insert failed
            let stray = db
                .upload_image(&Image::filename_for("twice"), "twice", b"stray")
                .await
                .unwrap();

            let orphans = Image::find_orphans(&db, Duration::ZERO).await.unwrap();
            assert_eq!(orphans.len(), 1);
            assert_eq!(orphans[0].id, stray);

            assert_eq!(Image::prune_orphans(&db, Duration::ZERO).await.unwrap(), 1);

            let images = db.fetch_images().await.unwrap();
            assert_eq!(images.len(), 1);
            assert_eq!(images[0].id, image_id);
            assert_eq!(
                Image::fetch_for_issue(&db, "twice").await.unwrap(),
                b"first".to_vec()
            );
        });
    }
}
