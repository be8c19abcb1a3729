use chrono::Utc;
use snapfix_result::Result;
use ulid::Ulid;

use crate::{Image, ReferenceDb, ReferenceImage};

use super::AbstractImages;

#[async_trait]
impl AbstractImages for ReferenceDb {
    /// Store an image under the given filename, returning its blob id
    async fn upload_image(&self, filename: &str, issue_id: &str, data: &[u8]) -> Result<String> {
        let image = Image {
            id: Ulid::new().to_string(),
            filename: filename.to_string(),
            issue_id: Some(issue_id.to_string()),
            uploaded_at: Utc::now().timestamp_millis(),
        };

        let id = image.id.clone();
        self.images.lock().await.push(ReferenceImage {
            image,
            data: data.to_vec(),
        });

        Ok(id)
    }

    /// Fetch the most recent image stored under the given filename
    async fn fetch_image(&self, filename: &str) -> Result<Vec<u8>> {
        let images = self.images.lock().await;
        images
            .iter()
            .rev()
            .find(|entry| entry.image.filename == filename)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| create_error!(NotFound))
    }

    /// Delete an image by its blob id
    async fn delete_image(&self, id: &str) -> Result<()> {
        let mut images = self.images.lock().await;
        if let Some(index) = images.iter().position(|entry| entry.image.id == id) {
            images.remove(index);
            Ok(())
        } else {
            Err(create_error!(NotFound))
        }
    }

    /// Fetch information about every stored image
    async fn fetch_images(&self) -> Result<Vec<Image>> {
        let images = self.images.lock().await;
        Ok(images.iter().map(|entry| entry.image.clone()).collect())
    }
}
