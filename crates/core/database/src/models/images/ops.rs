use snapfix_result::Result;

use crate::Image;

#[cfg(feature = "mongodb")]
mod mongodb;
mod reference;

#[async_trait]
pub trait AbstractImages: Sync + Send {
    /// Store an image under the given filename, returning its blob id
    async fn upload_image(&self, filename: &str, issue_id: &str, data: &[u8]) -> Result<String>;

    /// Fetch the most recent image stored under the given filename
    async fn fetch_image(&self, filename: &str) -> Result<Vec<u8>>;

    /// Delete an image by its blob id
    async fn delete_image(&self, id: &str) -> Result<()>;

    /// Fetch information about every stored image
    async fn fetch_images(&self) -> Result<Vec<Image>>;
}
