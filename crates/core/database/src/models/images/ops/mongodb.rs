use bson::{oid::ObjectId, Bson};
use futures::io::{AsyncReadExt, AsyncWriteExt};
use futures::TryStreamExt;
use mongodb::error::{Error, ErrorKind, GridFsErrorKind};
use snapfix_result::Result;

use crate::Image;
use crate::MongoDb;

use super::AbstractImages;

fn is_file_not_found(err: &Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. })
    )
}

fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(id) => id.clone(),
        other => other.to_string(),
    }
}

fn id_from_string(id: &str) -> Bson {
    ObjectId::parse_str(id)
        .map(Bson::ObjectId)
        .unwrap_or_else(|_| Bson::String(id.to_string()))
}

#[async_trait]
impl AbstractImages for MongoDb {
    /// Store an image under the given filename, returning its blob id
    async fn upload_image(&self, filename: &str, issue_id: &str, data: &[u8]) -> Result<String> {
        let mut stream = self
            .bucket()
            .open_upload_stream(filename)
            .metadata(doc! {
                "issue_id": issue_id
            })
            .await
            .map_err(|err| {
                error!("Failed to open upload stream for {filename}: {err}");
                create_storage_error!("open_upload_stream", filename)
            })?;

        stream.write_all(data).await.map_err(|err| {
            error!("Failed to write {filename}: {err}");
            create_storage_error!("upload", filename)
        })?;

        stream.close().await.map_err(|err| {
            error!("Failed to finish writing {filename}: {err}");
            create_storage_error!("upload", filename)
        })?;

        Ok(id_to_string(stream.id()))
    }

    /// Fetch the most recent image stored under the given filename
    async fn fetch_image(&self, filename: &str) -> Result<Vec<u8>> {
        let mut stream = self
            .bucket()
            .open_download_stream_by_name(filename)
            .await
            .map_err(|err| {
                if is_file_not_found(&err) {
                    create_error!(NotFound)
                } else {
                    error!("Failed to open download stream for {filename}: {err}");
                    create_storage_error!("open_download_stream_by_name", filename)
                }
            })?;

        let mut buf = vec![];
        stream.read_to_end(&mut buf).await.map_err(|err| {
            error!("Failed to read {filename}: {err}");
            create_storage_error!("download", filename)
        })?;

        Ok(buf)
    }

    /// Delete an image by its blob id
    async fn delete_image(&self, id: &str) -> Result<()> {
        self.bucket()
            .delete(id_from_string(id))
            .await
            .map_err(|err| {
                if is_file_not_found(&err) {
                    create_error!(NotFound)
                } else {
                    error!("Failed to delete image {id}: {err}");
                    create_storage_error!("delete", id)
                }
            })
    }

    /// Fetch information about every stored image
    async fn fetch_images(&self) -> Result<Vec<Image>> {
        let files: Vec<_> = self
            .bucket()
            .find(doc! {})
            .await
            .map_err(|err| {
                error!("Failed to list images: {err}");
                create_storage_error!("find", "*")
            })?
            .try_collect()
            .await
            .map_err(|err| {
                error!("Failed to list images: {err}");
                create_storage_error!("find", "*")
            })?;

        Ok(files
            .into_iter()
            .map(|file| Image {
                id: id_to_string(&file.id),
                filename: file.filename.unwrap_or_default(),
                issue_id: file
                    .metadata
                    .as_ref()
                    .and_then(|metadata| metadata.get_str("issue_id").ok())
                    .map(str::to_string),
                uploaded_at: file.upload_date.timestamp_millis(),
            })
            .collect())
    }
}
