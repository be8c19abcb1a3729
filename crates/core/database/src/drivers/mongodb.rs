use std::ops::Deref;
use std::time::Duration;

use futures::StreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::Result;
use mongodb::gridfs::GridFsBucket;
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::results::{InsertOneResult, UpdateResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_retry::Retry;

use super::RetryPolicy;

database_derived!(
    /// MongoDB implementation
    pub struct MongoDb(pub ::mongodb::Client, pub String);
);

impl Deref for MongoDb {
    type Target = mongodb::Client;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[allow(dead_code)]
impl MongoDb {
    /// Open a client and ping the server, backing off exponentially between failed attempts
    pub async fn connect_with_retry(
        uri: &str,
        server_selection_timeout: Duration,
        policy: RetryPolicy,
    ) -> snapfix_result::Result<mongodb::Client> {
        let attempts = policy.attempts.max(1);
        let mut attempt = 0;

        Retry::spawn(policy.strategy(), || {
            attempt += 1;
            let current = attempt;

            async move {
                Self::try_connect(uri, server_selection_timeout)
                    .await
                    .inspect_err(|err| {
                        error!("Failed to connect to MongoDB (attempt {current}/{attempts}): {err}")
                    })
            }
        })
        .await
        .map_err(|_| {
            error!("Max retries reached. Could not connect to MongoDB.");
            create_error!(ConnectionFailed { attempts })
        })
    }

    async fn try_connect(uri: &str, server_selection_timeout: Duration) -> Result<mongodb::Client> {
        let mut options = ClientOptions::parse(uri).await?;
        options.server_selection_timeout = Some(server_selection_timeout);

        let client = mongodb::Client::with_options(options)?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        Ok(client)
    }

    /// Get the Snapfix database
    pub fn db(&self) -> mongodb::Database {
        self.database(&self.1)
    }

    /// Get a collection by its name
    pub fn col<T: Send + Sync>(&self, collection: &str) -> mongodb::Collection<T> {
        self.db().collection(collection)
    }

    /// Get the default GridFS bucket
    pub fn bucket(&self) -> GridFsBucket {
        self.db().gridfs_bucket(None)
    }

    /// Insert one document into a collection
    pub async fn insert_one<T: Serialize + Send + Sync>(
        &self,
        collection: &'static str,
        document: T,
    ) -> Result<InsertOneResult> {
        self.col::<T>(collection).insert_one(document).await
    }

    /// Find multiple documents in a collection with options
    ///
    /// Documents which fail to deserialise are skipped.
    pub async fn find_with_options<O, T: DeserializeOwned + Unpin + Send + Sync>(
        &self,
        collection: &'static str,
        projection: Document,
        options: O,
    ) -> Result<Vec<T>>
    where
        O: Into<Option<FindOptions>>,
    {
        Ok(self
            .col::<T>(collection)
            .find(projection)
            .with_options(options)
            .await?
            .filter_map(|s| async move {
                match s {
                    Ok(document) => Some(document),
                    Err(err) => {
                        warn!("Skipping unreadable document in {collection}: {err}");
                        None
                    }
                }
            })
            .collect::<Vec<T>>()
            .await)
    }

    /// Find one document
    pub async fn find_one<T: DeserializeOwned + Unpin + Send + Sync>(
        &self,
        collection: &'static str,
        projection: Document,
    ) -> Result<Option<T>> {
        self.col::<T>(collection).find_one(projection).await
    }

    /// Find one document by its ID
    pub async fn find_one_by_id<T: DeserializeOwned + Unpin + Send + Sync>(
        &self,
        collection: &'static str,
        id: &str,
    ) -> Result<Option<T>> {
        self.find_one(
            collection,
            doc! {
                "_id": id
            },
        )
        .await
    }

    /// Update one document given a filter and an update document
    pub async fn update_one(
        &self,
        collection: &'static str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult> {
        self.col::<Document>(collection)
            .update_one(filter, update)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use snapfix_result::ErrorType;

    use super::{MongoDb, RetryPolicy};

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let error = MongoDb::connect_with_retry(
            "mongodb://127.0.0.1:1",
            Duration::from_millis(50),
            RetryPolicy {
                attempts: 2,
                base_delay: Duration::from_millis(1),
            },
        )
        .await
        .unwrap_err();

        assert!(error.is_storage());
        assert!(matches!(
            error.error_type,
            ErrorType::ConnectionFailed { attempts: 2 }
        ));
    }
}
