#[cfg(feature = "mongodb")]
mod mongodb;
mod reference;

use std::time::Duration;

use rand::Rng;
use snapfix_config::config;
use snapfix_result::Result;
use tokio_retry::strategy::ExponentialBackoff;

#[cfg(feature = "mongodb")]
pub use self::mongodb::*;
pub use self::reference::*;

/// Database information to use to create a client
#[derive(Clone)]
pub enum DatabaseInfo {
    /// Auto-detect the database in use
    Auto,
    /// Auto-detect the database in use and create an empty testing database
    Test(String),
    /// Use the mock database
    Reference,
    /// Connect to MongoDB
    #[cfg(feature = "mongodb")]
    MongoDb { uri: String, database_name: String },
    /// Use existing MongoDB connection
    #[cfg(feature = "mongodb")]
    MongoDbFromClient(::mongodb::Client, String),
}

/// Database
#[derive(Clone)]
pub enum Database {
    /// Mock database
    Reference(ReferenceDb),
    /// MongoDB database
    #[cfg(feature = "mongodb")]
    MongoDb(MongoDb),
}

/// How many times and how patiently to try connecting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, at least one
    pub attempts: u32,
    /// Delay after the first failure, doubled after each further failure
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delays to wait between attempts
    pub fn strategy(&self) -> impl Iterator<Item = Duration> {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);

        ExponentialBackoff::from_millis(2)
            .factor(base_ms / 2)
            .take(self.attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl DatabaseInfo {
    /// Create a database client from the given database information
    #[async_recursion]
    pub async fn connect(self) -> Result<Database> {
        let config = config().await;

        match self {
            DatabaseInfo::Auto => {
                if std::env::var("TEST_DB").is_ok() {
                    DatabaseInfo::Test(format!(
                        "snapfix_test_{}",
                        rand::thread_rng().gen_range(1_000_000..10_000_000)
                    ))
                    .connect()
                    .await
                } else if !config.database.mongodb.is_empty() {
                    #[cfg(feature = "mongodb")]
                    return DatabaseInfo::MongoDb {
                        uri: config.database.mongodb.clone(),
                        database_name: config.database.database_name(),
                    }
                    .connect()
                    .await;

                    #[cfg(not(feature = "mongodb"))]
                    return Err(create_error!(FailedValidation {
                        error: "MongoDB not enabled.".to_string()
                    }));
                } else {
                    DatabaseInfo::Reference.connect().await
                }
            }
            DatabaseInfo::Test(database_name) => {
                match std::env::var("TEST_DB")
                    .unwrap_or_else(|_| "REFERENCE".to_string())
                    .as_str()
                {
                    "MONGODB" => {
                        #[cfg(feature = "mongodb")]
                        return DatabaseInfo::MongoDb {
                            uri: config.database.mongodb,
                            database_name: database_name.replace(['.', '$', ' '], "_"),
                        }
                        .connect()
                        .await;

                        #[cfg(not(feature = "mongodb"))]
                        return Err(create_error!(FailedValidation {
                            error: "MongoDB not enabled.".to_string()
                        }));
                    }
                    _ => DatabaseInfo::Reference.connect().await,
                }
            }
            DatabaseInfo::Reference => Ok(Database::Reference(Default::default())),
            #[cfg(feature = "mongodb")]
            DatabaseInfo::MongoDb { uri, database_name } => {
                let policy = RetryPolicy {
                    attempts: config.database.connect_attempts.max(1),
                    base_delay: Duration::from_millis(config.database.connect_retry_delay_ms),
                };

                let timeout = Duration::from_millis(config.database.server_selection_timeout_ms);
                let client = MongoDb::connect_with_retry(&uri, timeout, policy).await?;

                info!("Database connection established to {database_name}");
                Ok(Database::MongoDb(MongoDb(client, database_name)))
            }
            #[cfg(feature = "mongodb")]
            DatabaseInfo::MongoDbFromClient(client, database_name) => {
                Ok(Database::MongoDb(MongoDb(client, database_name)))
            }
        }
    }
}

impl Database {
    /// Drop the entire database, used to clean up after tests
    pub async fn drop_database(&self) {
        match self {
            Database::Reference(db) => db.clear().await,
            #[cfg(feature = "mongodb")]
            Database::MongoDb(db) => {
                if let Err(err) = db.db().drop().await {
                    warn!("Failed to drop database {}: {err:?}", db.1);
                }
            }
        }
    }
}
