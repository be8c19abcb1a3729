#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

/// Result type with custom Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error information
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Error {
    /// Type of error and additional information
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub error_type: ErrorType,

    /// Where this error occurred
    pub location: String,
}

/// Possible error types
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    // ? Validation errors, the caller supplied bad input
    MissingFields {
        fields: Vec<String>,
    },
    InvalidStatus {
        status: String,
    },
    FailedValidation {
        error: String,
    },

    // ? Storage errors, the underlying store failed
    DatabaseError {
        operation: String,
        collection: String,
    },
    BlobStoreError {
        operation: String,
        filename: String,
    },
    ConnectionFailed {
        attempts: u32,
    },

    // ? General errors
    NotFound,
    InternalError,
}

impl Error {
    /// Whether the caller is at fault
    pub fn is_validation(&self) -> bool {
        matches!(
            self.error_type,
            ErrorType::MissingFields { .. }
                | ErrorType::InvalidStatus { .. }
                | ErrorType::FailedValidation { .. }
        )
    }

    /// Whether a document or blob store operation failed
    pub fn is_storage(&self) -> bool {
        matches!(
            self.error_type,
            ErrorType::DatabaseError { .. }
                | ErrorType::BlobStoreError { .. }
                | ErrorType::ConnectionFailed { .. }
        )
    }

    /// Whether the requested object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self.error_type, ErrorType::NotFound)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} at {}", self.error_type, self.location)
    }
}

impl std::error::Error for Error {}

#[macro_export]
macro_rules! create_error {
    ( $error: ident $( $tt:tt )? ) => {
        $crate::Error {
            error_type: $crate::ErrorType::$error $( $tt )?,
            location: format!("{}:{}:{}", file!(), line!(), column!()),
        }
    };
}

#[macro_export]
macro_rules! create_database_error {
    ( $operation: expr, $collection: expr ) => {
        $crate::create_error!(DatabaseError {
            operation: $operation.to_string(),
            collection: $collection.to_string()
        })
    };
}

#[macro_export]
macro_rules! create_storage_error {
    ( $operation: expr, $filename: expr ) => {
        $crate::create_error!(BlobStoreError {
            operation: $operation.to_string(),
            filename: $filename.to_string()
        })
    };
}
