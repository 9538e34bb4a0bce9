use std::fmt::Debug;
use std::path::Path;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// User agent string used for outgoing HTTP requests.
pub const USER_AGENT: &str = concat!("storebench/", env!("CARGO_PKG_VERSION"));

/// A type-erased [`StorageClient`] instance.
pub type BoxedClient = Box<dyn StorageClient>;

/// The measurement contract every storage backend under test implements.
///
/// Operations never panic on backend failures. Every failure is returned as a
/// [`StorageError`], so callers can tell a missing object apart from a lost connection.
#[async_trait::async_trait]
pub trait StorageClient: Debug + Send + Sync + 'static {
    /// The backend name, written into result rows and used for diagnostics.
    fn name(&self) -> &str;

    /// Transfers the bytes of a local file to the backend under `object_name`.
    async fn upload(&self, local_path: &Path, object_name: &str) -> StorageResult<()>;

    /// Fetches the object stored under `object_name` into `local_path`.
    ///
    /// Returns [`StorageError::NotFound`] if the object does not exist.
    async fn retrieve(&self, object_name: &str, local_path: &Path) -> StorageResult<()>;

    /// Deletes all objects created by the benchmark.
    ///
    /// This is best-effort. Callers are expected to log failures and carry on.
    async fn cleanup(&self) -> StorageResult<()>;
}

/// Errors returned by [`StorageClient`] operations and backend constructors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested object does not exist in the backend.
    #[error("object not found: {object}")]
    NotFound {
        /// The logical object name that was requested.
        object: String,
    },

    /// The backend answered with a status code the operation does not accept.
    #[error("{context}: unexpected status {status}")]
    Rejected {
        /// The operation that was rejected.
        context: String,
        /// The HTTP status code returned by the backend.
        status: u16,
    },

    /// A redirect was expected but the `Location` header was missing or malformed.
    #[error("{context}: missing or invalid redirect location")]
    Redirect {
        /// The operation that expected a redirect.
        context: String,
    },

    /// A configured endpoint is not a valid URL.
    #[error("invalid url `{url}`: {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why the URL was rejected.
        message: String,
    },

    /// IO errors related to reading the source file or writing the downloaded copy.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the HTTP client, both transport errors and errors decoding responses.
    #[error("reqwest error: {context}")]
    Reqwest {
        context: String,
        #[source]
        cause: reqwest::Error,
    },

    /// Errors from the S3 client library.
    #[error("s3 error: {context}")]
    S3 {
        context: String,
        #[source]
        cause: s3::error::S3Error,
    },

    /// Errors from the MongoDB driver.
    #[error("mongodb error: {context}")]
    Mongo {
        context: String,
        #[source]
        cause: mongodb::error::Error,
    },

    /// Any other backend error, such as invalid credentials.
    #[error("storage backend error: {context}")]
    Generic {
        context: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StorageError {
    /// Returns `true` if this error reports a missing object rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found(object: &str) -> Self {
        Self::NotFound {
            object: object.to_owned(),
        }
    }

    pub(crate) fn reqwest(context: impl Into<String>, cause: reqwest::Error) -> Self {
        Self::Reqwest {
            context: context.into(),
            cause,
        }
    }

    pub(crate) fn s3(context: impl Into<String>, cause: s3::error::S3Error) -> Self {
        Self::S3 {
            context: context.into(),
            cause,
        }
    }

    pub(crate) fn mongo(context: impl Into<String>, cause: mongodb::error::Error) -> Self {
        Self::Mongo {
            context: context.into(),
            cause,
        }
    }
}

/// Result type for storage client operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Creates a reqwest client with the defaults shared by the HTTP based backends.
///
/// Redirects are never followed automatically, since backends like WebHDFS need to inspect
/// and rewrite them.
pub fn reqwest_client() -> StorageResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|cause| StorageError::reqwest("failed to build http client", cause))
}

/// Streams the body of a response into a newly created local file.
pub(crate) async fn write_response(
    mut response: reqwest::Response,
    local_path: &Path,
) -> StorageResult<u64> {
    let file = File::create(local_path).await?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|cause| StorageError::reqwest("failed to read response body", cause))?
    {
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    Ok(written)
}
