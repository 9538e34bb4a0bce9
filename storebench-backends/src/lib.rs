//! Storage clients for the backends benchmarked by storebench.
//!
//! Every backend implements the [`StorageClient`] measurement contract: upload a local file under
//! a logical object name, retrieve it into a local path, and clean up everything the benchmark
//! created. Protocol details stay internal to each client:
//!
//! - [`WebHdfsClient`] writes to HDFS through the WebHDFS gateway, following the namenode's
//!   redirect to a datanode for every read and write.
//! - [`S3Client`] talks to S3 compatible object stores such as MinIO.
//! - [`GridFsClient`] stores blobs in MongoDB GridFS next to a metadata record per object.
//!
//! Clients are constructed explicitly and owned by the caller. Constructors fail when the backend
//! is misconfigured or unreachable; operations report failures as [`StorageError`] values.
#![warn(missing_debug_implementations)]

mod common;
mod gridfs;
mod s3_compatible;
mod webhdfs;

pub use common::{
    BoxedClient, StorageClient, StorageError, StorageResult, USER_AGENT, reqwest_client,
};
pub use gridfs::{GridFsClient, GridFsConfig};
pub use s3_compatible::{S3Client, S3Config};
pub use webhdfs::{WebHdfsClient, WebHdfsConfig};
