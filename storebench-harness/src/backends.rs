//! Construction of storage clients from configuration.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use storebench_backends::{
    BoxedClient, GridFsClient, GridFsConfig, S3Client, S3Config, StorageResult, WebHdfsClient,
    WebHdfsConfig,
};

use crate::config::{BackendKind, Backends, Hdfs, Minio, Mongodb};

/// Opens connections to the benchmarked backends.
///
/// Connections are opened again for every run, so that a backend restarted between runs does not
/// affect later runs.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Connects to all backends, in benchmark order.
    ///
    /// Fails if any backend cannot be reached.
    async fn connect(&self) -> Result<Vec<BoxedClient>>;
}

#[async_trait]
impl Connect for Backends {
    async fn connect(&self) -> Result<Vec<BoxedClient>> {
        let mut clients = Vec::with_capacity(self.enabled.len());
        for &kind in &self.enabled {
            let client = self
                .connect_one(kind)
                .await
                .with_context(|| format!("failed to connect to {kind}"))?;
            clients.push(client);
        }
        Ok(clients)
    }
}

impl Backends {
    /// Connects to a single backend, whether or not it is enabled.
    pub async fn connect_one(&self, kind: BackendKind) -> StorageResult<BoxedClient> {
        tracing::debug!(%kind, "connecting");
        let client: BoxedClient = match kind {
            BackendKind::Hdfs => {
                let client = WebHdfsClient::new(self.hdfs.client_config())?;
                client.ping().await?;
                Box::new(client)
            }
            BackendKind::Minio => Box::new(S3Client::connect(self.minio.client_config()).await?),
            BackendKind::Mongodb => {
                Box::new(GridFsClient::connect(self.mongodb.client_config()).await?)
            }
        };
        Ok(client)
    }

    /// Connects to every enabled backend, reporting each outcome instead of stopping at the
    /// first failure.
    pub async fn connect_each(&self) -> Vec<(BackendKind, StorageResult<BoxedClient>)> {
        let mut outcomes = Vec::with_capacity(self.enabled.len());
        for &kind in &self.enabled {
            outcomes.push((kind, self.connect_one(kind).await));
        }
        outcomes
    }
}

impl Hdfs {
    fn client_config(&self) -> WebHdfsConfig {
        WebHdfsConfig {
            namenode_url: self.namenode_url.clone(),
            base_path: self.base_path.clone(),
            user: self.user.clone(),
            redirect_rewrites: self
                .redirect_rewrites
                .iter()
                .map(|(from, to)| (from.clone(), to.clone()))
                .collect(),
        }
    }
}

impl Minio {
    fn client_config(&self) -> S3Config {
        S3Config {
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            bucket: self.bucket.clone(),
            access_key: Some(self.access_key.expose_secret().as_str().to_owned()),
            secret_key: Some(self.secret_key.expose_secret().as_str().to_owned()),
            path_style: true,
            request_timeout: self.request_timeout,
        }
    }
}

impl Mongodb {
    fn client_config(&self) -> GridFsConfig {
        GridFsConfig {
            uri: self.uri.expose_secret().as_str().to_owned(),
            database: self.database.clone(),
            metadata_collection: self.metadata_collection.clone(),
            server_selection_timeout: self.server_selection_timeout,
        }
    }
}
