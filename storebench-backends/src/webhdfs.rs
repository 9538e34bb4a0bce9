use std::fmt;
use std::path::Path;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, RequestBuilder, StatusCode, Url};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::common::{StorageClient, StorageError, StorageResult, reqwest_client, write_response};

/// Connection settings for a WebHDFS gateway.
#[derive(Clone, Debug)]
pub struct WebHdfsConfig {
    /// The namenode REST root, for example `http://localhost:9870/webhdfs/v1`.
    pub namenode_url: String,
    /// The HDFS directory all benchmark objects are written below.
    pub base_path: String,
    /// The HDFS user passed as `user.name`.
    pub user: String,
    /// Host rewrites applied to datanode redirects, as `(from, to)` pairs.
    ///
    /// Namenodes running in containers redirect to datanode hostnames that are only resolvable
    /// inside their network, such as `datanode:9864`.
    pub redirect_rewrites: Vec<(String, String)>,
}

impl Default for WebHdfsConfig {
    fn default() -> Self {
        Self {
            namenode_url: "http://localhost:9870/webhdfs/v1".into(),
            base_path: "/multimedia".into(),
            user: "root".into(),
            redirect_rewrites: vec![("datanode:9864".into(), "localhost:9864".into())],
        }
    }
}

/// A [`StorageClient`] talking to HDFS through the WebHDFS REST API.
///
/// Writes and reads follow the two-step protocol of WebHDFS: the namenode answers with a
/// redirect to a datanode, which then receives or serves the actual bytes.
pub struct WebHdfsClient {
    client: reqwest::Client,
    namenode_url: Url,
    base_path: String,
    user: String,
    redirect_rewrites: Vec<(String, String)>,
}

impl WebHdfsClient {
    /// Creates a new client for the given gateway.
    ///
    /// No request is sent here; WebHDFS has no session to establish.
    pub fn new(config: WebHdfsConfig) -> StorageResult<Self> {
        let namenode_url =
            Url::parse(&config.namenode_url).map_err(|err| StorageError::InvalidUrl {
                url: config.namenode_url.clone(),
                message: err.to_string(),
            })?;

        if namenode_url.cannot_be_a_base() {
            return Err(StorageError::InvalidUrl {
                url: config.namenode_url,
                message: "not a base url".into(),
            });
        }

        Ok(Self {
            client: reqwest_client()?,
            namenode_url,
            base_path: config.base_path,
            user: config.user,
            redirect_rewrites: config.redirect_rewrites,
        })
    }

    /// Checks that the namenode is reachable and accepts the configured user.
    pub async fn ping(&self) -> StorageResult<()> {
        let mut url = self.namenode_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("");
        }
        url.query_pairs_mut()
            .append_pair("op", "GETHOMEDIRECTORY")
            .append_pair("user.name", &self.user);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|cause| StorageError::reqwest("ping namenode", cause))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(StorageError::Rejected {
                context: "ping namenode".into(),
                status: status.as_u16(),
            }),
        }
    }

    fn operation_url(&self, object_name: Option<&str>, op: &str) -> Url {
        let mut url = self.namenode_url.clone();
        let segments = self
            .base_path
            .split('/')
            .chain(object_name.into_iter().flat_map(|name| name.split('/')))
            .filter(|segment| !segment.is_empty());

        // checked for `cannot_be_a_base` in the constructor
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }

        url.query_pairs_mut()
            .append_pair("op", op)
            .append_pair("user.name", &self.user);
        url
    }

    /// Applies the configured host rewrites to a datanode redirect.
    pub fn rewrite_location(&self, location: &str) -> String {
        let mut location = location.to_owned();
        for (from, to) in &self.redirect_rewrites {
            if location.contains(from.as_str()) {
                location = location.replace(from.as_str(), to);
            }
        }
        location
    }

    /// Sends a namenode request and resolves the datanode it redirects to.
    async fn datanode_location(
        &self,
        request: RequestBuilder,
        context: &str,
        object_name: &str,
    ) -> StorageResult<String> {
        let response = request
            .send()
            .await
            .map_err(|cause| StorageError::reqwest(context, cause))?;

        match response.status() {
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => {}
            StatusCode::NOT_FOUND => return Err(StorageError::not_found(object_name)),
            status => {
                return Err(StorageError::Rejected {
                    context: context.into(),
                    status: status.as_u16(),
                });
            }
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| StorageError::Redirect {
                context: context.into(),
            })?;

        let location = self.rewrite_location(location);
        tracing::trace!(%location, "following datanode redirect");
        Ok(location)
    }
}

impl fmt::Debug for WebHdfsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebHdfsClient")
            .field("namenode_url", &self.namenode_url.as_str())
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl StorageClient for WebHdfsClient {
    fn name(&self) -> &str {
        "HDFS"
    }

    #[tracing::instrument(level = "trace", skip(self, local_path))]
    async fn upload(&self, local_path: &Path, object_name: &str) -> StorageResult<()> {
        let mut url = self.operation_url(Some(object_name), "CREATE");
        url.query_pairs_mut().append_pair("overwrite", "true");

        let location = self
            .datanode_location(self.client.put(url), "create file", object_name)
            .await?;

        let file = File::open(local_path).await?;
        let len = file.metadata().await?.len();

        let response = self
            .client
            .put(location)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, len)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|cause| StorageError::reqwest("write file data", cause))?;

        match response.status() {
            StatusCode::CREATED => Ok(()),
            status => Err(StorageError::Rejected {
                context: "write file data".into(),
                status: status.as_u16(),
            }),
        }
    }

    #[tracing::instrument(level = "trace", skip(self, local_path))]
    async fn retrieve(&self, object_name: &str, local_path: &Path) -> StorageResult<()> {
        let url = self.operation_url(Some(object_name), "OPEN");
        let location = self
            .datanode_location(self.client.get(url), "open file", object_name)
            .await?;

        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|cause| StorageError::reqwest("read file data", cause))?;

        match response.status() {
            StatusCode::OK => {
                write_response(response, local_path).await?;
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(StorageError::not_found(object_name)),
            status => Err(StorageError::Rejected {
                context: "read file data".into(),
                status: status.as_u16(),
            }),
        }
    }

    async fn cleanup(&self) -> StorageResult<()> {
        let mut url = self.operation_url(None, "DELETE");
        url.query_pairs_mut().append_pair("recursive", "true");

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|cause| StorageError::reqwest("delete base directory", cause))?;

        match response.status() {
            StatusCode::OK => {
                tracing::debug!(base_path = %self.base_path, "deleted base directory");
                Ok(())
            }
            status => Err(StorageError::Rejected {
                context: "delete base directory".into(),
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> WebHdfsClient {
        WebHdfsClient::new(WebHdfsConfig::default()).unwrap()
    }

    #[test]
    fn builds_operation_urls() {
        let url = client().operation_url(Some("small/my photo.jpg"), "OPEN");
        assert_eq!(
            url.as_str(),
            "http://localhost:9870/webhdfs/v1/multimedia/small/my%20photo.jpg?op=OPEN&user.name=root"
        );

        let url = client().operation_url(None, "DELETE");
        assert_eq!(
            url.as_str(),
            "http://localhost:9870/webhdfs/v1/multimedia?op=DELETE&user.name=root"
        );
    }

    #[test]
    fn rewrites_datanode_redirects() {
        let location = client().rewrite_location(
            "http://datanode:9864/webhdfs/v1/multimedia/a.txt?op=CREATE&namenoderpcaddress=namenode:9000",
        );
        assert_eq!(
            location,
            "http://localhost:9864/webhdfs/v1/multimedia/a.txt?op=CREATE&namenoderpcaddress=namenode:9000"
        );

        let untouched = client().rewrite_location("http://10.0.0.7:9864/webhdfs/v1/a.txt");
        assert_eq!(untouched, "http://10.0.0.7:9864/webhdfs/v1/a.txt");
    }

    #[test]
    fn rejects_invalid_namenode_url() {
        let config = WebHdfsConfig {
            namenode_url: "not a url".into(),
            ..Default::default()
        };
        let err = WebHdfsClient::new(config).unwrap_err();
        assert!(matches!(err, StorageError::InvalidUrl { .. }));
    }
}
