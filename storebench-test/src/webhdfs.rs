//! Exposes an in-process fake of the WebHDFS gateway for use in integration tests.
//!
//! ```
//! use storebench_test::webhdfs::FakeWebHdfs;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = FakeWebHdfs::new().await;
//!    let url = server.namenode_url();
//!    // point a `WebHdfsClient` at the URL...
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, put};

type Files = Arc<Mutex<BTreeMap<String, Bytes>>>;

#[derive(Clone, Debug)]
struct Gateway {
    files: Files,
    port: u16,
}

/// An in-process fake of a WebHDFS namenode and datanode.
///
/// The namenode answers `CREATE` and `OPEN` with a `307` redirect to
/// `http://datanode:{port}/...`, the way a containerized cluster does. Clients must rewrite
/// [`datanode_authority`](Self::datanode_authority) to
/// [`local_authority`](Self::local_authority) to reach the datanode. Files are kept in memory and
/// the server listens on a random port on localhost until it is dropped.
#[derive(Debug)]
pub struct FakeWebHdfs {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    files: Files,
}

impl FakeWebHdfs {
    /// Starts the server on a random available port.
    pub async fn new() -> Self {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let socket = listener.local_addr().unwrap();

        let files = Files::default();
        let gateway = Gateway {
            files: files.clone(),
            port: socket.port(),
        };

        let app = Router::new()
            .route("/webhdfs/v1/", get(home_directory))
            .route("/webhdfs/v1/{*path}", any(namenode))
            .route("/datanode/{*path}", put(datanode_write).get(datanode_read))
            .with_state(gateway);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            files,
        }
    }

    /// Returns the WebHDFS REST root of the namenode.
    pub fn namenode_url(&self) -> String {
        format!("http://127.0.0.1:{}/webhdfs/v1", self.socket.port())
    }

    /// The unresolvable `host:port` the namenode redirects to.
    pub fn datanode_authority(&self) -> String {
        format!("datanode:{}", self.socket.port())
    }

    /// The `host:port` the datanode is actually reachable at.
    pub fn local_authority(&self) -> String {
        format!("127.0.0.1:{}", self.socket.port())
    }

    /// Returns the contents of the file at the given absolute HDFS path.
    pub fn file(&self, path: &str) -> Option<Bytes> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Returns all stored HDFS paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

impl Drop for FakeWebHdfs {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn remote_exception(status: StatusCode, exception: &str, message: &str) -> Response {
    let body = format!(
        r#"{{"RemoteException":{{"exception":"{exception}","javaClassName":"java.io.{exception}","message":"{message}"}}}}"#
    );
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn home_directory(Query(query): Query<HashMap<String, String>>) -> Response {
    match query.get("op").map(String::as_str) {
        Some("GETHOMEDIRECTORY") => {
            let user = query.get("user.name").map(String::as_str).unwrap_or("dr.who");
            (
                [(header::CONTENT_TYPE, "application/json")],
                format!(r#"{{"Path":"/user/{user}"}}"#),
            )
                .into_response()
        }
        _ => remote_exception(
            StatusCode::BAD_REQUEST,
            "IllegalArgumentException",
            "Invalid value for webhdfs parameter \"op\"",
        ),
    }
}

fn redirect(gateway: &Gateway, path: &str, op: &str) -> Response {
    let location = format!(
        "http://datanode:{}/datanode/{path}?op={op}&namenoderpcaddress=namenode:9000",
        gateway.port
    );
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response()
}

async fn namenode(
    State(gateway): State<Gateway>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let hdfs_path = format!("/{path}");
    let op = query.get("op").map(String::as_str).unwrap_or_default();

    match (method, op) {
        (Method::PUT, "CREATE") => {
            let overwrite = query.get("overwrite").is_some_and(|v| v == "true");
            if !overwrite && gateway.files.lock().unwrap().contains_key(&hdfs_path) {
                return remote_exception(
                    StatusCode::FORBIDDEN,
                    "FileAlreadyExistsException",
                    &format!("{hdfs_path} already exists"),
                );
            }
            redirect(&gateway, &path, "CREATE")
        }
        (Method::GET, "OPEN") => {
            if !gateway.files.lock().unwrap().contains_key(&hdfs_path) {
                return remote_exception(
                    StatusCode::NOT_FOUND,
                    "FileNotFoundException",
                    &format!("File does not exist: {hdfs_path}"),
                );
            }
            redirect(&gateway, &path, "OPEN")
        }
        (Method::DELETE, "DELETE") => {
            let recursive = query.get("recursive").is_some_and(|v| v == "true");
            let prefix = format!("{hdfs_path}/");

            let mut files = gateway.files.lock().unwrap();
            let has_children = files.keys().any(|key| key.starts_with(&prefix));
            if has_children && !recursive {
                return remote_exception(
                    StatusCode::FORBIDDEN,
                    "PathIsNotEmptyDirectoryException",
                    &format!("{hdfs_path} is non empty"),
                );
            }

            let before = files.len();
            files.retain(|key, _| key != &hdfs_path && !key.starts_with(&prefix));
            let deleted = files.len() != before;

            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                format!(r#"{{"boolean":{deleted}}}"#),
            )
                .into_response()
        }
        _ => remote_exception(
            StatusCode::BAD_REQUEST,
            "IllegalArgumentException",
            &format!("Invalid value for webhdfs parameter \"op\": {op}"),
        ),
    }
}

async fn datanode_write(
    State(gateway): State<Gateway>,
    Path(path): Path<String>,
    body: Bytes,
) -> StatusCode {
    gateway
        .files
        .lock()
        .unwrap()
        .insert(format!("/{path}"), body);
    StatusCode::CREATED
}

async fn datanode_read(State(gateway): State<Gateway>, Path(path): Path<String>) -> Response {
    match gateway.files.lock().unwrap().get(&format!("/{path}")) {
        Some(contents) => contents.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
