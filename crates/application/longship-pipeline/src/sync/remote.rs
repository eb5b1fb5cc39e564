use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use longship_core::formats::parse_file_list;
use longship_core::{Mirror, RemoteManifest};
use longship_infra::{get_ok, mirror_file_url, ServerUrls};
use reqwest::Client;
use tracing::{debug, warn};

use crate::sync::SyncError;

/// File bytes as they arrive from a mirror or the sync server.
pub type RemoteBody = Pin<Box<dyn Stream<Item = Result<Bytes, SyncError>> + Send>>;

/// Read side of the sync server. No operation here touches the local filesystem.
#[async_trait::async_trait]
pub trait RemoteSource: Send + Sync {
    /// The manifest, with entry paths already normalized.
    async fn fetch_manifest(&self) -> Result<RemoteManifest, SyncError>;

    async fn open_file(&self, relative_path: &str) -> Result<RemoteBody, SyncError>;

    async fn fetch_link_target(&self, relative_path: &str) -> Result<String, SyncError>;
}

/// HTTP source: manifest and link targets from the sync server, file bytes from the
/// configured mirrors first and the sync server last.
pub struct HttpRemoteSource {
    client: Client,
    urls: ServerUrls,
    mirrors: Vec<Mirror>,
}

impl HttpRemoteSource {
    pub fn new(client: Client, urls: ServerUrls, mirrors: Vec<Mirror>) -> Self {
        Self {
            client,
            urls,
            mirrors,
        }
    }

    fn body(resp: reqwest::Response) -> RemoteBody {
        resp.bytes_stream()
            .map(|chunk| chunk.map_err(|e| SyncError::Network(format!("body read failed: {e}"))))
            .boxed()
    }
}

#[async_trait::async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, SyncError> {
        let bytes = get_ok(&self.client, self.urls.files())
            .await?
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("file list read failed: {e}")))?;

        let manifest = parse_file_list(&bytes)
            .map_err(|e| SyncError::Protocol(format!("file list parse failed: {e}")))?;
        debug!(
            "fetched manifest: status {}, {} entries",
            manifest.status,
            manifest.entries.len()
        );
        Ok(manifest)
    }

    async fn open_file(&self, relative_path: &str) -> Result<RemoteBody, SyncError> {
        for mirror in &self.mirrors {
            let url = match mirror_file_url(mirror, relative_path) {
                Ok(u) => u,
                Err(e) => {
                    warn!("skipping mirror {}: {}", mirror.host, e);
                    continue;
                }
            };
            match get_ok(&self.client, url).await {
                Ok(resp) => return Ok(Self::body(resp)),
                Err(e) => warn!("mirror {} failed for {}: {}", mirror.host, relative_path, e),
            }
        }

        let resp = get_ok(&self.client, self.urls.sync_file(relative_path)).await?;
        Ok(Self::body(resp))
    }

    async fn fetch_link_target(&self, relative_path: &str) -> Result<String, SyncError> {
        let bytes = get_ok(&self.client, self.urls.sync_file(relative_path))
            .await?
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("link target read failed: {e}")))?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            SyncError::Protocol(format!("link target for {relative_path} is not UTF-8"))
        })
    }
}
