use crate::error::FetchError;
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Get standard user agent string
pub fn get_user_agent() -> &'static str {
    concat!("PlaneImageFetch/", env!("CARGO_PKG_VERSION"))
}

/// Downloads one URL to one local path.
///
/// Implementations make exactly one attempt and never leave a partial file at
/// `destination` when they fail. Returns the number of bytes written.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError>;
}

/// `Fetch` over HTTP(S) with reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .connect_timeout(timeout)
            .build()?;

        Ok(Self { client, timeout })
    }

    async fn download(&self, url: &str, part_path: &Path) -> Result<u64, FetchError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let mut file = tokio::fs::File::create(part_path)
            .await
            .map_err(|source| FetchError::Io {
                operation: "Failed to create",
                path: part_path.to_path_buf(),
                source,
            })?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        loop {
            let chunk = match tokio::time::timeout(self.timeout, stream.next()).await {
                Ok(Some(chunk)) => chunk?,
                Ok(None) => break,
                Err(_) => return Err(FetchError::Timeout(self.timeout)),
            };

            file.write_all(&chunk)
                .await
                .map_err(|source| FetchError::Io {
                    operation: "Failed to write",
                    path: part_path.to_path_buf(),
                    source,
                })?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|source| FetchError::Io {
            operation: "Failed to flush",
            path: part_path.to_path_buf(),
            source,
        })?;

        Ok(written)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        let part_path = part_path(destination);

        let result = match self.download(url, &part_path).await {
            Ok(written) => tokio::fs::rename(&part_path, destination)
                .await
                .map(|_| written)
                .map_err(|source| FetchError::Io {
                    operation: "Failed to move download into",
                    path: destination.to_path_buf(),
                    source,
                }),
            Err(e) => Err(e),
        };

        if result.is_err() && part_path.exists() {
            if let Err(cleanup_err) = tokio::fs::remove_file(&part_path).await {
                tracing::warn!(
                    "Failed to cleanup partial download {}: {}",
                    part_path.display(),
                    cleanup_err
                );
            }
        }

        result
    }
}

/// Sibling path the body is streamed into before it replaces `destination`
fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
