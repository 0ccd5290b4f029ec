//! Cover art downloads
//!
//! Covers are saved as `{collection id}_{original file name}` in the covers
//! directory. An existing file is never overwritten: a clashing name gets a
//! ` (1)`, ` (2)`, ... suffix before its extension.

use crate::HarvestError;
use reqwest::{redirect::Policy, Client};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use url::Url;

/// Gives up on a name after this many numbered variants
const MAX_NAME_VARIANTS: u32 = 1000;

/// Builds the HTTP client used for asset downloads
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Last path segment of an asset URL, used as its original file name
pub fn original_file_name(url: &str) -> String {
    let from_url = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });
    let name = from_url.unwrap_or_else(|| url.rsplit('/').next().unwrap_or_default().to_string());

    // Keep the name inside the covers directory
    let name: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    if name.is_empty() || name == "." || name == ".." {
        "cover".to_string()
    } else {
        name
    }
}

/// The `index`-th variant of a file name: `name.ext`, `name (1).ext`, ...
pub fn numbered_variant(file_name: &str, index: u32) -> String {
    if index == 0 {
        return file_name.to_string();
    }
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &file_name[..dot], index, &file_name[dot..]),
        _ => format!("{} ({})", file_name, index),
    }
}

/// Creates a new file named after `file_name` without replacing any existing file
///
/// # Returns
///
/// * `Ok((PathBuf, File))` - The created path and its open handle
/// * `Err(io::Error)` - Creation failed for a reason other than a name clash
pub async fn create_unique(directory: &Path, file_name: &str) -> std::io::Result<(PathBuf, File)> {
    for index in 0..MAX_NAME_VARIANTS {
        let path = directory.join(numbered_variant(file_name, index));
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free name for {} in {}", file_name, directory.display()),
    ))
}

/// Downloads cover art into a directory
#[derive(Debug, Clone)]
pub struct CoverDownloader {
    client: Client,
    directory: PathBuf,
}

impl CoverDownloader {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, HarvestError> {
        Ok(Self::with_client(build_http_client()?, directory))
    }

    pub fn with_client(client: Client, directory: impl Into<PathBuf>) -> Self {
        Self {
            client,
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Downloads one cover
    ///
    /// # Arguments
    ///
    /// * `collection_id` - Id of the collection the cover belongs to
    /// * `url` - Canonical cover URL
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Where the cover was written
    /// * `Err(HarvestError)` - Request, status or file error
    pub async fn download(&self, collection_id: &str, url: &str) -> Result<PathBuf, HarvestError> {
        let http_error = |source| HarvestError::Http {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_error)?;
        let bytes = response.bytes().await.map_err(http_error)?;

        tokio::fs::create_dir_all(&self.directory).await?;
        let file_name = format!("{}_{}", collection_id, original_file_name(url));
        let (path, mut file) = create_unique(&self.directory, &file_name).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        tracing::info!("Saved cover art to {}", path.display());
        Ok(path)
    }

    /// Downloads a cover on `tasks`; failures are logged only
    pub fn spawn_into(&self, tasks: &mut JoinSet<()>, collection_id: String, url: String) {
        let downloader = self.clone();
        tasks.spawn(async move {
            if let Err(e) = downloader.download(&collection_id, &url).await {
                tracing::warn!("Cover download for {} failed: {}", collection_id, e);
            }
        });
    }
}
