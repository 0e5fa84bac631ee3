//! Snapshot retrieval.
//!
//! A [`Fetcher`] turns a dataset and a nominal date into a file on local
//! disk. Files are named `{name}-{YYYY-MM-DD}.csv`; a file already present
//! for the date is reused, so a retried run reads the same bytes.

use std::{
  future::Future,
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::NaiveDate;
use reqwest::Client;
use tokio::io::AsyncWriteExt as _;

use crate::error::TransportError;

/// A dataset published on the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
  /// File name prefix, e.g. `chicago-crime`.
  pub name:       String,
  /// The portal's dataset identifier, e.g. `ijzp-q8t2`.
  pub dataset_id: String,
}

impl SourceSpec {
  pub fn filename(&self, date: NaiveDate) -> String {
    format!("{}-{}.csv", self.name, date.format("%Y-%m-%d"))
  }
}

/// A snapshot available on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
  pub filename: String,
  pub path:     PathBuf,
}

pub trait Fetcher: Send + Sync {
  fn fetch(
    &self,
    source: &SourceSpec,
    date: NaiveDate,
  ) -> impl Future<Output = Result<FetchedFile, TransportError>> + Send;
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TransportError + '_ {
  move |source| TransportError::Io { path: path.to_owned(), source }
}

// ─── HTTP ────────────────────────────────────────────────────────────────────

/// Downloads exports from the open-data portal into a storage directory.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpFetcher {
  client:      Client,
  portal_url:  String,
  storage_dir: PathBuf,
}

impl HttpFetcher {
  pub fn new(
    portal_url: impl Into<String>,
    storage_dir: impl Into<PathBuf>,
    timeout: Duration,
  ) -> Result<Self, TransportError> {
    let portal_url = portal_url.into();
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|source| TransportError::Http { url: portal_url.clone(), source })?;
    Ok(Self { client, portal_url, storage_dir: storage_dir.into() })
  }

  fn url(&self, dataset_id: &str) -> String {
    format!(
      "{}/api/views/{dataset_id}/rows.csv",
      self.portal_url.trim_end_matches('/')
    )
  }

  async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
    let http = |source| TransportError::Http { url: url.to_owned(), source };

    let mut resp = self
      .client
      .get(url)
      .query(&[("accessType", "DOWNLOAD")])
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(http)?;

    // Written under a temporary name so an interrupted download is never
    // mistaken for a complete snapshot.
    let part = dest.with_extension("csv.part");
    let mut file = tokio::fs::File::create(&part).await.map_err(io_error(&part))?;
    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await.map_err(http)? {
      file.write_all(&chunk).await.map_err(io_error(&part))?;
      written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_error(&part))?;
    drop(file);

    tokio::fs::rename(&part, dest).await.map_err(io_error(dest))?;
    Ok(written)
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(
    &self,
    source: &SourceSpec,
    date: NaiveDate,
  ) -> Result<FetchedFile, TransportError> {
    let filename = source.filename(date);
    let path = self.storage_dir.join(&filename);

    if tokio::fs::try_exists(&path).await.map_err(io_error(&path))? {
      tracing::info!(%filename, "using existing file");
      return Ok(FetchedFile { filename, path });
    }

    tokio::fs::create_dir_all(&self.storage_dir)
      .await
      .map_err(io_error(&self.storage_dir))?;

    let url = self.url(&source.dataset_id);
    tracing::info!(%filename, %url, "downloading");
    let started = std::time::Instant::now();
    let bytes = self.download(&url, &path).await?;
    tracing::info!(
      %filename,
      bytes,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "download complete"
    );

    Ok(FetchedFile { filename, path })
  }
}

// ─── Local directory ─────────────────────────────────────────────────────────

/// Serves snapshots already present in a directory; never downloads.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
  dir: PathBuf,
}

impl DirectoryFetcher {
  pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
}

impl Fetcher for DirectoryFetcher {
  async fn fetch(
    &self,
    source: &SourceSpec,
    date: NaiveDate,
  ) -> Result<FetchedFile, TransportError> {
    let filename = source.filename(date);
    let path = self.dir.join(&filename);
    if !tokio::fs::try_exists(&path).await.map_err(io_error(&path))? {
      return Err(TransportError::Missing(path));
    }
    Ok(FetchedFile { filename, path })
  }
}
