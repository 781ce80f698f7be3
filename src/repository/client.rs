// src/repository/client.rs

//! HTTP client for catalog and package downloads
//!
//! A thin wrapper around a blocking reqwest client. Catalog fetches ask for
//! JSON; package downloads stream the response body to disk in chunks,
//! checking the ambient cancellation token between reads.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::repository::metadata::RepositoryCatalog;
use indicatif::ProgressBar;
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("kpm/", env!("CARGO_PKG_VERSION"));

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Blocking HTTP client wrapper
pub struct RepositoryClient {
    client: Client,
}

impl RepositoryClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch and decode a catalog document from an http(s) URL
    pub fn fetch_catalog(&self, url: &str) -> Result<RepositoryCatalog> {
        info!("Fetching repository catalog from {}", url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let catalog: RepositoryCatalog = response
            .json()
            .map_err(|e| Error::ParseError(format!("Failed to parse catalog JSON from {url}: {e}")))?;

        info!(
            "Fetched catalog {:?} with {} packages",
            catalog.id,
            catalog.packages.len()
        );
        Ok(catalog)
    }

    /// Stream a URL to `dest_path`, honoring the cancellation token
    ///
    /// The body is written through a temporary sibling file and renamed into
    /// place, so a cancelled or failed download never leaves a partial file
    /// at the destination.
    pub fn download_file(
        &self,
        url: &str,
        dest_path: &Path,
        progress: Option<&ProgressBar>,
        cancel: &CancelToken,
    ) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        if let Some(bar) = progress {
            if let Some(total) = response.content_length() {
                bar.set_length(total);
            }
        }

        let temp_path = dest_path.with_extension("part");
        let mut file = File::create(&temp_path)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", temp_path.display())))?;

        let result = stream_response(&mut response, &mut file, progress, cancel);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, dest_path).map_err(|e| {
            Error::IoError(format!(
                "Failed to move {} to {}: {e}",
                temp_path.display(),
                dest_path.display()
            ))
        })?;

        debug!("Downloaded {} successfully", dest_path.display());
        Ok(())
    }
}

/// Copy the response body in chunks, checking cancellation between reads
fn stream_response(
    response: &mut reqwest::blocking::Response,
    file: &mut File,
    progress: Option<&ProgressBar>,
    cancel: &CancelToken,
) -> Result<()> {
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    let mut downloaded: u64 = 0;

    loop {
        cancel.check()?;

        let read = response
            .read(&mut buffer)
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {e}")))?;
        if read == 0 {
            break;
        }

        file.write_all(&buffer[..read])
            .map_err(|e| Error::IoError(format!("Failed to write downloaded data: {e}")))?;

        downloaded += read as u64;
        if let Some(bar) = progress {
            bar.set_position(downloaded);
        }
    }

    Ok(())
}
