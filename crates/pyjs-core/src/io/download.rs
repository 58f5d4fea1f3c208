//! Blocking HTTP download of source archives.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use reqwest::blocking::Client;
use thiserror::Error;

/// Errors raised while fetching an archive.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("GET {url} returned {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Writing the archive to disk failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the shared HTTP client.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn client() -> Result<Client, DownloadError> {
    Ok(Client::builder().user_agent(crate::USER_AGENT).build()?)
}

/// Fetch `url` into `dest`, following redirects.
///
/// The body is streamed into `<dest>.part` and renamed on success, so an
/// interrupted transfer never leaves a file at `dest`.
///
/// # Errors
///
/// Returns [`DownloadError::Status`] for a non-2xx response, and transport
/// or IO errors otherwise.
pub fn fetch_to(client: &Client, url: &str, dest: &Path) -> Result<u64, DownloadError> {
    let mut resp = client.get(url).send()?;
    if !resp.status().is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let part = dest.with_extension(match dest.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    });

    let written = (|| -> Result<u64, DownloadError> {
        let mut file = File::create(&part)?;
        let n = resp.copy_to(&mut file)?;
        file.flush()?;
        Ok(n)
    })();

    match written {
        Ok(n) => {
            std::fs::rename(&part, dest)?;
            tracing::debug!("downloaded {n} bytes to {}", dest.display());
            Ok(n)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&part);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fetch_writes_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/bzip2-1.0.8.tar.gz")
            .with_status(200)
            .with_body("archive-bytes")
            .create();

        let dir = tempdir().unwrap();
        let dest = dir.path().join("bzip2-1.0.8.tar.gz");
        let url = format!("{}/bzip2-1.0.8.tar.gz", server.url());
        let n = fetch_to(&client().unwrap(), &url, &dest).unwrap();

        mock.assert();
        assert_eq!(n, 13);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "archive-bytes");
        assert!(!dir.path().join("bzip2-1.0.8.tar.gz.part").exists());
    }

    #[test]
    fn test_fetch_not_found_leaves_nothing() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/missing.tgz").with_status(404).create();

        let dir = tempdir().unwrap();
        let dest = dir.path().join("missing.tgz");
        let url = format!("{}/missing.tgz", server.url());
        let err = fetch_to(&client().unwrap(), &url, &dest).unwrap_err();

        assert!(matches!(err, DownloadError::Status { status: 404, .. }));
        assert!(!dest.exists());
    }
}
