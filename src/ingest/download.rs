//! Bulk bundle download from the GDC data endpoint.
//!
//! Uses `ureq` for a single synchronous POST. The response body is streamed to
//! a temp file next to its destination and renamed only once fully written,
//! so an interrupted transfer never looks like a finished bundle.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::ingest::error::{IngestError, IngestResult};
use crate::paths::temp_sibling;

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"filename\*?=\s*"?([^";]+)"?"#).expect("static regex")
});

/// Client for the bulk `POST {"ids": [...]}` download endpoint.
pub struct BulkDownloader {
    endpoint: String,
    agent: ureq::Agent,
}

impl BulkDownloader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.into(),
            agent,
        }
    }

    /// Download the bundle for `ids` into `dest_dir`, returning the saved path.
    ///
    /// The file name comes from the `Content-Disposition` header.
    pub fn download(&self, ids: &[String], dest_dir: &Path) -> IngestResult<PathBuf> {
        tracing::info!(files = ids.len(), endpoint = %self.endpoint, "requesting bundle");

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_json(serde_json::json!({ "ids": ids }))
            .map_err(|e| self.request_error(e))?;

        let disposition = response.header("Content-Disposition").map(str::to_string);
        let file_name = disposition
            .as_deref()
            .and_then(filename_from_disposition)
            .ok_or_else(|| IngestError::MissingFilename {
                header: disposition.clone(),
            })?;

        std::fs::create_dir_all(dest_dir).map_err(|e| IngestError::io(dest_dir, e))?;
        let target = dest_dir.join(&file_name);
        let tmp = temp_sibling(&target);

        let mut file = std::fs::File::create(&tmp).map_err(|e| IngestError::io(&tmp, e))?;
        let mut reader = response.into_reader();
        let written = match std::io::copy(&mut reader, &mut file) {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(IngestError::Download {
                    url: self.endpoint.clone(),
                    message: format!("read body: {e}"),
                });
            }
        };
        file.sync_all().map_err(|e| IngestError::io(&tmp, e))?;
        drop(file);
        std::fs::rename(&tmp, &target).map_err(|e| IngestError::io(&target, e))?;

        tracing::info!(path = %target.display(), bytes = written, "bundle downloaded");
        Ok(target)
    }

    fn request_error(&self, err: ureq::Error) -> IngestError {
        let message = match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                let preview: String = body.chars().take(300).collect();
                format!("HTTP {code}: {preview}")
            }
            ureq::Error::Transport(transport) => format!("transport: {transport}"),
        };
        IngestError::Download {
            url: self.endpoint.clone(),
            message,
        }
    }
}

/// Extract a bare file name from a `Content-Disposition` value.
///
/// Directory components are dropped so the server cannot choose where the
/// bundle lands.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let raw = FILENAME_RE.captures(header)?.get(1)?.as_str().trim();
    let raw = raw.strip_prefix("UTF-8''").unwrap_or(raw);
    let name = Path::new(raw).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_filename() {
        assert_eq!(
            filename_from_disposition("attachment; filename=gdc_download_20240101.tar.gz"),
            Some("gdc_download_20240101.tar.gz".into())
        );
    }

    #[test]
    fn quoted_filename_with_trailing_params() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="bundle.tar.gz"; size=10"#),
            Some("bundle.tar.gz".into())
        );
    }

    #[test]
    fn directory_components_are_stripped() {
        assert_eq!(
            filename_from_disposition("attachment; filename=../../etc/bundle.tgz"),
            Some("bundle.tgz".into())
        );
    }

    #[test]
    fn missing_filename_is_none() {
        assert_eq!(filename_from_disposition("attachment"), None);
    }

    #[test]
    fn unreachable_endpoint_is_a_download_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let downloader = BulkDownloader::new("http://127.0.0.1:9/data", Duration::from_secs(2));
        let err = downloader
            .download(&["a1".to_string()], dir.path())
            .unwrap_err();
        assert!(matches!(err, IngestError::Download { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
