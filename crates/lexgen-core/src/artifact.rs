//! PDF answers: one-shot fetch, save-as download, and temporary previews.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::api::QueryBackend;
use crate::error::QueryError;
use crate::query::QueryResult;

/// Name every downloaded answer is saved under.
pub const DOWNLOAD_FILENAME: &str = "legal_response.pdf";

fn pdf_filename(result: &QueryResult) -> Result<&str, QueryError> {
    result
        .pdf_filename()
        .ok_or_else(|| QueryError::artifact("No PDF available for this response"))
}

/// Fetch the PDF attached to `result`. No retry.
pub async fn fetch_pdf(
    backend: &dyn QueryBackend,
    result: &QueryResult,
) -> Result<(String, Vec<u8>), QueryError> {
    let filename = pdf_filename(result)?;
    let bytes = backend.download_pdf(filename).await?;
    debug!(filename, size = bytes.len(), "fetched pdf");
    Ok((filename.to_string(), bytes))
}

/// Fetch the PDF and write it to `dir/legal_response.pdf`, replacing any
/// earlier download. Returns the written path.
pub async fn download_pdf(
    backend: &dyn QueryBackend,
    result: &QueryResult,
    dir: &Path,
) -> Result<PathBuf, QueryError> {
    let (_, bytes) = fetch_pdf(backend, result).await?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| QueryError::artifact(format!("Could not create {}: {}", dir.display(), e)))?;
    let path = dir.join(DOWNLOAD_FILENAME);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| QueryError::artifact(format!("Could not write {}: {}", path.display(), e)))?;

    info!(path = %path.display(), size = bytes.len(), "pdf downloaded");
    Ok(path)
}

/// Fetch the PDF into a temporary file for viewing.
pub async fn preview_pdf(
    backend: &dyn QueryBackend,
    result: &QueryResult,
) -> Result<PdfPreview, QueryError> {
    let (filename, bytes) = fetch_pdf(backend, result).await?;
    PdfPreview::create(&filename, &bytes)
}

/// A PDF held in a temporary file. The file lives exactly as long as the
/// preview: dropping or releasing it deletes the file.
#[derive(Debug)]
pub struct PdfPreview {
    file: NamedTempFile,
    source: String,
    size: usize,
}

impl PdfPreview {
    pub fn create(source: &str, bytes: &[u8]) -> Result<Self, QueryError> {
        let mut file = tempfile::Builder::new()
            .prefix("lexgen-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| QueryError::artifact(format!("Could not create preview file: {}", e)))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| QueryError::artifact(format!("Could not write preview file: {}", e)))?;

        Ok(Self {
            file,
            source: source.to_string(),
            size: bytes.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Filename the server knows this PDF by.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Delete the temporary file now, reporting failures instead of
    /// swallowing them in `Drop`.
    pub fn release(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "pdf preview released"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove pdf preview"),
        }
    }
}

/// Holds at most one open preview.
#[derive(Debug, Default)]
pub struct PreviewSlot {
    current: Option<PdfPreview>,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `preview`, releasing whatever was open before.
    pub fn open(&mut self, preview: PdfPreview) -> &PdfPreview {
        if let Some(previous) = self.current.take() {
            previous.release();
        }
        self.current.insert(preview)
    }

    /// Release the open preview. Returns false if nothing was open.
    pub fn close(&mut self) -> bool {
        match self.current.take() {
            Some(preview) => {
                preview.release();
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<&PdfPreview> {
        self.current.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Category, Query, QueryPayload};
    use async_trait::async_trait;

    struct PdfBackend {
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl QueryBackend for PdfBackend {
        async fn query(&self, _query: &Query) -> Result<QueryPayload, QueryError> {
            Err(QueryError::transport("not used"))
        }

        async fn download_pdf(&self, filename: &str) -> Result<Vec<u8>, QueryError> {
            if filename == "response_9.pdf" {
                Ok(self.bytes.clone())
            } else {
                Err(QueryError::artifact(format!("PDF file not found: {}", filename)))
            }
        }
    }

    fn result_with_pdf(pdf_path: Option<&str>) -> QueryResult {
        QueryResult {
            legal_analysis: "Analysis".to_string(),
            additional_context: String::new(),
            punishments_and_fines: String::new(),
            sources: Vec::new(),
            pdf_path: pdf_path.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_download_writes_fixed_name() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PdfBackend {
            bytes: b"%PDF-1.4 body".to_vec(),
        };
        let result = result_with_pdf(Some("pdfs/response_9.pdf"));

        let path = download_pdf(&backend, &result, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join(DOWNLOAD_FILENAME));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 body".to_vec());
    }

    #[tokio::test]
    async fn test_no_pdf_is_artifact_error() {
        let backend = PdfBackend { bytes: Vec::new() };
        let err = fetch_pdf(&backend, &result_with_pdf(None)).await.unwrap_err();
        assert!(matches!(err, QueryError::Artifact(_)));
        assert!(!err.is_retryable());

        let err = fetch_pdf(&backend, &result_with_pdf(Some("other.pdf")))
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::Artifact("PDF file not found: other.pdf".to_string()));
    }

    #[tokio::test]
    async fn test_preview_holds_bytes() {
        let backend = PdfBackend {
            bytes: b"%PDF-1.4 preview".to_vec(),
        };
        let preview = preview_pdf(&backend, &result_with_pdf(Some("response_9.pdf")))
            .await
            .unwrap();

        assert_eq!(preview.source(), "response_9.pdf");
        assert_eq!(preview.size(), 16);
        assert_eq!(std::fs::read(preview.path()).unwrap(), b"%PDF-1.4 preview".to_vec());
        assert_eq!(
            preview.path().extension().and_then(|ext| ext.to_str()),
            Some("pdf")
        );
    }

    #[test]
    fn test_close_releases_file() {
        let mut slot = PreviewSlot::new();
        let mut released = Vec::new();

        for round in 0..5 {
            let preview = PdfPreview::create("response.pdf", format!("pdf {}", round).as_bytes()).unwrap();
            let path = slot.open(preview).path().to_path_buf();
            assert!(path.exists());
            assert!(slot.close());
            assert!(!path.exists());
            released.push(path);
        }

        assert!(!slot.is_open());
        assert!(!slot.close());
        assert!(released.iter().all(|path| !path.exists()));
    }

    #[test]
    fn test_replacing_preview_releases_previous() {
        let mut slot = PreviewSlot::new();
        let first = slot
            .open(PdfPreview::create("a.pdf", b"first").unwrap())
            .path()
            .to_path_buf();
        let second = slot
            .open(PdfPreview::create("b.pdf", b"second").unwrap())
            .path()
            .to_path_buf();

        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(slot.current().map(|p| p.source()), Some("b.pdf"));

        drop(slot);
        assert!(!second.exists());
    }
}
