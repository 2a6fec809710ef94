//! Text extraction boundary for supported document formats.
//!
//! Richer formats (PDF, office documents) are expected to arrive already
//! converted to text; this module only reads plain text and markdown.

use std::path::Path;

use crate::errors::DocragError;
use crate::errors::Result;
use crate::models::Document;

/// File extensions the ingestion pipeline picks up.
const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Whether a path has a supported extension.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

/// Extract plain text from a supported file.
///
/// # Errors
/// `DocragError::Extraction` for unsupported extensions or unreadable files.
/// The caller skips the document; one bad file never aborts a batch.
pub fn extract_text(path: &Path) -> Result<String> {
    if !is_supported(path) {
        return Err(DocragError::extraction(format!(
            "unsupported format: {}",
            path.display()
        )));
    }

    let text = std::fs::read_to_string(path).map_err(|e| {
        DocragError::extraction(format!("cannot read {}: {e}", path.display()))
    })?;

    if text.trim().is_empty() {
        return Err(DocragError::extraction(format!(
            "no text content in {}",
            path.display()
        )));
    }

    Ok(text)
}

impl Document {
    /// Build a document from a file on disk. The document id is the file
    /// stem, the source is the file name.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = extract_text(path)?;

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                DocragError::extraction(format!("unusable file name: {}", path.display()))
            })?
            .to_string();

        let source = path
            .file_name()
            .and_then(|s| s.to_str())
            .map_or_else(|| id.clone(), ToString::to_string);

        Ok(Self::new(id, source, text))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("notes.txt")));
        assert!(is_supported(Path::new("guide.md")));
        assert!(is_supported(Path::new("guide.MD")));
        assert!(is_supported(Path::new("handbook.markdown")));
        assert!(!is_supported(Path::new("scan.pdf")));
        assert!(!is_supported(Path::new("no_extension")));
    }

    #[test]
    fn test_extract_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.md");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# Leave policy\n\nEmployees get 20 days.").unwrap();

        let text = extract_text(&path).unwrap();
        assert!(text.contains("20 days"));
    }

    #[test]
    fn test_extract_rejects_unsupported() {
        let err = extract_text(Path::new("report.pdf")).unwrap_err();
        assert!(matches!(err, DocragError::Extraction(_)));
    }

    #[test]
    fn test_extract_rejects_missing_file() {
        let err = extract_text(Path::new("/nonexistent/file.txt")).unwrap_err();
        assert!(matches!(err, DocragError::Extraction(_)));
    }

    #[test]
    fn test_extract_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::File::create(&path).unwrap();

        let err = extract_text(&path).unwrap_err();
        assert!(matches!(err, DocragError::Extraction(_)));
    }

    #[test]
    fn test_document_from_file_uses_stem_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onboarding.txt");
        std::fs::write(&path, "Welcome aboard.").unwrap();

        let doc = Document::from_file(&path).unwrap();
        assert_eq!(doc.id, "onboarding");
        assert_eq!(doc.source, "onboarding.txt");
        assert_eq!(doc.text, "Welcome aboard.");
    }
}
