//! File parsing
//!
//! Single entry point dispatching by extension. Text-like formats are read
//! directly; binary document formats (PDF, DOCX) and image OCR need
//! external extraction engines and report `UnsupportedFormat` so the caller
//! can tell the user instead of handing the model raw bytes.

use crate::error::{Error, Result};
use std::path::Path;
use tracing::info;

/// Extensions readable as plain text
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "json", "log", "rs", "py", "js", "ts", "html", "css", "toml", "yaml",
    "yml", "sh", "xml",
];

/// Extensions recognized but requiring an extraction engine
const BINARY_DOC_EXTENSIONS: &[&str] = &["pdf", "docx", "doc"];

/// Image extensions (OCR territory)
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "gif", "webp"];

/// Turns a file on disk into plain text for prompt injection
pub trait FileParser: Send + Sync {
    /// Parse a file into plain text
    fn parse(&self, path: &Path) -> Result<String>;
}

/// Parser for text-like files. Recognizes binary document and image
/// formats by extension and refuses them with a clear message.
#[derive(Debug, Default)]
pub struct PlainTextParser;

impl PlainTextParser {
    /// Extensions this parser reads directly
    pub fn supported_extensions() -> &'static [&'static str] {
        TEXT_EXTENSIONS
    }
}

impl FileParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(Error::NotFound(format!("File not found: {}", path.display())));
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            info!("Parsing {} as plain text", path.display());
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::ExtractionFailed(format!("{}: {}", path.display(), e)))?;
            return Ok(content);
        }

        if BINARY_DOC_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::UnsupportedFormat(format!(
                ".{} requires a document extraction engine which is not installed",
                ext
            )));
        }

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::UnsupportedFormat(format!(
                ".{} requires an OCR engine which is not installed",
                ext
            )));
        }

        Err(Error::UnsupportedFormat(format!(
            "Unsupported file format: '.{}'. Supported: {}",
            ext,
            TEXT_EXTENSIONS.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_text_file() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "hello from disk").unwrap();

        let parsed = PlainTextParser.parse(file.path()).unwrap();
        assert_eq!(parsed, "hello from disk");
    }

    #[test]
    fn test_parse_missing_file_is_not_found() {
        let err = PlainTextParser
            .parse(Path::new("/tmp/no-such-file-193847.txt"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_parse_pdf_is_unsupported() {
        let file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        let err = PlainTextParser.parse(file.path()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_parse_image_is_unsupported() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let err = PlainTextParser.parse(file.path()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_parse_unknown_extension_lists_supported() {
        let file = tempfile::Builder::new().suffix(".xyz").tempfile().unwrap();
        let err = PlainTextParser.parse(file.path()).unwrap_err();
        assert!(err.to_string().contains("txt"));
    }
}
