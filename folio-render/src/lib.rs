use std::path::Path;

use anyhow::{bail, Result};
use folio_core::DocumentProvider;

pub mod draw;
pub mod export;
#[cfg(feature = "pdf")]
mod pdf;
pub mod present;
mod raster;

#[cfg(feature = "pdf")]
pub use pdf::{PdfiumProvider, PDFIUM_LIBRARY_ENV};
pub use raster::ImageDocumentProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Raster,
}

/// Classifies a document by file extension.
pub fn source_kind(path: &Path) -> Option<SourceKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => Some(SourceKind::Pdf),
        "png" | "jpg" | "jpeg" => Some(SourceKind::Raster),
        _ => None,
    }
}

/// Picks the provider able to open `path`.
pub fn provider_for(path: &Path) -> Result<Box<dyn DocumentProvider>> {
    match source_kind(path) {
        Some(SourceKind::Raster) => Ok(Box::new(ImageDocumentProvider::new())),
        #[cfg(feature = "pdf")]
        Some(SourceKind::Pdf) => Ok(Box::new(PdfiumProvider::new()?)),
        #[cfg(not(feature = "pdf"))]
        Some(SourceKind::Pdf) => bail!("PDF support was not compiled in (enable the `pdf` feature)"),
        None => bail!("unsupported document type: {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_extensions_case_insensitively() {
        assert_eq!(source_kind(Path::new("paper.PDF")), Some(SourceKind::Pdf));
        assert_eq!(source_kind(Path::new("figure.jpeg")), Some(SourceKind::Raster));
        assert_eq!(source_kind(Path::new("notes.txt")), None);
        assert_eq!(source_kind(Path::new("README")), None);
    }

    #[test]
    fn unknown_extension_has_no_provider() {
        assert!(provider_for(Path::new("notes.txt")).is_err());
        assert!(provider_for(Path::new("figure.png")).is_ok());
    }
}
