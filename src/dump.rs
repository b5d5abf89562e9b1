//! Document dump: metadata, per-page text and layout, and the full text.
//!
//! Written on demand next to an extraction run; nothing in the run reads it
//! back.

use crate::config::ExtractionConfig;
use crate::error::CatalogError;
use crate::extract::write_json_atomic;
use crate::output::DocumentMetadata;
use crate::pipeline::input;
use crate::pipeline::render::PdfiumSource;
use crate::source::{PageRecord, PdfSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Separator between page texts in [`DocumentDump::full_text`].
pub const PAGE_TEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDump {
    pub pdf_info: DocumentMetadata,
    pub pages_data: Vec<PageRecord>,
    /// Every page's text joined by a blank line.
    pub full_text: String,
}

/// Load `source` and read every page into a dump.
///
/// A page that cannot be read is kept as an empty page so page numbers
/// stay aligned with the document.
pub fn dump_document(source: &mut dyn PdfSource) -> Result<DocumentDump, CatalogError> {
    source.load()?;
    let pages_data: Vec<PageRecord> = (1..=source.page_count())
        .map(|n| {
            source.page(n).unwrap_or_else(|e| {
                warn!("{}", e);
                PageRecord::from_text(n, "")
            })
        })
        .collect();

    let full_text = pages_data
        .iter()
        .map(|p| p.raw_text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_TEXT_SEPARATOR);

    Ok(DocumentDump {
        pdf_info: source.metadata(),
        pages_data,
        full_text,
    })
}

/// Dump a PDF file or URL, with the download timeout and password from
/// `config`.
pub async fn dump_pdf(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentDump, CatalogError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let mut source = PdfiumSource::open(resolved.path(), config.password.clone())?;
    dump_document(&mut source)
}

/// Write a dump as pretty JSON, atomically.
pub async fn write_dump(dump: &DocumentDump, path: &Path) -> Result<(), CatalogError> {
    write_json_atomic(path, &serde_json::to_string_pretty(dump)?).await?;
    info!("Document dump written to {}", path.display());
    Ok(())
}

/// `<dir>/<stem>_extracted.json` for the PDF at `pdf_path`.
pub fn default_dump_path(dir: &Path, pdf_path: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    dir.join(format!("{stem}_extracted.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderQuality;
    use crate::error::PageError;

    struct ThreePages;

    impl PdfSource for ThreePages {
        fn load(&mut self) -> Result<(), CatalogError> {
            Ok(())
        }

        fn metadata(&self) -> DocumentMetadata {
            DocumentMetadata {
                filename: "brakes.pdf".into(),
                page_count: 3,
                title: Some("Brake Catalog".into()),
                ..Default::default()
            }
        }

        fn page_count(&self) -> usize {
            3
        }

        fn page(&self, page_number: usize) -> Result<PageRecord, PageError> {
            match page_number {
                2 => Err(PageError::ReadFailed {
                    page: 2,
                    detail: "broken content stream".into(),
                }),
                n => Ok(PageRecord::from_text(n, format!("page {n} text"))),
            }
        }

        fn render_page_image(
            &self,
            page_number: usize,
            _quality: RenderQuality,
            _dir: &Path,
        ) -> Result<PathBuf, PageError> {
            Err(PageError::RenderFailed {
                page: page_number,
                detail: "not rendered in tests".into(),
            })
        }
    }

    #[test]
    fn dump_joins_pages_and_keeps_failed_ones() {
        let dump = dump_document(&mut ThreePages).unwrap();
        assert_eq!(dump.pages_data.len(), 3);
        assert_eq!(dump.pages_data[1].raw_text, "");
        assert_eq!(dump.full_text, "page 1 text\n\n\n\npage 3 text");
        assert_eq!(dump.pdf_info.title.as_deref(), Some("Brake Catalog"));
    }

    #[test]
    fn default_path_uses_stem() {
        let p = default_dump_path(Path::new("extracted_data"), Path::new("/tmp/brakes-2021.pdf"));
        assert_eq!(p, PathBuf::from("extracted_data/brakes-2021_extracted.json"));
    }

    #[tokio::test]
    async fn write_dump_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brakes_extracted.json");
        let dump = dump_document(&mut ThreePages).unwrap();
        write_dump(&dump, &path).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["pdf_info"]["filename"], "brakes.pdf");
        assert_eq!(json["pages_data"].as_array().map(Vec::len), Some(3));
        assert!(json["full_text"].as_str().unwrap().starts_with("page 1"));
    }
}
