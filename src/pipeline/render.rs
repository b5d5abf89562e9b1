//! [`PdfSource`] over pdfium: page text, text segments, metadata and page
//! images.
//!
//! `PdfDocument` borrows the `Pdfium` bindings, so the source keeps only the
//! bindings and the path and reopens the document per call. Opening is
//! cheap next to an LLM round-trip and keeps the source free of
//! self-referential lifetimes.
//!
//! Images are rendered at a fixed scale of the page's point size
//! ([`RenderQuality::scale`]) rather than capped to a pixel budget: catalog
//! pages are letter or A4, and small part numbers need the extra resolution.

use crate::config::RenderQuality;
use crate::error::{CatalogError, PageError};
use crate::output::DocumentMetadata;
use crate::source::{page_image_name, PageRecord, PdfSource, TextBlock};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind pdfium from `PDFIUM_LIB_PATH` when set, else from the system.
pub fn bind_pdfium() -> Result<Pdfium, CatalogError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path)
            .map_err(|e| CatalogError::PdfiumBindingFailed(format!("{path}: {e:?}")))?,
        _ => Pdfium::bind_to_system_library()
            .map_err(|e| CatalogError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

/// A PDF on disk, read through pdfium.
pub struct PdfiumSource {
    pdfium: Pdfium,
    path: PathBuf,
    password: Option<String>,
    metadata: Option<DocumentMetadata>,
}

impl PdfiumSource {
    pub fn new(pdfium: Pdfium, path: impl Into<PathBuf>, password: Option<String>) -> Self {
        Self {
            pdfium,
            path: path.into(),
            password,
            metadata: None,
        }
    }

    /// Bind pdfium and wrap `path`.
    pub fn open(path: impl Into<PathBuf>, password: Option<String>) -> Result<Self, CatalogError> {
        Ok(Self::new(bind_pdfium()?, path, password))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn document(&self) -> Result<PdfDocument<'_>, CatalogError> {
        let password = self.password.as_deref();
        self.pdfium
            .load_pdf_from_file(&self.path, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        CatalogError::WrongPassword {
                            path: self.path.clone(),
                        }
                    } else {
                        CatalogError::PasswordRequired {
                            path: self.path.clone(),
                        }
                    }
                } else {
                    CatalogError::LoadFailed {
                        path: self.path.clone(),
                        detail: err_str,
                    }
                }
            })
    }

    fn read_metadata(&self) -> Result<DocumentMetadata, CatalogError> {
        let document = self.document()?;
        let metadata = document.metadata();

        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().trim().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        let filename = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(DocumentMetadata {
            filename,
            page_count: document.pages().len() as usize,
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
        })
    }

    fn page_document(&self, page_number: usize) -> Result<PdfDocument<'_>, String> {
        if page_number == 0 || page_number > self.page_count() {
            return Err(format!("out of range (1..={})", self.page_count()));
        }
        self.document().map_err(|e| e.to_string())
    }
}

impl PdfSource for PdfiumSource {
    fn load(&mut self) -> Result<(), CatalogError> {
        let meta = self.read_metadata()?;
        info!("PDF loaded: {} ({} pages)", meta.filename, meta.page_count);
        self.metadata = Some(meta);
        Ok(())
    }

    fn metadata(&self) -> DocumentMetadata {
        self.metadata.clone().unwrap_or_default()
    }

    fn page_count(&self) -> usize {
        self.metadata.as_ref().map_or(0, |m| m.page_count)
    }

    fn page(&self, page_number: usize) -> Result<PageRecord, PageError> {
        let read_failed = |detail: String| PageError::ReadFailed {
            page: page_number,
            detail,
        };

        let document = self.page_document(page_number).map_err(read_failed)?;
        let page = document
            .pages()
            .get((page_number - 1) as u16)
            .map_err(|e| read_failed(format!("{e:?}")))?;
        let text = page.text().map_err(|e| read_failed(format!("{e:?}")))?;

        let text_blocks = text
            .segments()
            .iter()
            .filter_map(|segment| {
                let content = segment.text();
                if content.trim().is_empty() {
                    return None;
                }
                let bounds = segment.bounds();
                Some(TextBlock {
                    text: content,
                    left: bounds.left().value,
                    top: bounds.top().value,
                    right: bounds.right().value,
                    bottom: bounds.bottom().value,
                })
            })
            .collect();

        let record = PageRecord {
            page_number,
            raw_text: text.all(),
            text_blocks,
            page_size: (page.width().value, page.height().value),
        };
        debug!(
            "Read page {}: {} chars, {} blocks",
            page_number,
            record.raw_text.len(),
            record.text_blocks.len()
        );
        Ok(record)
    }

    fn render_page_image(
        &self,
        page_number: usize,
        quality: RenderQuality,
        dir: &Path,
    ) -> Result<PathBuf, PageError> {
        let render_failed = |detail: String| PageError::RenderFailed {
            page: page_number,
            detail,
        };

        let document = self.page_document(page_number).map_err(render_failed)?;
        let page = document
            .pages()
            .get((page_number - 1) as u16)
            .map_err(|e| render_failed(format!("{e:?}")))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(quality.scale());
        let image = page
            .render_with_config(&render_config)
            .map_err(|e| render_failed(format!("{e:?}")))?
            .as_image();

        let path = dir.join(page_image_name(page_number));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| render_failed(e.to_string()))?;

        debug!(
            "Rendered page {} → {}x{} px at {}",
            page_number,
            image.width(),
            image.height(),
            path.display()
        );
        Ok(path)
    }
}
