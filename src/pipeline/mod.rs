//! Pipeline stages that talk to the outside world.
//!
//! Each submodule wraps exactly one external concern so the orchestrator in
//! [`crate::extract`] can stay a pure loop over traits.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ response
//! (URL/path) (pdfium)  (base64)  (LLM)   (JSON items)
//! ```
//!
//! 1. [`input`]    — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]   — [`crate::source::PdfSource`] over pdfium: text, segments,
//!    metadata and `page_{n}.png` images
//! 3. [`encode`]   — PNG-encode and base64-wrap page images for vision calls
//! 4. [`llm`]      — the structured-extraction and vision calls; the only
//!    stage that talks to an LLM
//! 5. [`response`] — pull a JSON array of items out of the raw reply

pub mod encode;
pub mod input;
pub mod llm;
pub mod render;
pub mod response;
