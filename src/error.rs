//! Typed errors for the extraction core.
//!
//! Application code mostly works with [`anyhow::Result`], but the core
//! operations return these so that callers (and tests) can match on the
//! failure class.

use thiserror::Error;

/// Errors raised by the region-template extraction core.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    /// The geometry needed to compute a scale factor is unusable.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// A language label outside the supported set.
    #[error("unrecognized OCR language {0:?} (supported: English, Hindi, English + Hindi)")]
    UnrecognizedLanguage(String),

    /// Extraction was requested without any regions.
    #[error("no regions have been defined")]
    NoRegions,

    /// Extraction was requested before any pages were rasterized.
    #[error("no pages have been loaded")]
    NoPages,

    /// The requested template page does not exist.
    #[error("template page {page} is out of range (document has {page_count} pages)")]
    TemplatePageOutOfRange { page: usize, page_count: usize },

    /// A region index does not exist.
    #[error("region {ordinal} does not exist (there are {count} regions)")]
    RegionOutOfRange { ordinal: usize, count: usize },
}
