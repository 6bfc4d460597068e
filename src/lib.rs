//! Extract tables from scanned documents by OCRing named template regions.
//!
//! Regions are drawn once, on a canvas sized from a template page. A
//! [`session::Session`] holds the regions, the rasterized pages and the last
//! [`table::ExtractionResult`]. [`extract::extract_table`] does the actual
//! work, and the `region-scraper` binary wraps it all in a CLI.

pub mod async_utils;
pub mod cmd;
pub mod coords;
pub mod cpu_limit;
pub mod error;
pub mod extract;
pub mod language;
pub mod ocr;
pub mod prelude;
pub mod preprocess;
pub mod raster;
pub mod region;
pub mod session;
pub mod table;
pub mod template;
pub mod ui;
