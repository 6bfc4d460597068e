//! Command-line entry points.

use clap::Args;

use crate::{coords::DEFAULT_CANVAS_WIDTH, prelude::*, raster::RasterOptions};

pub mod extract;
pub mod pages;
pub mod preview;
pub mod schema;
pub mod template;

/// Options for subcommands which read a document.
#[derive(Debug, Clone, Args)]
pub struct DocumentOpts {
    /// The document: a PDF, PNG, JPEG or TIFF file.
    #[clap(value_name = "DOCUMENT")]
    pub document_path: PathBuf,

    /// Width of the canvas regions are drawn on. Its height follows the
    /// template page's aspect ratio.
    #[clap(long, default_value_t = DEFAULT_CANVAS_WIDTH)]
    pub canvas_width: f64,

    /// The 1-based page regions are drawn on.
    #[clap(long, default_value_t = 1)]
    pub template_page: usize,

    #[clap(flatten)]
    pub raster: RasterOptions,
}

impl DocumentOpts {
    /// The 0-based index of the template page.
    pub fn template_page_index(&self) -> Result<usize> {
        self.template_page
            .checked_sub(1)
            .ok_or_else(|| anyhow!("--template-page is 1-based, got 0"))
    }
}
