//! The `pages` subcommand.

use clap::Args;

use crate::{
    async_utils::io::write_jsonl, cmd::DocumentOpts, coords::CanvasSize, prelude::*,
    raster::rasterize_document,
};

/// Pages command line arguments.
#[derive(Debug, Args)]
pub struct PagesOpts {
    #[clap(flatten)]
    pub document: DocumentOpts,

    /// Output file. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// What we report about each page.
#[derive(Debug, Serialize)]
struct PageInfo {
    /// 1-based page number.
    page: usize,
    width: u32,
    height: u32,
    /// The canvas a drawing surface would use for this page.
    canvas_width: f64,
    canvas_height: f64,
}

/// The `pages` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_pages(opts: &PagesOpts) -> Result<()> {
    let pages = rasterize_document(&opts.document.document_path, &opts.document.raster).await?;
    let infos = pages
        .iter()
        .map(|page| {
            let canvas =
                CanvasSize::for_page(opts.document.canvas_width, page.width(), page.height())?;
            Ok(PageInfo {
                page: page.number(),
                width: page.width(),
                height: page.height(),
                canvas_width: canvas.width,
                canvas_height: canvas.height,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    write_jsonl(opts.output_path.as_deref(), &infos).await
}
