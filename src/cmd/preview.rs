//! The `preview` subcommand.

use clap::Args;
use image::imageops::FilterType;

use crate::{
    async_utils::spawn_blocking_propagating_panics, cmd::DocumentOpts, coords::CanvasSize,
    prelude::*, raster::rasterize_document,
};

/// Preview command line arguments.
#[derive(Debug, Args)]
pub struct PreviewOpts {
    #[clap(flatten)]
    pub document: DocumentOpts,

    /// Where to write the PNG.
    #[clap(short = 'o', long = "out")]
    pub output_path: PathBuf,
}

/// The `preview` subcommand. Writes the template page at canvas size, for
/// use as a drawing background.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_preview(opts: &PreviewOpts) -> Result<()> {
    let index = opts.document.template_page_index()?;
    let mut pages =
        rasterize_document(&opts.document.document_path, &opts.document.raster).await?;
    let page_count = pages.len();
    if index >= page_count {
        return Err(anyhow!(
            "--template-page {} is past the end of a {}-page document",
            index + 1,
            page_count
        ));
    }
    let page = pages.swap_remove(index);

    let canvas = CanvasSize::for_page(opts.document.canvas_width, page.width(), page.height())?;
    let (width, height) = preview_size(canvas);
    debug!(width, height, "Rendering preview");

    let output_path = opts.output_path.clone();
    spawn_blocking_propagating_panics(move || {
        page.image
            .resize_exact(width, height, FilterType::Triangle)
            .save(&output_path)
            .with_context(|| format!("failed to write preview {:?}", output_path.display()))
    })
    .await
}

/// Pixel size of the preview. The drawing surface truncates its canvas size
/// to whole pixels, so we do too.
fn preview_size(canvas: CanvasSize) -> (u32, u32) {
    let width = (canvas.width.trunc() as u32).max(1);
    let height = (canvas.height.trunc() as u32).max(1);
    (width, height)
}
