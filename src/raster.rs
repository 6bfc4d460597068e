//! Turn a document into one raster image per page.
//!
//! PDFs are rasterized with Poppler's `pdftocairo`. Single images are used
//! as-is, and multi-page TIFF scans are split into their pages.

use std::{collections::BTreeMap, fs, io::BufReader, sync::LazyLock};

use clap::Args;
use image::{DynamicImage, GenericImageView as _, GrayImage, ImageReader, RgbImage, RgbaImage};
use regex::Regex;
use tiff::{
    ColorType,
    decoder::{Decoder, DecodingResult},
};
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    prelude::*,
};

/// Rasterization resolution. Chosen to keep memory bounded on long documents.
pub const DEFAULT_DPI: u32 = 150;

/// Image types we decode directly.
const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg"];

/// TIFF MIME type, handled separately due to multipage complexity.
const TIFF_MIME_TYPE: &str = "image/tiff";

/// Lines of Poppler output that mean something went wrong.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^(?:internal )?error").expect("failed to compile regex"));

/// Lines which look like errors, but which Poppler recovers from.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this Poppler output contain a real error?
fn has_error_line(output: &str) -> bool {
    output
        .lines()
        .any(|line| ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line))
}

/// Options for rasterizing a document.
#[derive(Args, Clone, Debug)]
pub struct RasterOptions {
    /// The DPI to use when rasterizing PDFs.
    #[clap(long = "dpi", default_value_t = DEFAULT_DPI)]
    pub dpi: u32,

    /// Only rasterize the first N pages.
    #[clap(long)]
    pub max_pages: Option<usize>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            max_pages: None,
        }
    }
}

/// A single rasterized page. Immutable once created.
#[derive(Clone, Debug)]
pub struct PageImage {
    /// 0-based page index.
    pub index: usize,
    /// The page pixels.
    pub image: DynamicImage,
}

impl PageImage {
    /// 1-based page number.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Width and height in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Rasterize every page of the document at `path`.
///
/// Fails if the document can't be read or has no pages. A failure leaves
/// nothing behind.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn rasterize_document(path: &Path, options: &RasterOptions) -> Result<Vec<PageImage>> {
    let mime_type = get_mime_type(path)?;
    debug!(%mime_type, "Detected document type");

    let images = if SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
        let path = path.to_owned();
        let image = spawn_blocking_propagating_panics(move || decode_image_file(&path)).await?;
        vec![image]
    } else if mime_type == TIFF_MIME_TYPE {
        let path = path.to_owned();
        let max_pages = options.max_pages;
        spawn_blocking_propagating_panics(move || decode_tiff_pages(&path, max_pages)).await?
    } else if mime_type == "application/pdf" {
        rasterize_pdf(path, options).await?
    } else {
        return Err(anyhow!(
            "unsupported MIME type {} for {:?} (supported: PNG, JPEG, TIFF, PDF)",
            mime_type,
            path.display()
        ));
    };

    if images.is_empty() {
        return Err(anyhow!("{:?} contains no pages", path.display()));
    }
    Ok(images
        .into_iter()
        .enumerate()
        .map(|(index, image)| PageImage { index, image })
        .collect())
}

/// Rasterize a PDF with `pdftocairo`, then decode the resulting PNGs.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), dpi = options.dpi))]
async fn rasterize_pdf(path: &Path, options: &RasterOptions) -> Result<Vec<DynamicImage>> {
    let total_pages = get_pdf_page_count(path).await?;

    // pdftocairo will add page numbers to this name, zero-padded to the same
    // width, so sorting the directory gives us page order.
    let tmpdir = tempfile::TempDir::with_prefix("pages")?;
    let out_path = tmpdir.path().join("page");

    let mut cmd = Command::new("pdftocairo");
    cmd.arg("-png").arg("-r").arg(options.dpi.to_string());
    if let Some(max_pages) = options.max_pages
        && total_pages > max_pages
    {
        // Poppler page ranges are 1-based and inclusive.
        cmd.arg("-l").arg(max_pages.to_string());
    }
    let output = with_cpu_semaphore(|| async {
        cmd.arg(path).arg(&out_path).output().await.with_context(|| {
            format!("failed to run pdftocairo on {:?}", path.display())
        })
    })
    .await?;
    check_for_command_failure("pdftocairo", &output)?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    if has_error_line(&stderr) {
        return Err(anyhow!("pdftocairo reported errors:\n{}", stderr));
    }

    let mut page_paths = tmpdir
        .path()
        .read_dir()
        .with_context(|| {
            format!(
                "failed to read temporary directory {:?}",
                tmpdir.path().display()
            )
        })?
        .map(|entry| Ok(entry.context("failed to read temporary directory entry")?.path()))
        .collect::<Result<Vec<_>>>()?;
    page_paths.sort();

    let images = spawn_blocking_propagating_panics(move || {
        page_paths
            .iter()
            .map(|page_path| decode_image_file(page_path))
            .collect::<Result<Vec<_>>>()
    })
    .await?;
    if let Err(err) = tmpdir.close() {
        warn!("failed to delete temporary directory: {}", err);
    }
    debug!(pages = images.len(), total_pages, "Rasterized PDF");
    Ok(images)
}

/// Get the number of pages in a PDF file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn get_pdf_page_count(path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .await
        .with_context(|| format!("failed to run pdfinfo on {:?}", path.display()))?;
    check_for_command_failure("pdfinfo", &output)?;

    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    parse_pdfinfo_page_count(&output)
        .with_context(|| format!("failed to get page count for {:?}", path.display()))
}

/// Pull the `Pages:` property out of `pdfinfo` output.
fn parse_pdfinfo_page_count(output: &str) -> Result<usize> {
    let properties = output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect::<BTreeMap<_, _>>();
    let pages = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    pages
        .parse::<usize>()
        .with_context(|| format!("invalid page count {:?}", pages))
}

/// Decode an image file, trusting its contents over its extension.
fn decode_image_file(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("failed to open image {:?}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read image {:?}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode image {:?}", path.display()))
}

/// Get the MIME type of a file.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to read {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown MIME type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}

/// Decode each page (IFD) of a TIFF file.
fn decode_tiff_pages(path: &Path, max_pages: Option<usize>) -> Result<Vec<DynamicImage>> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open TIFF file {:?}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file)).with_context(|| {
        format!("failed to create TIFF decoder for {:?}", path.display())
    })?;

    let mut pages = vec![];
    loop {
        if max_pages.is_some_and(|max| pages.len() >= max) {
            break;
        }
        let page_number = pages.len() + 1;
        let (width, height) = decoder.dimensions().with_context(|| {
            format!("failed to get dimensions of TIFF page {}", page_number)
        })?;
        let color_type = decoder.colortype().with_context(|| {
            format!("failed to get color type of TIFF page {}", page_number)
        })?;
        let data = decoder
            .read_image()
            .with_context(|| format!("failed to decode TIFF page {}", page_number))?;
        pages.push(tiff_to_dynamic_image(width, height, color_type, data).ok_or_else(
            || {
                anyhow!(
                    "unsupported TIFF color type {:?} on page {} of {:?}",
                    color_type,
                    page_number,
                    path.display()
                )
            },
        )?);

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .with_context(|| format!("failed to advance past TIFF page {}", page_number))?;
    }
    Ok(pages)
}

/// Convert decoded TIFF samples to an image. 16-bit samples are reduced to
/// 8 bits.
fn tiff_to_dynamic_image(
    width: u32,
    height: u32,
    color_type: ColorType,
    data: DecodingResult,
) -> Option<DynamicImage> {
    let data = match data {
        DecodingResult::U8(data) => data,
        DecodingResult::U16(data) => data.iter().map(|&v| (v >> 8) as u8).collect(),
        _ => return None,
    };
    match color_type {
        ColorType::Gray(8 | 16) => {
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        ColorType::RGB(8 | 16) => {
            RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
        ColorType::RGBA(8 | 16) => {
            RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8)
        }
        _ => None,
    }
}
