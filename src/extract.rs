//! The extraction engine: OCR every named region on every page.
//!
//! A pass goes through these steps:
//!
//! 1. Work out the canvas the regions were drawn on, from the template
//!    page's aspect ratio.
//! 2. Scale every region from canvas space to page pixels.
//! 3. For each page, and each region on that page: crop, preprocess, and
//!    recognize.
//! 4. Assemble one row per page.
//!
//! Problems with a single region (zero area, off the page, OCR failure) are
//! logged and produce an empty cell. They never stop the pass.

use clap::ValueEnum;
use futures::{StreamExt as _, stream};
use image::DynamicImage;
use indicatif::ProgressBar;

use crate::{
    coords::{CanvasSize, CoordinateMapper, DEFAULT_CANVAS_WIDTH},
    error::ExtractError,
    language::OcrLanguage,
    ocr::{OcrEngine, clean_recognized_text},
    prelude::*,
    preprocess::Preprocessing,
    raster::PageImage,
    region::{NamedRegion, Rect},
    table::ExtractionResult,
};

/// How to compute the canvas-to-page scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ScalePolicy {
    /// Scale once against the template page, and reuse that for every page.
    /// Pages of a different size get a warning.
    #[default]
    TemplatePage,
    /// Scale against each page's own size, using the same canvas.
    PerPage,
}

/// Settings for an extraction pass.
#[derive(Clone, Debug)]
pub struct ExtractionSettings {
    /// Language passed to the OCR engine.
    pub language: OcrLanguage,
    /// Cleanup applied to each crop.
    pub preprocessing: Preprocessing,
    /// Width of the drawing canvas.
    pub canvas_width: f64,
    /// 0-based index of the page the regions were drawn on.
    pub template_page: usize,
    /// How to scale regions to each page.
    pub scale_policy: ScalePolicy,
    /// How many pages to work on at once.
    pub job_count: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            language: OcrLanguage::default(),
            preprocessing: Preprocessing::none(),
            canvas_width: DEFAULT_CANVAS_WIDTH,
            template_page: 0,
            scale_policy: ScalePolicy::default(),
            job_count: 1,
        }
    }
}

/// Run a full extraction pass.
///
/// Returns an error only when the pass can't start: no regions, no pages, or
/// an unusable template page. Once it starts, it always produces one row per
/// page.
#[instrument(level = "debug", skip_all, fields(pages = pages.len(), regions = regions.len()))]
pub async fn extract_table(
    pages: &[PageImage],
    regions: &[NamedRegion],
    settings: &ExtractionSettings,
    engine: &dyn OcrEngine,
    progress: Option<&ProgressBar>,
) -> Result<ExtractionResult, ExtractError> {
    if regions.is_empty() {
        return Err(ExtractError::NoRegions);
    }
    if pages.is_empty() {
        return Err(ExtractError::NoPages);
    }
    let template_page =
        pages
            .get(settings.template_page)
            .ok_or(ExtractError::TemplatePageOutOfRange {
                page: settings.template_page + 1,
                page_count: pages.len(),
            })?;

    // Scale our regions once, against the template page.
    let (template_w, template_h) = template_page.dimensions();
    let canvas = CanvasSize::for_page(settings.canvas_width, template_w, template_h)?;
    let template_mapper = CoordinateMapper::new(canvas, template_w, template_h)?;
    let scaled = scale_regions(&template_mapper, regions);
    debug!(
        canvas_width = canvas.width,
        canvas_height = canvas.height,
        scale_w = template_mapper.scale_w(),
        scale_h = template_mapper.scale_h(),
        "Scaled regions to template page"
    );

    let mut result = ExtractionResult::new(regions.iter().map(|r| r.field_name.clone()));
    let page_rows = stream::iter(pages)
        .map(|page| {
            let scaled = &scaled;
            async move {
                let values = if page.dimensions() == (template_w, template_h) {
                    extract_page(page, regions, scaled, settings, engine).await
                } else {
                    match settings.scale_policy {
                        ScalePolicy::TemplatePage => {
                            warn!(
                                page = page.number(),
                                width = page.width(),
                                height = page.height(),
                                template_width = template_w,
                                template_height = template_h,
                                "Page size differs from template page; regions may be misaligned"
                            );
                            extract_page(page, regions, scaled, settings, engine).await
                        }
                        ScalePolicy::PerPage => {
                            let (w, h) = page.dimensions();
                            match CoordinateMapper::new(canvas, w, h) {
                                Ok(mapper) => {
                                    let rescaled = scale_regions(&mapper, regions);
                                    extract_page(page, regions, &rescaled, settings, engine).await
                                }
                                Err(err) => {
                                    warn!(page = page.number(), "Cannot scale regions: {}", err);
                                    vec![String::new(); regions.len()]
                                }
                            }
                        }
                    }
                };
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                (page.number(), values)
            }
        })
        // `buffered` keeps page order while working on several pages at once.
        .buffered(settings.job_count.max(1))
        .collect::<Vec<_>>()
        .await;

    for (page_number, values) in page_rows {
        result.push_page(
            page_number,
            regions
                .iter()
                .map(|region| region.field_name.as_str())
                .zip(values),
        );
    }
    Ok(result)
}

/// Map every region's rectangle with `mapper`.
fn scale_regions(mapper: &CoordinateMapper, regions: &[NamedRegion]) -> Vec<Rect> {
    regions.iter().map(|region| mapper.map(&region.rect)).collect()
}

/// Recognize every region on one page, in region order.
#[instrument(level = "debug", skip_all, fields(page = page.number()))]
async fn extract_page(
    page: &PageImage,
    regions: &[NamedRegion],
    scaled: &[Rect],
    settings: &ExtractionSettings,
    engine: &dyn OcrEngine,
) -> Vec<String> {
    let mut values = Vec::with_capacity(regions.len());
    for (region, rect) in regions.iter().zip(scaled) {
        let value = match recognize_region(page, rect, settings, engine).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                warn!(
                    page = page.number(),
                    field = %region.field_name,
                    ?rect,
                    "Skipping region with no area"
                );
                String::new()
            }
            Err(err) => {
                warn!(
                    page = page.number(),
                    field = %region.field_name,
                    "Could not perform OCR on region: {:#}",
                    err
                );
                String::new()
            }
        };
        values.push(value);
    }
    values
}

/// Crop, preprocess and recognize one region. Returns `None` for regions with
/// no area.
async fn recognize_region(
    page: &PageImage,
    rect: &Rect,
    settings: &ExtractionSettings,
    engine: &dyn OcrEngine,
) -> Result<Option<String>> {
    let Some(crop) = crop_region(&page.image, rect)? else {
        return Ok(None);
    };
    let crop = settings.preprocessing.apply(crop);
    let text = engine.recognize(&crop, settings.language).await?;
    Ok(Some(clean_recognized_text(&text)))
}

/// Crop `image` to `rect`, truncating coordinates to whole pixels.
///
/// Returns `None` if the truncated rectangle has no area. The parts of the
/// rectangle outside the image are dropped; a rectangle entirely outside the
/// image is an error.
pub fn crop_region(image: &DynamicImage, rect: &Rect) -> Result<Option<DynamicImage>> {
    let left = rect.left.trunc() as i64;
    let top = rect.top.trunc() as i64;
    let width = rect.width.trunc() as i64;
    let height = rect.height.trunc() as i64;
    if width <= 0 || height <= 0 {
        return Ok(None);
    }

    let (image_w, image_h) = (i64::from(image.width()), i64::from(image.height()));
    let x0 = left.clamp(0, image_w);
    let y0 = top.clamp(0, image_h);
    let x1 = left.saturating_add(width).clamp(0, image_w);
    let y1 = top.saturating_add(height).clamp(0, image_h);
    if x1 <= x0 || y1 <= y0 {
        return Err(anyhow!(
            "region {}x{}+{}+{} lies outside the {}x{} page",
            width,
            height,
            left,
            top,
            image_w,
            image_h
        ));
    }

    // All four values are within `0..=u32::MAX` after clamping.
    Ok(Some(image.crop_imm(
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use image::{GenericImageView as _, Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::region::RegionId;

    /// A fake engine that describes the crop it was given: the page marker
    /// (red channel of the top-left pixel) and the crop width.
    #[derive(Default)]
    struct DescribingEngine {
        /// Fail when asked about this (page marker, crop width).
        fail_on: Option<(u8, u32)>,
        /// Every call we received, as (marker, width, height, language code).
        calls: Mutex<Vec<(u8, u32, u32, &'static str)>>,
    }

    #[async_trait]
    impl OcrEngine for DescribingEngine {
        async fn recognize(
            &self,
            image: &DynamicImage,
            language: OcrLanguage,
        ) -> Result<String> {
            let marker = image.to_rgb8().get_pixel(0, 0).0[0];
            let (w, h) = image.dimensions();
            self.calls
                .lock()
                .expect("lock poisoned")
                .push((marker, w, h, language.code()));
            if self.fail_on == Some((marker, w)) {
                return Err(anyhow!("engine exploded"));
            }
            Ok(format!("  p{marker}\nw{w}\n"))
        }
    }

    /// Pages 1600x1200, each filled with its page number in the red channel.
    fn pages(count: u8) -> Vec<PageImage> {
        (1..=count)
            .map(|n| PageImage {
                index: usize::from(n - 1),
                image: DynamicImage::ImageRgb8(RgbImage::from_pixel(1600, 1200, Rgb([n, 0, 0]))),
            })
            .collect()
    }

    fn region(id: u64, name: &str, rect: Rect) -> NamedRegion {
        NamedRegion {
            id: RegionId(id),
            rect,
            field_name: name.to_owned(),
        }
    }

    /// Three regions on an 800-wide canvas. Page scale is exactly 2x.
    fn three_regions() -> Vec<NamedRegion> {
        vec![
            region(0, "Name", Rect::new(10.0, 10.0, 50.0, 10.0)),
            region(1, "Date", Rect::new(100.0, 10.0, 30.0, 10.0)),
            region(2, "Amount", Rect::new(200.0, 10.0, 20.0, 10.0)),
        ]
    }

    fn settings() -> ExtractionSettings {
        ExtractionSettings {
            job_count: 2,
            ..ExtractionSettings::default()
        }
    }

    #[tokio::test]
    async fn one_row_per_page_with_deterministic_columns() {
        let engine = DescribingEngine::default();
        let result = extract_table(&pages(3), &three_regions(), &settings(), &engine, None)
            .await
            .unwrap();
        assert_eq!(result.columns(), ["Page", "Name", "Date", "Amount"]);
        assert_eq!(result.row_count(), 3);
        for row in 0..3 {
            assert_eq!(result.get(row, "Page"), Some((row + 1).to_string().as_str()));
        }
        // Widths are scaled 2x, and newlines are collapsed.
        assert_eq!(result.get(1, "Name"), Some("p2 w100"));
        assert_eq!(result.get(2, "Amount"), Some("p3 w40"));
        assert_eq!(engine.calls.lock().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn failure_on_one_region_leaves_one_empty_cell() {
        let engine = DescribingEngine {
            // Page 2, "Date" (30 canvas units -> 60 px).
            fail_on: Some((2, 60)),
            ..DescribingEngine::default()
        };
        let result = extract_table(&pages(3), &three_regions(), &settings(), &engine, None)
            .await
            .unwrap();
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.get(1, "Date"), Some(""));
        for row in 0..3 {
            for column in ["Name", "Date", "Amount"] {
                if (row, column) != (1, "Date") {
                    assert!(!result.get(row, column).unwrap().is_empty(), "{row} {column}");
                }
            }
        }
    }

    #[tokio::test]
    async fn zero_area_regions_are_empty_on_every_page() {
        let engine = DescribingEngine::default();
        let regions = vec![
            region(0, "Flat", Rect::new(10.0, 10.0, 50.0, 0.0)),
            region(1, "Thin", Rect::new(10.0, 10.0, 0.0, 50.0)),
            region(2, "Real", Rect::new(10.0, 10.0, 5.0, 5.0)),
        ];
        let result = extract_table(&pages(2), &regions, &settings(), &engine, None)
            .await
            .unwrap();
        for row in 0..2 {
            assert_eq!(result.get(row, "Flat"), Some(""));
            assert_eq!(result.get(row, "Thin"), Some(""));
            assert_eq!(result.get(row, "Real").map(|s| s.is_empty()), Some(false));
        }
        // Only the real region reached the engine.
        assert_eq!(engine.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn regions_off_the_page_are_empty() {
        let engine = DescribingEngine::default();
        let regions = vec![region(0, "Lost", Rect::new(900.0, 10.0, 50.0, 10.0))];
        let result = extract_table(&pages(1), &regions, &settings(), &engine, None)
            .await
            .unwrap();
        assert_eq!(result.get(0, "Lost"), Some(""));
    }

    #[tokio::test]
    async fn language_and_preprocessing_reach_the_engine() {
        let engine = DescribingEngine::default();
        let settings = ExtractionSettings {
            language: OcrLanguage::EnglishHindi,
            preprocessing: Preprocessing::from_names(["invert"]),
            ..settings()
        };
        let regions = vec![region(0, "A", Rect::new(0.0, 0.0, 10.0, 10.0))];
        extract_table(&pages(1), &regions, &settings, &engine, None)
            .await
            .unwrap();
        let calls = engine.calls.lock().unwrap();
        // Inverted grayscale of a nearly black pixel is nearly white.
        assert!(calls[0].0 > 200);
        assert_eq!(calls[0].3, "eng+hin");
    }

    #[tokio::test]
    async fn per_page_scaling_follows_each_page() {
        let mut pages = pages(2);
        pages[1].image = DynamicImage::ImageRgb8(RgbImage::from_pixel(800, 600, Rgb([2, 0, 0])));
        let regions = vec![region(0, "A", Rect::new(0.0, 0.0, 100.0, 10.0))];

        let engine = DescribingEngine::default();
        let per_page = ExtractionSettings {
            scale_policy: ScalePolicy::PerPage,
            ..settings()
        };
        let result = extract_table(&pages, &regions, &per_page, &engine, None)
            .await
            .unwrap();
        assert_eq!(result.get(0, "A"), Some("p1 w200"));
        assert_eq!(result.get(1, "A"), Some("p2 w100"));

        let engine = DescribingEngine::default();
        let result = extract_table(&pages, &regions, &settings(), &engine, None)
            .await
            .unwrap();
        assert_eq!(result.get(1, "A"), Some("p2 w200"));
    }

    #[tokio::test]
    async fn passes_that_cannot_start_are_errors() {
        let engine = DescribingEngine::default();
        assert_eq!(
            extract_table(&pages(1), &[], &settings(), &engine, None).await,
            Err(ExtractError::NoRegions)
        );
        assert_eq!(
            extract_table(&[], &three_regions(), &settings(), &engine, None).await,
            Err(ExtractError::NoPages)
        );
        let late = ExtractionSettings {
            template_page: 5,
            ..settings()
        };
        assert_eq!(
            extract_table(&pages(2), &three_regions(), &late, &engine, None).await,
            Err(ExtractError::TemplatePageOutOfRange {
                page: 6,
                page_count: 2
            })
        );
    }

    #[test]
    fn crops_truncate_and_clip() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 50));
        let crop = crop_region(&image, &Rect::new(10.9, 5.5, 20.7, 10.2))
            .unwrap()
            .unwrap();
        assert_eq!(crop.dimensions(), (20, 10));

        let clipped = crop_region(&image, &Rect::new(90.0, 40.0, 50.0, 50.0))
            .unwrap()
            .unwrap();
        assert_eq!(clipped.dimensions(), (10, 10));

        assert!(crop_region(&image, &Rect::new(0.0, 0.0, 0.9, 10.0)).unwrap().is_none());
        assert!(crop_region(&image, &Rect::new(200.0, 0.0, 10.0, 10.0)).is_err());
    }
}
