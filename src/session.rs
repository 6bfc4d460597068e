//! Per-user working state: the loaded document, the drawn regions and the
//! last extraction result.

use indicatif::ProgressBar;

use crate::{
    error::ExtractError,
    extract::{ExtractionSettings, extract_table},
    ocr::OcrEngine,
    prelude::*,
    raster::{PageImage, RasterOptions, rasterize_document},
    region::{DrawnRect, NamedRegion, Rect, RegionId, RegionSet},
    table::ExtractionResult,
    template::Template,
};

/// Everything one user is working on. Nothing here is shared between
/// sessions.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pages: Vec<PageImage>,
    regions: RegionSet,
    /// Settings used by [`Session::extract`].
    pub settings: ExtractionSettings,
    result: Option<ExtractionResult>,
}

impl Session {
    /// Create an empty session with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session with the given settings.
    pub fn with_settings(settings: ExtractionSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Forget the document, regions, field names and result. Settings are
    /// kept.
    pub fn reset(&mut self) {
        debug!("Resetting session");
        self.pages.clear();
        self.regions = RegionSet::new();
        self.result = None;
    }

    /// Rasterize a document and make its pages current. On failure, the
    /// session is left as it was.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load_document(&mut self, path: &Path, options: &RasterOptions) -> Result<()> {
        let pages = rasterize_document(path, options).await?;
        self.set_pages(pages);
        Ok(())
    }

    /// Make `pages` current. Regions are kept, because they are usually
    /// reused across documents with the same layout.
    pub fn set_pages(&mut self, pages: Vec<PageImage>) {
        debug!(pages = pages.len(), "Loaded document pages");
        self.pages = pages;
    }

    /// The current document's pages.
    pub fn pages(&self) -> &[PageImage] {
        &self.pages
    }

    /// Replace our regions with the drawing surface's current objects.
    pub fn sync_regions(&mut self, drawn: Vec<DrawnRect>) {
        self.regions.sync(drawn);
    }

    /// Add a region at the end.
    pub fn add_region(&mut self, rect: Rect) -> RegionId {
        self.regions.add(rect)
    }

    /// Remove a region. Returns false if there was no such region.
    pub fn remove_region(&mut self, id: RegionId) -> bool {
        self.regions.remove(id).is_some()
    }

    /// Our regions.
    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Rename the region at `ordinal`.
    pub fn rename(&mut self, ordinal: usize, name: impl Into<String>) -> Result<(), ExtractError> {
        self.regions.rename(ordinal, name)
    }

    /// The field name of the region at `ordinal`.
    pub fn field_name(&self, ordinal: usize) -> Option<String> {
        self.regions.field_name(ordinal)
    }

    /// Every region with its field name, in column order.
    pub fn named_regions(&self) -> Vec<NamedRegion> {
        self.regions.named_regions()
    }

    /// Snapshot our regions and field names as a template.
    pub fn to_template(&self) -> Template {
        let (regions, field_names) = self.regions.to_parts();
        Template::new(regions, field_names)
    }

    /// Replace our regions and field names with a template's.
    pub fn load_template(&mut self, template: Template) {
        debug!(regions = template.regions.len(), "Loading template into session");
        self.regions = RegionSet::from_parts(template.regions, template.field_names);
    }

    /// Run a fresh extraction pass over every page. On success, the new
    /// result replaces the old one. If the pass can't start, the old result is
    /// kept.
    pub async fn extract(
        &mut self,
        engine: &dyn OcrEngine,
        progress: Option<&ProgressBar>,
    ) -> Result<&ExtractionResult, ExtractError> {
        let regions = self.named_regions();
        let result =
            extract_table(&self.pages, &regions, &self.settings, engine, progress).await?;
        Ok(&*self.result.insert(result))
    }

    /// The last extraction result, if any.
    pub fn result(&self) -> Option<&ExtractionResult> {
        self.result.as_ref()
    }

    /// The last extraction result, for editing.
    pub fn result_mut(&mut self) -> Option<&mut ExtractionResult> {
        self.result.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, GenericImageView as _, RgbImage};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::language::OcrLanguage;

    /// Reports the size of each crop.
    struct SizeEngine;

    #[async_trait]
    impl OcrEngine for SizeEngine {
        async fn recognize(&self, image: &DynamicImage, _language: OcrLanguage) -> Result<String> {
            let (w, h) = image.dimensions();
            Ok(format!("{w}x{h}"))
        }
    }

    fn page(index: usize) -> PageImage {
        PageImage {
            index,
            image: DynamicImage::ImageRgb8(RgbImage::new(1600, 1200)),
        }
    }

    fn session_with_pages(count: usize) -> Session {
        let mut session = Session::new();
        session.set_pages((0..count).map(page).collect());
        session
    }

    #[tokio::test]
    async fn extract_uses_current_names_and_replaces_result() {
        let mut session = session_with_pages(2);
        session.add_region(Rect::new(0.0, 0.0, 10.0, 20.0));
        session.add_region(Rect::new(50.0, 0.0, 30.0, 5.0));
        session.rename(1, "Total").unwrap();

        let result = session.extract(&SizeEngine, None).await.unwrap();
        assert_eq!(result.columns(), ["Page", "Field_1", "Total"]);
        assert_eq!(result.get(1, "Total"), Some("60x10"));

        // Renaming applies to the next pass straight away.
        session.rename(0, "Name").unwrap();
        session.extract(&SizeEngine, None).await.unwrap();
        let result = session.result().unwrap();
        assert_eq!(result.columns(), ["Page", "Name", "Total"]);
        assert_eq!(result.get(0, "Name"), Some("20x40"));
    }

    #[tokio::test]
    async fn failed_pass_keeps_previous_result() {
        let mut session = session_with_pages(1);
        let id = session.add_region(Rect::new(0.0, 0.0, 10.0, 10.0));
        session.extract(&SizeEngine, None).await.unwrap();

        assert!(session.remove_region(id));
        assert!(!session.remove_region(id));
        assert_eq!(
            session.extract(&SizeEngine, None).await.err(),
            Some(ExtractError::NoRegions)
        );
        assert_eq!(session.result().unwrap().row_count(), 1);
    }

    #[tokio::test]
    async fn result_can_be_edited() {
        let mut session = session_with_pages(1);
        session.add_region(Rect::new(0.0, 0.0, 10.0, 10.0));
        session.extract(&SizeEngine, None).await.unwrap();
        session
            .result_mut()
            .unwrap()
            .set(0, "Field_1", "fixed by hand")
            .unwrap();
        assert_eq!(session.result().unwrap().get(0, "Field_1"), Some("fixed by hand"));
    }

    #[test]
    fn templates_round_trip_through_sessions() {
        let mut first = Session::new();
        first.add_region(Rect::new(1.0, 2.0, 3.0, 4.0));
        first.add_region(Rect::new(5.0, 6.0, 7.0, 8.0));
        first.rename(0, "Invoice").unwrap();
        let template = first.to_template();

        let mut second = Session::new();
        second.add_region(Rect::new(9.0, 9.0, 9.0, 9.0));
        second.rename(0, "Stale").unwrap();
        second.load_template(template);
        assert_eq!(second.named_regions(), first.named_regions());
        assert_eq!(second.field_name(1).as_deref(), Some("Field_2"));

        // New regions never reuse loaded IDs.
        let id = second.add_region(Rect::new(0.0, 0.0, 1.0, 1.0));
        assert!(second.regions().regions().iter().filter(|r| r.id == id).count() == 1);
    }

    #[test]
    fn sync_keeps_names_of_surviving_regions() {
        let mut session = Session::new();
        let a = session.add_region(Rect::new(0.0, 0.0, 1.0, 1.0));
        let b = session.add_region(Rect::new(2.0, 0.0, 1.0, 1.0));
        session.rename(1, "B").unwrap();

        // The user deleted `a` and moved `b` on the drawing surface.
        session.sync_regions(vec![DrawnRect {
            id: Some(b),
            rect: Rect::new(20.0, 0.0, 1.0, 1.0),
        }]);
        assert_eq!(session.field_name(0).as_deref(), Some("B"));
        assert!(!session.regions().regions().iter().any(|r| r.id == a));
    }

    #[tokio::test]
    async fn failed_load_leaves_session_unchanged() {
        let mut session = session_with_pages(2);
        let err = session
            .load_document(Path::new("/does/not/exist.pdf"), &RasterOptions::default())
            .await;
        assert!(err.is_err());
        assert_eq!(session.pages().len(), 2);
    }

    #[tokio::test]
    async fn load_png_document() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("session")?;
        let path = dir.path().join("scan.png");
        RgbImage::new(40, 30).save(&path)?;

        let mut session = Session::new();
        session.load_document(&path, &RasterOptions::default()).await?;
        assert_eq!(session.pages().len(), 1);
        assert_eq!(session.pages()[0].dimensions(), (40, 30));
        Ok(())
    }

    #[test]
    fn reset_clears_everything_but_settings() {
        let mut session = Session::with_settings(ExtractionSettings {
            canvas_width: 400.0,
            ..ExtractionSettings::default()
        });
        session.set_pages(vec![page(0)]);
        session.add_region(Rect::new(0.0, 0.0, 1.0, 1.0));
        session.reset();
        assert!(session.pages().is_empty());
        assert!(session.regions().is_empty());
        assert!(session.result().is_none());
        assert_eq!(session.settings.canvas_width, 400.0);
    }
}
