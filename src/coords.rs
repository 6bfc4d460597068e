//! Mapping region geometry from canvas space to page pixels.
//!
//! Regions are drawn on a reduced-size rendering of the template page: the
//! canvas is a fixed width, and its height follows the page's aspect ratio.
//! Before cropping, every region is rescaled to the pixel size of the source
//! page.

use crate::{error::ExtractError, region::Rect};

/// Width of the drawing canvas, in canvas units.
pub const DEFAULT_CANVAS_WIDTH: f64 = 800.0;

/// Dimensions of the drawing canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    /// The canvas used to draw on a page of the given pixel size.
    pub fn for_page(
        canvas_width: f64,
        page_width: u32,
        page_height: u32,
    ) -> Result<Self, ExtractError> {
        if !(canvas_width > 0.0) {
            return Err(ExtractError::DegenerateGeometry(format!(
                "canvas width must be positive, got {canvas_width}"
            )));
        }
        if page_width == 0 {
            return Err(ExtractError::DegenerateGeometry(
                "template page has zero width".to_owned(),
            ));
        }
        Ok(Self {
            width: canvas_width,
            height: canvas_width * (f64::from(page_height) / f64::from(page_width)),
        })
    }
}

/// Rescales canvas-space rectangles to source-space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    canvas: CanvasSize,
    source_width: f64,
    source_height: f64,
}

impl CoordinateMapper {
    /// Create a mapper from `canvas` to a page of `source_width` by
    /// `source_height` pixels.
    pub fn new(
        canvas: CanvasSize,
        source_width: u32,
        source_height: u32,
    ) -> Result<Self, ExtractError> {
        if !(canvas.width > 0.0 && canvas.height > 0.0) {
            return Err(ExtractError::DegenerateGeometry(format!(
                "canvas must have positive area, got {}x{}",
                canvas.width, canvas.height
            )));
        }
        Ok(Self {
            canvas,
            source_width: f64::from(source_width),
            source_height: f64::from(source_height),
        })
    }

    /// Horizontal scale factor.
    pub fn scale_w(&self) -> f64 {
        self.source_width / self.canvas.width
    }

    /// Vertical scale factor.
    pub fn scale_h(&self) -> f64 {
        self.source_height / self.canvas.height
    }

    /// Map a canvas-space rectangle to source space.
    ///
    /// We divide by the canvas extent before multiplying, so that a rectangle
    /// covering the whole canvas maps to exactly the whole page.
    pub fn map(&self, rect: &Rect) -> Rect {
        let x = |v: f64| v / self.canvas.width * self.source_width;
        let y = |v: f64| v / self.canvas.height * self.source_height;
        Rect {
            left: x(rect.left),
            top: y(rect.top),
            width: x(rect.width),
            height: y(rect.height),
        }
    }
}
