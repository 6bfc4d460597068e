//! OCR engine interface.
//!
//! The extraction engine only needs one thing from an OCR backend: turn an
//! image into text in a given language. Everything about *where* to look
//! lives in [`crate::extract`].

use image::DynamicImage;

use crate::{language::OcrLanguage, prelude::*};

pub mod tesseract;

pub use self::tesseract::TesseractOcrEngine;

/// Interface to an OCR engine.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Recognize the text in `image`. May return an empty string.
    async fn recognize(&self, image: &DynamicImage, language: OcrLanguage) -> Result<String>;
}

/// Tidy recognized text for a table cell: line breaks become single spaces,
/// and surrounding whitespace is dropped.
pub fn clean_recognized_text(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_owned()
}
