//! Image cleanup applied to each cropped region before OCR.

use std::collections::BTreeSet;

use image::DynamicImage;
use schemars::JsonSchema;

use crate::prelude::*;

/// A single preprocessing step.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessStep {
    /// Convert to single-channel luminance.
    Grayscale,
    /// Convert to luminance, then invert. Helps with light text on a dark
    /// background.
    Invert,
}

impl PreprocessStep {
    /// Look up a step by name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "grayscale" => Some(Self::Grayscale),
            "invert" => Some(Self::Invert),
            _ => None,
        }
    }
}

/// The set of preprocessing steps to apply. Order of selection doesn't
/// matter: grayscale always runs before inversion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Preprocessing {
    steps: BTreeSet<PreprocessStep>,
}

impl Preprocessing {
    /// No preprocessing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from option names. Names we don't know are skipped, so that
    /// configurations written for newer versions still load.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut steps = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            match PreprocessStep::from_name(name) {
                Some(step) => {
                    steps.insert(step);
                }
                None => warn!(option = name, "Ignoring unknown preprocessing option"),
            }
        }
        Self { steps }
    }

    /// Is `step` enabled?
    pub fn contains(&self, step: PreprocessStep) -> bool {
        self.steps.contains(&step)
    }

    /// Apply our steps to an image.
    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        let mut image = image;
        if self.contains(PreprocessStep::Grayscale) {
            image = to_luma(image);
        }
        if self.contains(PreprocessStep::Invert) {
            image = to_luma(image);
            image.invert();
        }
        image
    }
}

/// Convert to 8-bit luminance, unless we're already there.
fn to_luma(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) => image,
        other => DynamicImage::ImageLuma8(other.to_luma8()),
    }
}
