//! OCR language selection.

use std::{fmt, str::FromStr};

use clap::ValueEnum;
use schemars::JsonSchema;

use crate::{error::ExtractError, prelude::*};

/// The languages we can ask the OCR engine for. This is a closed set: any
/// other label is rejected when the configuration is parsed, never during
/// extraction.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize, JsonSchema,
)]
pub enum OcrLanguage {
    /// English text.
    #[default]
    #[value(name = "English")]
    #[serde(rename = "English")]
    English,
    /// Hindi text.
    #[value(name = "Hindi")]
    #[serde(rename = "Hindi")]
    Hindi,
    /// Mixed English and Hindi text.
    #[value(name = "English + Hindi")]
    #[serde(rename = "English + Hindi")]
    EnglishHindi,
}

impl OcrLanguage {
    /// Every supported language.
    pub const ALL: [OcrLanguage; 3] = [Self::English, Self::Hindi, Self::EnglishHindi];

    /// The human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
            Self::EnglishHindi => "English + Hindi",
        }
    }

    /// The language code passed to the OCR engine.
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "eng",
            Self::Hindi => "hin",
            Self::EnglishHindi => "eng+hin",
        }
    }

    /// Parse a human-readable label.
    pub fn from_label(label: &str) -> Result<Self, ExtractError> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.label() == label)
            .ok_or_else(|| ExtractError::UnrecognizedLanguage(label.to_owned()))
    }
}

impl FromStr for OcrLanguage {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

impl fmt::Display for OcrLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
