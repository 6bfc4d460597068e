//! Tesseract OCR engine.

use std::{env, ffi::OsString};

use image::{DynamicImage, ImageFormat};
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    language::OcrLanguage,
    prelude::*,
};

use super::OcrEngine;

/// Environment variable which overrides the `tesseract` binary.
pub const TESSERACT_CMD_ENV: &str = "TESSERACT_CMD";

/// OCR engine wrapping the `tesseract` CLI tool.
#[derive(Debug, Clone)]
pub struct TesseractOcrEngine {
    /// The command to run.
    command: OsString,
}

impl TesseractOcrEngine {
    /// Create a new engine, honoring [`TESSERACT_CMD_ENV`].
    pub fn from_env() -> Self {
        let command = env::var_os(TESSERACT_CMD_ENV).unwrap_or_else(|| "tesseract".into());
        Self { command }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
    #[instrument(level = "trace", skip_all, fields(lang = language.code()))]
    async fn recognize(&self, image: &DynamicImage, language: OcrLanguage) -> Result<String> {
        // Write our input to a temporary PNG file. Encoding is CPU-bound, so
        // keep it off the executor.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join("input.png");
        let image = image.clone();
        let path = input_path.clone();
        spawn_blocking_propagating_panics(move || {
            image
                .save_with_format(&path, ImageFormat::Png)
                .context("cannot write tesseract input file")
        })
        .await?;

        // Run tesseract, reading the text from standard output.
        let output = with_cpu_semaphore(|| async {
            Command::new(&self.command)
                .arg(&input_path)
                .arg("stdout")
                .arg("-l")
                .arg(language.code())
                .output()
                .await
                .with_context(|| format!("cannot run {:?}", self.command))
        })
        .await?;
        check_for_command_failure("tesseract", &output)?;

        String::from_utf8(output.stdout).context("tesseract output was not valid UTF-8")
    }
}
