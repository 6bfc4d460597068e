//! The `extract` subcommand.

use clap::Args;

use crate::{
    async_utils::io::write_output,
    cmd::DocumentOpts,
    extract::{ExtractionSettings, ScalePolicy},
    language::OcrLanguage,
    ocr::TesseractOcrEngine,
    prelude::*,
    preprocess::Preprocessing,
    session::Session,
    table::TableFormat,
    template::Template,
    ui::{ProgressConfig, Ui},
};

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    #[clap(flatten)]
    pub document: DocumentOpts,

    /// Template with the regions to extract.
    #[clap(short = 't', long = "template", value_name = "TEMPLATE")]
    pub template_path: PathBuf,

    /// Language to recognize.
    #[clap(long, value_enum, default_value_t = OcrLanguage::English)]
    pub language: OcrLanguage,

    /// Clean up each region before OCR. May be repeated. Known steps are
    /// "grayscale" and "invert".
    #[clap(long = "preprocess", value_name = "STEP")]
    pub preprocess: Vec<String>,

    /// How to scale regions to pages of a different size.
    #[clap(long, value_enum, default_value_t = ScalePolicy::TemplatePage)]
    pub scale_policy: ScalePolicy,

    /// Max number of pages to OCR at a time. Defaults to the number of CPUs.
    #[clap(short = 'j', long = "jobs")]
    pub job_count: Option<usize>,

    /// Output format.
    #[clap(long, value_enum, default_value_t = TableFormat::Csv)]
    pub format: TableFormat,

    /// Output file. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_extract(ui: Ui, opts: &ExtractOpts) -> Result<()> {
    let settings = ExtractionSettings {
        language: opts.language,
        preprocessing: Preprocessing::from_names(&opts.preprocess),
        canvas_width: opts.document.canvas_width,
        template_page: opts.document.template_page_index()?,
        scale_policy: opts.scale_policy,
        job_count: opts.job_count.unwrap_or_else(num_cpus::get),
    };
    let mut session = Session::with_settings(settings);

    // Load the template first, because it's cheap to fail on.
    let template = Template::load(&opts.template_path).await?;
    session.load_template(template);

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "📄",
        msg: "Rasterizing document",
        done_msg: "Rasterized document",
    });
    session
        .load_document(&opts.document.document_path, &opts.document.raster)
        .await?;
    spinner.finish_using_style();

    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "🔎",
            msg: "Extracting",
            done_msg: "Extracted",
        },
        u64::try_from(session.pages().len())?,
    );
    let engine = TesseractOcrEngine::from_env();
    let result = session.extract(&engine, Some(&pb)).await?;
    pb.finish_using_style();
    info!(
        pages = result.row_count(),
        columns = result.columns().len(),
        "Extraction complete"
    );

    let bytes = result.to_bytes(opts.format)?;
    write_output(opts.output_path.as_deref(), &bytes).await
}
