use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use region_scraper::{cmd, prelude::*, ui::Ui};

/// Extract fields from scanned documents by OCRing fixed regions of each page.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - TESSERACT_CMD (optional): The tesseract binary to run.
  - RUST_LOG (optional): Log filter, such as "region_scraper=debug".

  These variables may be set in a standard `.env` file.

External tools:
  PDFs are rasterized with Poppler's `pdfinfo` and `pdftocairo`. OCR uses
  `tesseract`, with the `eng` and `hin` language packs.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// OCR each template region on every page, and write one row per page.
    Extract(cmd::extract::ExtractOpts),
    /// List a document's pages, with their sizes and canvas sizes.
    Pages(cmd::pages::PagesOpts),
    /// Render the template page at canvas size, for drawing regions on.
    Preview(cmd::preview::PreviewOpts),
    /// Create and inspect region templates.
    Template(cmd::template::TemplateOpts),
    /// Print schemas for template and output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output_path.is_none(),
            Cmd::Pages(opts) => opts.output_path.is_none(),
            Cmd::Preview(_) => false,
            Cmd::Template(opts) => opts.output_path().is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bars if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Extract(opts) => cmd::extract::cmd_extract(ui, opts).await?,
        Cmd::Pages(opts) => cmd::pages::cmd_pages(opts).await?,
        Cmd::Preview(opts) => cmd::preview::cmd_preview(opts).await?,
        Cmd::Template(opts) => cmd::template::cmd_template(opts).await?,
        Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await?,
    }
    Ok(())
}
