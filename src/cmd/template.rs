//! The `template` subcommands.

use clap::{Args, Subcommand};
use tokio::fs;

use crate::{
    async_utils::io::{write_jsonl, write_output},
    prelude::*,
    region::DrawnRect,
    session::Session,
    template::{DrawnObjects, Template},
};

/// Template command line arguments.
#[derive(Debug, Args)]
pub struct TemplateOpts {
    #[clap(subcommand)]
    pub subcmd: TemplateCmd,
}

/// Things we can do with templates.
#[derive(Debug, Subcommand)]
pub enum TemplateCmd {
    /// Build a template from a drawing surface's rectangles.
    Init(TemplateInitOpts),
    /// List a template's regions and field names.
    Show(TemplateShowOpts),
}

impl TemplateOpts {
    /// Where does our output go?
    pub fn output_path(&self) -> Option<&Path> {
        match &self.subcmd {
            TemplateCmd::Init(opts) => opts.output_path.as_deref(),
            TemplateCmd::Show(opts) => opts.output_path.as_deref(),
        }
    }
}

/// `template init` arguments.
#[derive(Debug, Args)]
pub struct TemplateInitOpts {
    /// JSON from the drawing surface: either a list of rectangles, or a canvas
    /// document with an `objects` list.
    #[clap(long = "regions", value_name = "CANVAS_JSON")]
    pub regions_path: PathBuf,

    /// Field names, in region order. Regions without one get a default name.
    #[clap(long = "field", value_name = "NAME")]
    pub field_names: Vec<String>,

    /// Where to write the template. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// `template show` arguments.
#[derive(Debug, Args)]
pub struct TemplateShowOpts {
    /// The template to show.
    #[clap(value_name = "TEMPLATE")]
    pub template_path: PathBuf,

    /// Output file. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// One line of `template show` output.
#[derive(Debug, Serialize)]
struct RegionListing {
    /// 1-based column position.
    position: usize,
    id: u64,
    field_name: String,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

/// The `template` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_template(opts: &TemplateOpts) -> Result<()> {
    match &opts.subcmd {
        TemplateCmd::Init(opts) => cmd_template_init(opts).await,
        TemplateCmd::Show(opts) => cmd_template_show(opts).await,
    }
}

async fn cmd_template_init(opts: &TemplateInitOpts) -> Result<()> {
    let json = fs::read_to_string(&opts.regions_path)
        .await
        .with_context(|| format!("failed to read {:?}", opts.regions_path.display()))?;
    let objects = serde_json::from_str::<DrawnObjects>(&json)
        .with_context(|| format!("failed to parse {:?}", opts.regions_path.display()))?
        .into_objects();

    let mut session = Session::new();
    session.sync_regions(objects.into_iter().map(DrawnRect::from).collect());
    let region_count = session.regions().len();
    if opts.field_names.len() > region_count {
        return Err(anyhow!(
            "got {} field names for {} regions",
            opts.field_names.len(),
            region_count
        ));
    }
    for (ordinal, name) in opts.field_names.iter().enumerate() {
        session.rename(ordinal, name.as_str())?;
    }
    debug!(regions = region_count, "Built template");

    let template = session.to_template();
    match &opts.output_path {
        Some(path) => template.save(path).await,
        None => {
            let mut json = template.to_json()?;
            json.push('\n');
            write_output(None, json.as_bytes()).await
        }
    }
}

async fn cmd_template_show(opts: &TemplateShowOpts) -> Result<()> {
    let template = Template::load(&opts.template_path).await?;
    let mut session = Session::new();
    session.load_template(template);
    let listings = session
        .named_regions()
        .into_iter()
        .enumerate()
        .map(|(ordinal, region)| RegionListing {
            position: ordinal + 1,
            id: region.id.0,
            field_name: region.field_name,
            left: region.rect.left,
            top: region.rect.top,
            width: region.rect.width,
            height: region.rect.height,
        })
        .collect::<Vec<_>>();
    write_jsonl(opts.output_path.as_deref(), &listings).await
}
