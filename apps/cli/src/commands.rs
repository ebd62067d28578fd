//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use hubkit_core::{
    ContentOperation, Diff, FeatureRegistration, LoadEvent, LoaderFactory, RenderUpdate,
    StaticConnectivity, ViewModelLoader, ViewModelRenderer, diff,
};
use hubkit_shared::{AppConfig, ConnectivityState, ContentModel, LoaderConfig, init_config, load_config};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use crate::script::ViewScript;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// hubkit: drive content operation chains and diff content models.
#[derive(Parser)]
#[command(
    name = "hubkit",
    version,
    about = "Run view content pipelines and diff the models they produce.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Output format for models and diffs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load a view from a script, then request extra pages.
    Load {
        /// View script (TOML).
        script: PathBuf,

        /// Number of pages to request after the main load.
        #[arg(short, long, default_value_t = 0)]
        pages: usize,

        /// Resolve connectivity as offline.
        #[arg(long)]
        offline: bool,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Diff two serialized content models.
    Diff {
        /// Previous model (JSON).
        from: PathBuf,

        /// New model (JSON).
        to: PathBuf,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "hubkit=info,hubkit_core=warn,hubkit_shared=warn",
        1 => "hubkit=debug,hubkit_core=info,hubkit_shared=info",
        2 => "hubkit=debug,hubkit_core=debug,hubkit_shared=debug",
        _ => "hubkit=trace,hubkit_core=trace,hubkit_shared=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Load {
            script,
            pages,
            offline,
            format,
        } => cmd_load(&script, pages, offline, format).await,
        Command::Diff { from, to, format } => cmd_diff(&from, &to, format),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// load
// ---------------------------------------------------------------------------

async fn cmd_load(
    script_path: &Path,
    pages: usize,
    offline: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = LoaderConfig::from(&load_config()?);
    let script = ViewScript::load(script_path)?;
    let base_dir = script_path.parent().unwrap_or_else(|| Path::new("."));
    let operations = script.build_operations(base_dir)?;
    let paginated = operations.iter().any(|op| op.capabilities().pagination);

    let connectivity = if offline {
        ConnectivityState::Offline
    } else {
        ConnectivityState::Online
    };
    info!(
        view_uri = %script.view_uri,
        operations = operations.len(),
        %connectivity,
        "loading view"
    );

    let mut factory = LoaderFactory::new(config, Arc::new(StaticConnectivity(connectivity)));
    let chain_operations = operations.clone();
    factory.register_feature(
        FeatureRegistration::new(script.feature_info(), script.view_uri.clone()).with_factory(
            Arc::new(move |_: &Url| -> Vec<Arc<dyn ContentOperation>> {
                chain_operations.clone()
            }),
        ),
    )?;

    let (subscriber, mut events) = hubkit_core::channel_subscriber();
    let loader = factory.create_loader(&script.view_uri, subscriber)?;

    let mut renderer = ViewModelRenderer::new();
    let initial = loader.initial_model();
    let update = renderer.render(Arc::clone(&initial));
    print_stage("initial", &initial, &update, format)?;

    let progress = CliProgress::new();

    progress.set_message(format!("Loading {}", script.view_uri));
    loader.request_load(false)?;
    let model = await_model(&loader, &mut events, &progress).await?;
    let update = renderer.render(Arc::clone(&model));
    progress.suspend(|| print_stage("main", &model, &update, format))?;

    let pages = if paginated {
        pages
    } else {
        if pages > 0 {
            warn!(pages, "no operation in this view supports pagination; skipping pages");
        }
        0
    };
    for page in 1..=pages {
        progress.set_message(format!("Loading page {page}"));
        loader.request_next_page()?;
        let model = await_model(&loader, &mut events, &progress).await?;
        let update = renderer.render(Arc::clone(&model));
        progress.suspend(|| print_stage(&format!("page {page}"), &model, &update, format))?;
    }

    progress.finish();
    Ok(())
}

async fn await_model(
    loader: &ViewModelLoader,
    events: &mut mpsc::UnboundedReceiver<LoadEvent>,
    progress: &CliProgress,
) -> Result<Arc<ContentModel>> {
    match events.recv().await {
        Some(LoadEvent::Loaded(model)) => Ok(model),
        Some(LoadEvent::Failed(error)) => {
            progress.finish();
            Err(eyre!("loading {} failed: {error}", loader.view_uri()))
        }
        None => Err(eyre!("loader for {} stopped unexpectedly", loader.view_uri())),
    }
}

fn print_stage(
    stage: &str,
    model: &ContentModel,
    update: &RenderUpdate,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("== {stage} ==");
            print!("{}", format_model(model));
            match update {
                RenderUpdate::Reload => println!("update: full reload"),
                RenderUpdate::Batch(diff) => print!("{}", format_diff(diff)),
            }
            println!();
        }
        OutputFormat::Json => {
            let update = match update {
                RenderUpdate::Reload => serde_json::json!("reload"),
                RenderUpdate::Batch(diff) => serde_json::to_value(diff)?,
            };
            let stage = serde_json::json!({
                "stage": stage,
                "model": model,
                "update": update,
            });
            println!("{}", serde_json::to_string(&stage)?);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

fn cmd_diff(from: &Path, to: &Path, format: OutputFormat) -> Result<()> {
    let from_model = read_model(from)?;
    let to_model = read_model(to)?;
    let edits = diff(&from_model, &to_model);

    info!(
        from = %from.display(),
        to = %to.display(),
        edits = edits.len(),
        "computed diff"
    );

    match format {
        OutputFormat::Text => print!("{}", format_diff(&edits)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&edits)?),
    }
    Ok(())
}

fn read_model(path: &Path) -> Result<ContentModel> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| eyre!("invalid content model {}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

fn format_model(model: &ContentModel) -> String {
    let mut out = String::new();
    if let Some(title) = &model.title {
        out.push_str(&format!("title: {title}\n"));
    }
    if let Some(header) = &model.header {
        out.push_str(&format!(
            "header: {} [{}]\n",
            header.title.as_deref().unwrap_or(&header.identifier),
            header.component
        ));
    }
    for item in &model.body {
        out.push_str(&format!(
            "  {:>3}  {:<20} {:<16} {}\n",
            item.index,
            item.identifier,
            item.component.to_string(),
            item.title.as_deref().unwrap_or("")
        ));
    }
    for overlay in &model.overlays {
        out.push_str(&format!("overlay: {} [{}]\n", overlay.identifier, overlay.component));
    }
    out
}

fn format_diff(diff: &Diff) -> String {
    if diff.is_empty() {
        return "update: no changes\n".to_string();
    }
    let mut out = String::new();
    for path in &diff.deleted {
        out.push_str(&format!("  - deleted  {path}\n"));
    }
    for path in &diff.inserted {
        out.push_str(&format!("  + inserted {path}\n"));
    }
    for path in &diff.reloaded {
        out.push_str(&format!("  ~ reloaded {path}\n"));
    }
    for m in &diff.moved {
        let changed = if m.content_changed { " (changed)" } else { "" };
        out.push_str(&format!("  > moved    {} -> {}{changed}\n", m.from, m.to));
    }
    out
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner shown while a pass is in flight.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn set_message(&self, message: String) {
        self.spinner.set_message(message);
    }

    fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.spinner.suspend(f)
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
