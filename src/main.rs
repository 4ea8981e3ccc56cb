use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nutrimap_core::config::{AppConfig, LogFormat, LoggingConfig};
use nutrimap_core::{LocationRecord, NavigationRequest, SelectionId};
use nutrimap_map::{
    select_provider, ControllerState, HeadlessContainer, HeadlessFactory, JsonFileSummarySource,
    MapController, MapSettings, MetricsSnapshot, OverlayPhase, PopupKey, SurfaceSnapshot,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/nutrimap.yaml";

/// NutriMap - world map of brand-filtered nutrition data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to config/nutrimap.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Branded tile provider access token
    #[arg(long, env = "NUTRIMAP_ACCESS_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount the map on a headless surface and print what it rendered
    Render(RenderArgs),

    /// Print the basemap tile provider that would be used
    Tiles,
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// JSON array of location records
    #[arg(short, long, default_value = "data/locations.json")]
    locations: PathBuf,

    /// Location id whose popup opens after rendering
    #[arg(short, long)]
    select: Option<String>,

    /// Popups to report as opened (`<location id>` or `country:<id>`)
    #[arg(long)]
    open: Vec<String>,

    /// Popup call-to-actions to click, in order
    #[arg(long)]
    click: Vec<String>,

    /// Skip the boundary overlay
    #[arg(long)]
    offline: bool,

    /// Per-country summary dataset for secondary markers
    #[arg(long)]
    summaries: Option<PathBuf>,

    /// Container width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Container height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,
}

#[derive(Debug, Serialize)]
struct NavigationEntry {
    route: String,
    #[serde(flatten)]
    request: NavigationRequest,
}

#[derive(Debug, Serialize)]
struct RenderReport {
    state: ControllerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    overlay: OverlayPhase,
    surface: SurfaceSnapshot,
    navigation: Vec<NavigationEntry>,
    metrics: MetricsSnapshot,
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => Some(path),
        None => Some(Path::new(DEFAULT_CONFIG)).filter(|p| p.exists()),
    };

    let config = AppConfig::from_config_builder(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let mut logging = logging.clone();
    if let Some(level) = level_override {
        logging.level = level.to_string();
    }
    logging.parse_level().context("Invalid log level")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.filter_directives()))
        .context("Invalid log filter")?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
    Ok(())
}

fn load_locations(path: &Path) -> Result<Vec<LocationRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read locations file: {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse locations file: {:?}", path))
}

fn parse_keys(keys: &[String]) -> Result<Vec<PopupKey>> {
    keys.iter()
        .map(|k| k.parse::<PopupKey>().with_context(|| format!("Invalid popup key: {}", k)))
        .collect()
}

async fn render(config: AppConfig, args: RenderArgs) -> Result<()> {
    let locations = load_locations(&args.locations)?;
    let opens = parse_keys(&args.open)?;
    let clicks = parse_keys(&args.click)?;

    let settings = MapSettings::from_config(&config);
    let overlay_wait = settings.fetch_timeout + Duration::from_secs(1);

    let factory = HeadlessFactory::new();
    let mut builder = MapController::builder(settings, Arc::new(factory.clone()));
    if args.offline {
        builder = builder.without_overlay();
    }
    if let Some(path) = args.summaries {
        builder = builder.summaries(Arc::new(JsonFileSummarySource::new(path)));
    }
    let (controller, navigation) = builder.build();

    controller.set_locations(locations);
    if let Some(id) = args.select.as_deref() {
        controller.set_selection(Some(SelectionId::from(id)));
    }

    let container = HeadlessContainer::sized(args.width, args.height);
    let state = controller.mount(&container, None).await;
    info!(%state, markers = controller.marker_count(), "Map rendered");

    if state.has_surface() {
        match tokio::time::timeout(overlay_wait, controller.overlay_settled()).await {
            Ok(phase) => info!(?phase, "Overlay settled"),
            Err(_) => warn!("Overlay did not settle in time"),
        }
    }

    for key in &opens {
        controller.popup_opened(key);
    }
    for key in &clicks {
        if controller.popup_action(key).is_none() {
            warn!(popup = %key, "Click had no effect");
        }
    }

    let mut requests = Vec::new();
    while let Ok(request) = navigation.try_recv() {
        requests.push(NavigationEntry {
            route: request.route(),
            request,
        });
    }

    let report = RenderReport {
        state,
        error: controller.status().error_message(),
        overlay: controller.overlay_phase(),
        surface: factory.snapshot(),
        navigation: requests,
        metrics: controller.status().metrics().snapshot(),
    };
    controller.dispose();

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );

    if !state.has_surface() {
        bail!("Map could not be created ({})", state);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if args.token.is_some() {
        config.map.access_token = args.token.clone();
    }

    init_tracing(&config.logging, args.log_level.as_deref())?;

    match args.command {
        Command::Render(render_args) => render(config, render_args).await,
        Command::Tiles => {
            let provider = select_provider(config.map.access_token.as_deref());
            println!(
                "{}",
                serde_json::to_string_pretty(&provider).context("Failed to serialize provider")?
            );
            Ok(())
        }
    }
}
